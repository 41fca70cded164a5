//! 内置模拟协作者
//!
//! 演示模式下代替真实的抓取引擎、分类器、存储和通知渠道，
//! 使编排核心可以脱离外部系统独立运行。抓取会向存储写入
//! 新快照，分类偶尔产生篡改告警，通知只打印日志。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use pagewatch_core::{
    Alert, AlertSeverity, Classifier, ComponentHealth, JobConfig, JobExecution, JobPriority,
    Notifier, PagewatchResult, Scraper, Snapshot, Storage, Website,
};

/// 内存存储，同时承担业务数据与调度器的任务持久化
#[derive(Default)]
pub struct SimStorage {
    websites: Mutex<HashMap<String, Website>>,
    snapshots: Mutex<Vec<Snapshot>>,
    alerts: Mutex<Vec<Alert>>,
    jobs: Mutex<HashMap<String, JobConfig>>,
    executions: Mutex<Vec<JobExecution>>,
}

impl SimStorage {
    /// 预置若干演示网站
    pub fn with_demo_websites(count: usize) -> Self {
        let storage = Self::default();
        {
            let mut websites = storage.websites.lock().unwrap();
            for i in 1..=count {
                let id = format!("demo-{i}");
                websites.insert(
                    id.clone(),
                    Website {
                        id,
                        url: format!("https://demo-{i}.example.com"),
                        name: format!("演示网站 {i}"),
                        enabled: true,
                        created_at: Utc::now(),
                    },
                );
            }
        }
        storage
    }

    pub fn add_snapshot(&self, snapshot: Snapshot) {
        self.snapshots.lock().unwrap().push(snapshot);
    }
}

#[async_trait]
impl Storage for SimStorage {
    async fn get_website(&self, website_id: &str) -> PagewatchResult<Option<Website>> {
        Ok(self.websites.lock().unwrap().get(website_id).cloned())
    }

    async fn list_websites(&self) -> PagewatchResult<Vec<Website>> {
        let mut websites: Vec<Website> =
            self.websites.lock().unwrap().values().cloned().collect();
        websites.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(websites)
    }

    async fn get_latest_snapshot(&self, website_id: &str) -> PagewatchResult<Option<Snapshot>> {
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.website_id == website_id)
            .max_by_key(|s| s.captured_at)
            .cloned())
    }

    async fn get_website_alerts(&self, website_id: &str) -> PagewatchResult<Vec<Alert>> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.website_id == website_id)
            .cloned()
            .collect())
    }

    async fn create_alert(&self, alert: Alert) -> PagewatchResult<Alert> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(alert)
    }

    async fn update_alert(
        &self,
        alert_id: &str,
        fields: HashMap<String, serde_json::Value>,
    ) -> PagewatchResult<bool> {
        let mut alerts = self.alerts.lock().unwrap();
        match alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                if let Some(notified) = fields.get("notified").and_then(|v| v.as_bool()) {
                    alert.notified = notified;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn save_job(&self, job: &JobConfig) -> PagewatchResult<()> {
        self.jobs
            .lock()
            .unwrap()
            .insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn delete_job(&self, job_id: &str) -> PagewatchResult<bool> {
        Ok(self.jobs.lock().unwrap().remove(job_id).is_some())
    }

    async fn load_jobs(&self) -> PagewatchResult<Vec<JobConfig>> {
        Ok(self.jobs.lock().unwrap().values().cloned().collect())
    }

    async fn save_execution(&self, execution: &JobExecution) -> PagewatchResult<()> {
        self.executions.lock().unwrap().push(execution.clone());
        Ok(())
    }

    async fn health_check(&self) -> PagewatchResult<ComponentHealth> {
        Ok(ComponentHealth::healthy("storage", "模拟存储正常"))
    }
}

/// 模拟抓取引擎：短暂延迟后为网站写入一份新快照
pub struct SimScraper {
    storage: Arc<SimStorage>,
    scheduled: AtomicU64,
}

impl SimScraper {
    pub fn new(storage: Arc<SimStorage>) -> Self {
        Self {
            storage,
            scheduled: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Scraper for SimScraper {
    async fn schedule_scraping(
        &self,
        website_id: &str,
        url: &str,
        _priority: JobPriority,
        _metadata: HashMap<String, serde_json::Value>,
    ) -> PagewatchResult<String> {
        // 模拟网络抓取耗时
        tokio::time::sleep(Duration::from_millis(20 + (rand::random::<u64>() % 80))).await;
        let content_hash = format!("{:016x}", rand::random::<u64>());
        let snapshot = Snapshot {
            id: Uuid::new_v4().to_string(),
            website_id: website_id.to_string(),
            content_data: Some(serde_json::json!({
                "html": format!("<html><body>模拟页面 {content_hash}</body></html>"),
            })),
            content_hash,
            captured_at: Utc::now(),
        };
        info!("模拟抓取 {} 完成，快照 {}", url, snapshot.id);
        self.storage.add_snapshot(snapshot);
        self.scheduled.fetch_add(1, Ordering::Relaxed);
        Ok(Uuid::new_v4().to_string())
    }

    async fn orchestrator_stats(&self) -> PagewatchResult<serde_json::Value> {
        Ok(serde_json::json!({
            "scheduled": self.scheduled.load(Ordering::Relaxed),
            "queue_depth": 0,
        }))
    }

    async fn health_check(&self) -> PagewatchResult<ComponentHealth> {
        Ok(ComponentHealth::healthy("scraper", "模拟抓取引擎正常"))
    }
}

/// 模拟分类器：一定概率把快照判定为篡改并写入告警
pub struct SimClassifier {
    storage: Arc<SimStorage>,
    /// 判定为篡改的概率（0-1）
    defacement_probability: f64,
    scheduled: AtomicU64,
}

impl SimClassifier {
    pub fn new(storage: Arc<SimStorage>) -> Self {
        Self::with_probability(storage, 0.2)
    }

    pub fn with_probability(storage: Arc<SimStorage>, probability: f64) -> Self {
        Self {
            storage,
            defacement_probability: probability,
            scheduled: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Classifier for SimClassifier {
    async fn schedule_classification(
        &self,
        website_id: &str,
        _url: &str,
        website_name: &str,
        snapshot_id: &str,
        content_data: Option<serde_json::Value>,
        _priority: JobPriority,
        _metadata: HashMap<String, serde_json::Value>,
    ) -> PagewatchResult<String> {
        tokio::time::sleep(Duration::from_millis(10 + (rand::random::<u64>() % 40))).await;
        self.scheduled.fetch_add(1, Ordering::Relaxed);
        if content_data.is_none() {
            info!("快照 {} 未附带内容载荷，模拟分类器按快照ID回查", snapshot_id);
        }
        if rand::random::<f64>() < self.defacement_probability {
            let alert = Alert {
                id: Uuid::new_v4().to_string(),
                website_id: website_id.to_string(),
                severity: AlertSeverity::High,
                title: format!("疑似篡改: {website_name}"),
                description: format!("快照 {snapshot_id} 的内容被判定为疑似篡改"),
                notified: false,
                created_at: Utc::now(),
            };
            warn!("模拟分类器发现疑似篡改: {}", alert.title);
            self.storage.create_alert(alert).await?;
        }
        Ok(Uuid::new_v4().to_string())
    }

    async fn orchestrator_stats(&self) -> PagewatchResult<serde_json::Value> {
        Ok(serde_json::json!({
            "scheduled": self.scheduled.load(Ordering::Relaxed),
            "queue_depth": 0,
        }))
    }

    async fn health_check(&self) -> PagewatchResult<ComponentHealth> {
        Ok(ComponentHealth::healthy("classifier", "模拟分类器正常"))
    }
}

/// 模拟通知渠道：所有通知只打印日志
#[derive(Default)]
pub struct SimNotifier;

#[async_trait]
impl Notifier for SimNotifier {
    async fn send_alert_notification(&self, alert: &Alert) -> PagewatchResult<bool> {
        info!("【告警通知】{}: {}", alert.title, alert.description);
        Ok(true)
    }

    async fn send_health_alert(
        &self,
        message: &str,
        unhealthy_components: &[String],
        recommendations: &[String],
    ) -> PagewatchResult<()> {
        warn!(
            "【健康告警】{}，不健康组件: {:?}，建议: {:?}",
            message, unhealthy_components, recommendations
        );
        Ok(())
    }

    async fn send_system_status(&self, status: &serde_json::Value) -> PagewatchResult<()> {
        info!("【系统状态】{}", status);
        Ok(())
    }
}
