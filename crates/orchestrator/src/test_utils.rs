//! 测试用的协作者桩实现

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use pagewatch_core::{
    Alert, AppConfig, Classifier, ComponentHealth, JobConfig, JobExecution, JobPriority, Notifier,
    PagewatchResult, Scraper, Snapshot, Storage, Website,
};

use crate::orchestrator::Orchestrator;

#[derive(Default)]
pub struct StubStorage {
    pub websites: Mutex<HashMap<String, Website>>,
    pub snapshots: Mutex<HashMap<String, Snapshot>>,
    pub alerts: Mutex<Vec<Alert>>,
    pub jobs: Mutex<HashMap<String, JobConfig>>,
    pub executions: Mutex<Vec<JobExecution>>,
}

impl StubStorage {
    pub fn with_site(website_id: &str) -> Self {
        let storage = Self::default();
        storage.websites.lock().unwrap().insert(
            website_id.to_string(),
            Website {
                id: website_id.to_string(),
                url: format!("https://{website_id}.example.com"),
                name: format!("网站 {website_id}"),
                enabled: true,
                created_at: Utc::now(),
            },
        );
        storage.snapshots.lock().unwrap().insert(
            website_id.to_string(),
            Snapshot {
                id: format!("snap-{website_id}"),
                website_id: website_id.to_string(),
                content_hash: "deadbeef".to_string(),
                content_data: Some(serde_json::json!({"html": "<html>桩页面</html>"})),
                captured_at: Utc::now(),
            },
        );
        storage
    }
}

#[async_trait]
impl Storage for StubStorage {
    async fn get_website(&self, website_id: &str) -> PagewatchResult<Option<Website>> {
        Ok(self.websites.lock().unwrap().get(website_id).cloned())
    }

    async fn list_websites(&self) -> PagewatchResult<Vec<Website>> {
        Ok(self.websites.lock().unwrap().values().cloned().collect())
    }

    async fn get_latest_snapshot(&self, website_id: &str) -> PagewatchResult<Option<Snapshot>> {
        Ok(self.snapshots.lock().unwrap().get(website_id).cloned())
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
        Ok(ComponentHealth::healthy("storage", "内存存储正常"))
    }
}

#[derive(Default)]
pub struct StubScraper {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Scraper for StubScraper {
    async fn schedule_scraping(
        &self,
        website_id: &str,
        _url: &str,
        _priority: JobPriority,
        _metadata: HashMap<String, serde_json::Value>,
    ) -> PagewatchResult<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("scrape-{website_id}-{n}"))
    }

    async fn orchestrator_stats(&self) -> PagewatchResult<serde_json::Value> {
        Ok(serde_json::json!({ "scheduled": self.calls.load(Ordering::SeqCst) }))
    }

    async fn health_check(&self) -> PagewatchResult<ComponentHealth> {
        Ok(ComponentHealth::healthy("scraper", "抓取引擎正常"))
    }
}

#[derive(Default)]
pub struct StubClassifier {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn schedule_classification(
        &self,
        website_id: &str,
        _url: &str,
        _website_name: &str,
        _snapshot_id: &str,
        _content_data: Option<serde_json::Value>,
        _priority: JobPriority,
        _metadata: HashMap<String, serde_json::Value>,
    ) -> PagewatchResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("classify-{website_id}"))
    }

    async fn orchestrator_stats(&self) -> PagewatchResult<serde_json::Value> {
        Ok(serde_json::json!({ "scheduled": self.calls.load(Ordering::SeqCst) }))
    }

    async fn health_check(&self) -> PagewatchResult<ComponentHealth> {
        Ok(ComponentHealth::healthy("classifier", "分类器正常"))
    }
}

#[derive(Default)]
pub struct StubNotifier {
    pub alert_notifications: Mutex<Vec<String>>,
    pub health_alerts: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for StubNotifier {
    async fn send_alert_notification(&self, alert: &Alert) -> PagewatchResult<bool> {
        self.alert_notifications
            .lock()
            .unwrap()
            .push(alert.id.clone());
        Ok(true)
    }

    async fn send_health_alert(
        &self,
        message: &str,
        _unhealthy_components: &[String],
        _recommendations: &[String],
    ) -> PagewatchResult<()> {
        self.health_alerts.lock().unwrap().push(message.to_string());
        Ok(())
    }

    async fn send_system_status(&self, _status: &serde_json::Value) -> PagewatchResult<()> {
        Ok(())
    }
}

pub struct StubSet {
    pub storage: Arc<StubStorage>,
    pub scraper: Arc<StubScraper>,
    pub classifier: Arc<StubClassifier>,
    pub notifier: Arc<StubNotifier>,
}

impl StubSet {
    /// 在同一存储上构建新编排器，模拟进程重启后的恢复
    pub fn orchestrator_sharing_storage(other: &StubSet) -> (Orchestrator, StubSet) {
        let stubs = StubSet {
            storage: Arc::clone(&other.storage),
            scraper: Arc::new(StubScraper::default()),
            classifier: Arc::new(StubClassifier::default()),
            notifier: Arc::new(StubNotifier::default()),
        };
        let orchestrator = build(&stubs);
        (orchestrator, stubs)
    }
}

fn build(stubs: &StubSet) -> Orchestrator {
    Orchestrator::new(
        AppConfig::default(),
        Arc::clone(&stubs.storage) as Arc<dyn Storage>,
        Arc::clone(&stubs.scraper) as Arc<dyn Scraper>,
        Arc::clone(&stubs.classifier) as Arc<dyn Classifier>,
        Arc::clone(&stubs.notifier) as Arc<dyn Notifier>,
    )
}

pub fn orchestrator_with_stubs() -> (Orchestrator, StubSet) {
    let stubs = StubSet {
        storage: Arc::new(StubStorage::with_site("site-1")),
        scraper: Arc::new(StubScraper::default()),
        classifier: Arc::new(StubClassifier::default()),
        notifier: Arc::new(StubNotifier::default()),
    };
    let orchestrator = build(&stubs);
    (orchestrator, stubs)
}
