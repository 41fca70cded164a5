//! 测试用的协作者桩实现

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use pagewatch_core::{
    Alert, Classifier, ComponentHealth, JobConfig, JobExecution, JobPriority, Notifier,
    PagewatchError, PagewatchResult, Scraper, Snapshot, Storage, Website, WorkflowConfig,
    WorkflowExecution,
};

use crate::engine::WorkflowEngine;
use crate::steps::StepRunner;

#[derive(Default)]
pub struct StubStorage {
    pub websites: Mutex<HashMap<String, Website>>,
    pub snapshots: Mutex<HashMap<String, Snapshot>>,
    pub alerts: Mutex<Vec<Alert>>,
    pub jobs: Mutex<HashMap<String, JobConfig>>,
}

impl StubStorage {
    /// 一个带网站和快照的存储桩，足以跑通监控流水线
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

    async fn save_execution(&self, _execution: &JobExecution) -> PagewatchResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> PagewatchResult<ComponentHealth> {
        Ok(ComponentHealth::healthy("storage", "内存存储正常"))
    }
}

pub struct StubScraper {
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl StubScraper {
    pub fn new() -> Self {
        Self {
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        }
    }
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
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
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

pub struct StubClassifier {
    pub fail_message: Option<String>,
    /// 最近一次调用收到的内容载荷
    pub last_content: Mutex<Option<serde_json::Value>>,
}

impl StubClassifier {
    pub fn ok() -> Self {
        Self {
            fail_message: None,
            last_content: Mutex::new(None),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_message: Some(message.to_string()),
            last_content: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn schedule_classification(
        &self,
        website_id: &str,
        _url: &str,
        _website_name: &str,
        _snapshot_id: &str,
        content_data: Option<serde_json::Value>,
        _priority: JobPriority,
        _metadata: HashMap<String, serde_json::Value>,
    ) -> PagewatchResult<String> {
        *self.last_content.lock().unwrap() = content_data;
        match &self.fail_message {
            Some(message) => Err(PagewatchError::JobExecution(message.clone())),
            None => Ok(format!("classify-{website_id}")),
        }
    }

    async fn orchestrator_stats(&self) -> PagewatchResult<serde_json::Value> {
        Ok(serde_json::json!({ "scheduled": 0 }))
    }

    async fn health_check(&self) -> PagewatchResult<ComponentHealth> {
        Ok(ComponentHealth::healthy("classifier", "分类器正常"))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub alert_notifications: Mutex<Vec<String>>,
    pub health_alerts: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
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

fn engine(scraper: StubScraper, classifier: Arc<StubClassifier>) -> WorkflowEngine {
    let runner = StepRunner::new(
        Arc::new(StubStorage::with_site("site-1")),
        Arc::new(scraper),
        classifier,
        Arc::new(RecordingNotifier::default()),
    );
    WorkflowEngine::new(WorkflowConfig::default(), runner)
}

pub fn engine_with_stubs() -> WorkflowEngine {
    engine(StubScraper::new(), Arc::new(StubClassifier::ok()))
}

/// 同时暴露分类器桩，便于断言它收到的调用参数
pub fn engine_with_classifier() -> (WorkflowEngine, Arc<StubClassifier>) {
    let classifier = Arc::new(StubClassifier::ok());
    (
        engine(StubScraper::new(), Arc::clone(&classifier)),
        classifier,
    )
}

pub fn failing_classifier_engine(message: &str) -> WorkflowEngine {
    engine(StubScraper::new(), Arc::new(StubClassifier::failing(message)))
}

pub fn slow_scraper_engine(delay: Duration) -> WorkflowEngine {
    engine(StubScraper::slow(delay), Arc::new(StubClassifier::ok()))
}

/// 轮询直到执行进入终态，超时则panic
pub async fn wait_for_terminal(engine: &WorkflowEngine, execution_id: &str) -> WorkflowExecution {
    for _ in 0..200 {
        if let Some(execution) = engine.status(execution_id).await {
            if execution.status.is_terminal() {
                return execution;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("执行 {execution_id} 未在期限内进入终态");
}
