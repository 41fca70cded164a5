//! 测试用的内存存储实现

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use pagewatch_core::{
    Alert, ComponentHealth, JobConfig, JobExecution, PagewatchResult, Snapshot, Storage, Website,
};

#[derive(Default)]
pub struct MemoryStorage {
    pub websites: Mutex<HashMap<String, Website>>,
    pub jobs: Mutex<HashMap<String, JobConfig>>,
    pub executions: Mutex<Vec<JobExecution>>,
}

impl MemoryStorage {
    pub fn with_website(id: &str, url: &str, name: &str) -> Self {
        let storage = Self::default();
        storage.websites.lock().unwrap().insert(
            id.to_string(),
            Website {
                id: id.to_string(),
                url: url.to_string(),
                name: name.to_string(),
                enabled: true,
                created_at: Utc::now(),
            },
        );
        storage
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_website(&self, website_id: &str) -> PagewatchResult<Option<Website>> {
        Ok(self.websites.lock().unwrap().get(website_id).cloned())
    }

    async fn list_websites(&self) -> PagewatchResult<Vec<Website>> {
        Ok(self.websites.lock().unwrap().values().cloned().collect())
    }

    async fn get_latest_snapshot(&self, _website_id: &str) -> PagewatchResult<Option<Snapshot>> {
        Ok(None)
    }

    async fn get_website_alerts(&self, _website_id: &str) -> PagewatchResult<Vec<Alert>> {
        Ok(Vec::new())
    }

    async fn create_alert(&self, alert: Alert) -> PagewatchResult<Alert> {
        Ok(alert)
    }

    async fn update_alert(
        &self,
        _alert_id: &str,
        _fields: HashMap<String, serde_json::Value>,
    ) -> PagewatchResult<bool> {
        Ok(true)
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
