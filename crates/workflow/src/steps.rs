use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use pagewatch_core::{
    Classifier, JobPriority, JobType, Notifier, PagewatchError, PagewatchResult, Scraper, Storage,
    Website, WorkflowStep,
};

/// 步骤执行器：把工作流步骤转换为对外部协作者的调用
///
/// 步骤类型是封闭枚举，类型层面不存在未知步骤；
/// 健康检查步骤通过 `component` 参数选择目标协作者，
/// 未知目标在运行时报 `UnknownStepType` 错误。
pub struct StepRunner {
    storage: Arc<dyn Storage>,
    scraper: Arc<dyn Scraper>,
    classifier: Arc<dyn Classifier>,
    notifier: Arc<dyn Notifier>,
}

impl StepRunner {
    pub fn new(
        storage: Arc<dyn Storage>,
        scraper: Arc<dyn Scraper>,
        classifier: Arc<dyn Classifier>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            storage,
            scraper,
            classifier,
            notifier,
        }
    }

    async fn require_website(&self, website_id: &str) -> PagewatchResult<Website> {
        self.storage
            .get_website(website_id)
            .await?
            .ok_or_else(|| PagewatchError::WebsiteNotFound {
                id: website_id.to_string(),
            })
    }

    /// 分发单个步骤，返回步骤的结果数据
    pub async fn dispatch(
        &self,
        step: &WorkflowStep,
        website_id: &str,
        priority: JobPriority,
        params: &HashMap<String, serde_json::Value>,
    ) -> PagewatchResult<serde_json::Value> {
        let mut metadata = params.clone();
        metadata.extend(step.parameters.clone());

        match step.step_type {
            JobType::WebsiteMonitor => {
                let website = self.require_website(website_id).await?;
                let scrape_job_id = self
                    .scraper
                    .schedule_scraping(&website.id, &website.url, priority, metadata)
                    .await?;
                debug!("步骤 {} 已调度抓取任务 {}", step.step_id, scrape_job_id);
                Ok(serde_json::json!({ "scrape_job_id": scrape_job_id }))
            }

            JobType::Classification => {
                let website = self.require_website(website_id).await?;
                // 分类针对最近一次存储的快照
                let snapshot = self
                    .storage
                    .get_latest_snapshot(website_id)
                    .await?
                    .ok_or_else(|| PagewatchError::StepFailed {
                        step: step.step_id.clone(),
                        message: format!("网站 {website_id} 没有可用的内容快照"),
                    })?;
                let classification_job_id = self
                    .classifier
                    .schedule_classification(
                        &website.id,
                        &website.url,
                        &website.name,
                        &snapshot.id,
                        snapshot.content_data.clone(),
                        priority,
                        metadata,
                    )
                    .await?;
                Ok(serde_json::json!({
                    "classification_job_id": classification_job_id,
                    "snapshot_id": snapshot.id,
                }))
            }

            JobType::AlertProcessing => {
                let alerts = self.storage.get_website_alerts(website_id).await?;
                let open: Vec<_> = alerts.into_iter().filter(|a| !a.notified).collect();
                let mut sent = 0usize;
                for alert in &open {
                    match self.notifier.send_alert_notification(alert).await {
                        Ok(true) => {
                            sent += 1;
                            let fields = HashMap::from([(
                                "notified".to_string(),
                                serde_json::json!(true),
                            )]);
                            if let Err(e) = self.storage.update_alert(&alert.id, fields).await {
                                warn!("标记告警 {} 已通知失败: {}", alert.id, e);
                            }
                        }
                        Ok(false) => {
                            debug!("告警 {} 未被通知渠道接受", alert.id);
                        }
                        Err(e) => {
                            warn!("投递告警 {} 失败: {}", alert.id, e);
                        }
                    }
                }
                Ok(serde_json::json!({
                    "alerts_processed": open.len(),
                    "notifications_sent": sent,
                }))
            }

            JobType::HealthCheck => {
                let component = step
                    .parameters
                    .get("component")
                    .and_then(|v| v.as_str())
                    .unwrap_or("summary");
                let health = match component {
                    "storage" => self.storage.health_check().await?,
                    "scraper" => self.scraper.health_check().await?,
                    "classifier" => self.classifier.health_check().await?,
                    "summary" => {
                        return Ok(serde_json::json!({
                            "component": "summary",
                            "aggregated": true,
                        }))
                    }
                    other => {
                        return Err(PagewatchError::UnknownStepType(format!(
                            "health_check:{other}"
                        )))
                    }
                };
                if !health.healthy {
                    return Err(PagewatchError::StepFailed {
                        step: step.step_id.clone(),
                        message: format!("组件 {} 不健康: {}", health.component, health.message),
                    });
                }
                Ok(serde_json::json!({
                    "component": health.component,
                    "healthy": health.healthy,
                    "message": health.message,
                }))
            }

            // 维护步骤由引擎自身处理（清理历史记录），不会走到这里
            JobType::Maintenance => Ok(serde_json::json!({ "maintenance": "noop" })),
        }
    }
}
