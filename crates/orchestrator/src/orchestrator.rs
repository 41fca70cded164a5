use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use pagewatch_core::{
    AppConfig, Classifier, JobConfig, JobPriority, JobType, MonitoringReport, Notifier,
    PagewatchError, PagewatchResult, RetryConfig, Scraper, Storage, WorkflowExecution,
};
use pagewatch_monitor::{ClassifierProbe, HealthMonitor, HealthProbe, ScraperProbe, StorageProbe};
use pagewatch_scheduler::{JobFn, JobScheduler};
use pagewatch_workflow::{StepRunner, WorkflowEngine, SYSTEM_HEALTH_CHECK, WEBSITE_MONITORING};

use crate::bridge::CoreStatsBridge;

/// 编排器：对外的唯一门面
///
/// 组合任务调度器、工作流引擎与健康监控器，负责三者的
/// 启停顺序、持久化任务的恢复以及网站监控的开关。
/// 周期任务触发后统一转化为一次工作流执行。
pub struct Orchestrator {
    config: AppConfig,
    storage: Arc<dyn Storage>,
    scheduler: Arc<JobScheduler>,
    engine: Arc<WorkflowEngine>,
    monitor: Arc<HealthMonitor>,
    /// website_id -> 监控任务的job_id
    monitor_jobs: RwLock<HashMap<String, String>>,
    immediate_executions: AtomicU64,
    running: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn Storage>,
        scraper: Arc<dyn Scraper>,
        classifier: Arc<dyn Classifier>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let scheduler = Arc::new(JobScheduler::new(
            config.scheduler.clone(),
            Arc::clone(&storage),
        ));
        let runner = StepRunner::new(
            Arc::clone(&storage),
            Arc::clone(&scraper),
            Arc::clone(&classifier),
            Arc::clone(&notifier),
        );
        let engine = Arc::new(WorkflowEngine::new(config.workflow.clone(), runner));

        let probes: Vec<Arc<dyn HealthProbe>> = vec![
            Arc::new(StorageProbe::new(Arc::clone(&storage))),
            Arc::new(ScraperProbe::new(scraper)),
            Arc::new(ClassifierProbe::new(classifier)),
        ];
        let bridge = Arc::new(CoreStatsBridge::new(
            Arc::clone(&scheduler),
            Arc::clone(&engine),
        ));
        let monitor = Arc::new(HealthMonitor::new(
            config.monitor.clone(),
            probes,
            bridge,
            notifier,
        ));

        Self {
            config,
            storage,
            scheduler,
            engine,
            monitor,
            monitor_jobs: RwLock::new(HashMap::new()),
            immediate_executions: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    /// 启动所有子系统：调度器 -> 工作流引擎 -> 恢复任务 -> 健康监控
    pub async fn start(&self) -> PagewatchResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(PagewatchError::Internal("编排器已在运行".to_string()));
        }
        info!("编排器启动中");

        self.scheduler.setup().await?;
        self.engine.setup().await?;

        self.restore_persisted_jobs().await?;
        self.ensure_health_check_job().await?;

        self.monitor.setup().await?;
        info!("编排器启动完成");
        Ok(())
    }

    /// 停止所有子系统，与启动顺序相反；重复调用无害
    pub async fn stop(&self) -> PagewatchResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!("编排器停止中");
        self.monitor.cleanup().await?;
        self.engine.cleanup().await?;
        self.scheduler.cleanup().await?;
        info!("编排器已停止");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> PagewatchResult<()> {
        if !self.is_running() {
            return Err(PagewatchError::SchedulerNotRunning);
        }
        Ok(())
    }

    /// 为任务定义重建任务函数：周期任务触发后转化为一次工作流执行
    fn job_fn_for(engine: Arc<WorkflowEngine>, job_type: JobType) -> JobFn {
        let workflow_id = match job_type {
            JobType::WebsiteMonitor => Some(WEBSITE_MONITORING),
            JobType::HealthCheck => Some(SYSTEM_HEALTH_CHECK),
            _ => None,
        };
        Arc::new(move |invocation| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                let Some(workflow_id) = workflow_id else {
                    return Err(PagewatchError::JobExecution(format!(
                        "任务类型 {} 没有对应的工作流",
                        invocation.job.job_type.as_str()
                    )));
                };
                let execution_id = engine
                    .execute_workflow(workflow_id, &invocation.job.website_id, HashMap::new())
                    .await?;
                Ok(serde_json::json!({ "workflow_execution_id": execution_id }))
            })
        })
    }

    /// 进程重启后从存储恢复周期任务
    async fn restore_persisted_jobs(&self) -> PagewatchResult<()> {
        let engine = Arc::clone(&self.engine);
        let restored = self
            .scheduler
            .restore_jobs(&move |config: &JobConfig| {
                Self::job_fn_for(Arc::clone(&engine), config.job_type)
            })
            .await?;
        if restored > 0 {
            info!("编排器恢复了 {} 个持久化任务", restored);
        }

        // 重建 website_id -> job_id 映射
        let mut monitor_jobs = self.monitor_jobs.write().await;
        monitor_jobs.clear();
        for job in self.storage.load_jobs().await? {
            if job.job_type == JobType::WebsiteMonitor {
                monitor_jobs.insert(job.website_id.clone(), job.job_id.clone());
            }
        }
        Ok(())
    }

    /// 保证系统健康巡检工作流有且只有一个周期任务
    async fn ensure_health_check_job(&self) -> PagewatchResult<()> {
        let existing = self
            .storage
            .load_jobs()
            .await?
            .into_iter()
            .any(|job| job.job_type == JobType::HealthCheck);
        if existing {
            return Ok(());
        }

        let config = JobConfig::new(
            "system",
            "",
            "系统健康巡检",
            JobType::HealthCheck,
            &self.config.orchestrator.health_check_trigger,
        )
        .with_priority(JobPriority::Low)
        .with_retry_config(RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        });
        let func = Self::job_fn_for(Arc::clone(&self.engine), JobType::HealthCheck);
        self.scheduler.schedule(config, func).await?;
        Ok(())
    }

    /// 为网站开启周期监控，返回任务ID
    ///
    /// 触发器和优先级缺省时分别使用配置的默认间隔与普通优先级；
    /// 同一网站重复开启时旧的监控任务会被替换。
    pub async fn schedule_website_monitoring(
        &self,
        website_id: &str,
        trigger: Option<&str>,
        priority: Option<JobPriority>,
    ) -> PagewatchResult<String> {
        self.ensure_running()?;
        let website = self
            .storage
            .get_website(website_id)
            .await?
            .ok_or_else(|| PagewatchError::WebsiteNotFound {
                id: website_id.to_string(),
            })?;

        if let Some(old_job_id) = self.monitor_jobs.write().await.remove(website_id) {
            warn!("网站 {} 已有监控任务 {}，将被替换", website_id, old_job_id);
            self.scheduler.unschedule(&old_job_id).await;
        }

        let trigger = trigger.unwrap_or(&self.config.orchestrator.default_monitor_trigger);
        let mut config = JobConfig::new(
            &website.id,
            &website.url,
            &website.name,
            JobType::WebsiteMonitor,
            trigger,
        );
        if let Some(priority) = priority {
            config = config.with_priority(priority);
        }
        let func = Self::job_fn_for(Arc::clone(&self.engine), JobType::WebsiteMonitor);
        let job_id = self.scheduler.schedule(config, func).await?;

        self.monitor_jobs
            .write()
            .await
            .insert(website_id.to_string(), job_id.clone());
        info!("网站 {} 的监控已开启，任务 {}", website_id, job_id);
        Ok(job_id)
    }

    /// 关闭网站监控
    pub async fn unschedule_website_monitoring(&self, website_id: &str) -> bool {
        let Some(job_id) = self.monitor_jobs.write().await.remove(website_id) else {
            return false;
        };
        self.scheduler.unschedule(&job_id).await
    }

    pub async fn pause_website_monitoring(&self, website_id: &str) -> bool {
        match self.monitor_jobs.read().await.get(website_id) {
            Some(job_id) => self.scheduler.pause(job_id).await,
            None => false,
        }
    }

    pub async fn resume_website_monitoring(&self, website_id: &str) -> bool {
        match self.monitor_jobs.read().await.get(website_id) {
            Some(job_id) => self.scheduler.resume(job_id).await,
            None => false,
        }
    }

    pub async fn pause_all(&self) -> usize {
        self.scheduler.pause_all().await
    }

    pub async fn resume_all(&self) -> usize {
        self.scheduler.resume_all().await
    }

    /// 绕过调度立即执行一次工作流，返回执行ID
    pub async fn execute_immediate_workflow(
        &self,
        workflow_id: &str,
        website_id: &str,
        params: HashMap<String, serde_json::Value>,
    ) -> PagewatchResult<String> {
        self.ensure_running()?;
        let execution_id = self
            .engine
            .execute_workflow(workflow_id, website_id, params)
            .await?;
        self.immediate_executions.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pagewatch_immediate_workflows_total").increment(1);
        Ok(execution_id)
    }

    /// 对单个网站立即执行一轮监控流水线
    pub async fn trigger_immediate_check(&self, website_id: &str) -> PagewatchResult<String> {
        self.ensure_running()?;
        if self.storage.get_website(website_id).await?.is_none() {
            return Err(PagewatchError::WebsiteNotFound {
                id: website_id.to_string(),
            });
        }
        self.execute_immediate_workflow(WEBSITE_MONITORING, website_id, HashMap::new())
            .await
    }

    pub async fn workflow_status(&self, execution_id: &str) -> Option<WorkflowExecution> {
        self.engine.status(execution_id).await
    }

    pub async fn cancel_workflow(&self, execution_id: &str) -> bool {
        self.engine.cancel_workflow(execution_id).await
    }

    /// 当前整体状态快照，任何生命周期阶段都可安全调用
    pub async fn status(&self) -> serde_json::Value {
        let stats = self.scheduler.stats().await;
        serde_json::json!({
            "running": self.is_running(),
            "scheduler": {
                "running": self.scheduler.is_running(),
                "total_jobs": stats.total_jobs,
                "active_executions": stats.active_executions,
                "completed_executions": stats.completed_executions,
                "failed_executions": stats.failed_executions,
                "success_rate": stats.success_rate,
                "uptime_seconds": stats.uptime_seconds,
            },
            "workflow_engine": {
                "running": self.engine.is_running(),
                "active_workflows": self.engine.active_count().await,
                "total_executed": self.engine.total_executed(),
                "registered_workflows": self.engine.registered_workflows().await,
            },
            "monitor": {
                "running": self.monitor.is_running(),
                "latest_health_score": self.monitor.latest_report().await
                    .map(|r| r.overall_health_score),
            },
            "monitored_websites": self.monitor_jobs.read().await.len(),
            "immediate_executions": self.immediate_executions.load(Ordering::Relaxed),
        })
    }

    /// 立即生成一份健康报告（不入巡检历史）
    pub async fn monitoring_report(&self) -> MonitoringReport {
        self.monitor.generate_report().await
    }
}
