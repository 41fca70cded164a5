//! 把调度器与工作流引擎的运行时统计桥接给健康监控器

use std::sync::Arc;

use async_trait::async_trait;

use pagewatch_core::{ComponentHealth, JobExecution, SchedulerStats};
use pagewatch_monitor::StatsSource;
use pagewatch_scheduler::JobScheduler;
use pagewatch_workflow::WorkflowEngine;

const RECENT_FAILURE_LIMIT: usize = 10;

pub struct CoreStatsBridge {
    scheduler: Arc<JobScheduler>,
    engine: Arc<WorkflowEngine>,
}

impl CoreStatsBridge {
    pub fn new(scheduler: Arc<JobScheduler>, engine: Arc<WorkflowEngine>) -> Self {
        Self { scheduler, engine }
    }
}

#[async_trait]
impl StatsSource for CoreStatsBridge {
    async fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats().await
    }

    async fn active_jobs(&self) -> usize {
        self.scheduler.active_executions().await.len()
    }

    async fn active_workflows(&self) -> usize {
        self.engine.active_count().await
    }

    async fn recent_failures(&self) -> Vec<JobExecution> {
        self.scheduler.recent_failures(RECENT_FAILURE_LIMIT).await
    }

    async fn core_components(&self) -> Vec<ComponentHealth> {
        vec![
            self.scheduler.health_check().await,
            self.engine.health_check().await,
        ]
    }
}
