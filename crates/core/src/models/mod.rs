pub mod job;
pub mod report;
pub mod workflow;

pub use job::{
    ExecutionStatus, JobConfig, JobExecution, JobPriority, JobType, RetryConfig,
};
pub use report::{ComponentHealth, MonitoringReport, SchedulerStats, SystemMetrics};
pub use workflow::{WorkflowDefinition, WorkflowExecution, WorkflowStatus, WorkflowStep};
