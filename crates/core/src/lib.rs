pub mod config;
pub mod errors;
pub mod models;
pub mod ports;

pub use config::{
    AppConfig, LoggingConfig, MonitorConfig, OrchestratorConfig, SchedulerConfig, WorkflowConfig,
};
pub use errors::{PagewatchError, PagewatchResult};
pub use models::{
    ComponentHealth, ExecutionStatus, JobConfig, JobExecution, JobPriority, JobType,
    MonitoringReport, RetryConfig, SchedulerStats, SystemMetrics, WorkflowDefinition,
    WorkflowExecution, WorkflowStatus, WorkflowStep,
};
pub use ports::{
    Alert, AlertSeverity, Classifier, Notifier, Scraper, Snapshot, Storage, Website,
};
