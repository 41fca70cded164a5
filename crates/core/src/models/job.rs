use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 任务类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobType {
    #[serde(rename = "website_monitor")]
    WebsiteMonitor,
    #[serde(rename = "classification")]
    Classification,
    #[serde(rename = "health_check")]
    HealthCheck,
    #[serde(rename = "maintenance")]
    Maintenance,
    #[serde(rename = "alert_processing")]
    AlertProcessing,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::WebsiteMonitor => "website_monitor",
            JobType::Classification => "classification",
            JobType::HealthCheck => "health_check",
            JobType::Maintenance => "maintenance",
            JobType::AlertProcessing => "alert_processing",
        }
    }
}

/// 任务优先级
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobPriority {
    #[serde(rename = "critical")]
    Critical,
    #[serde(rename = "high")]
    High,
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "background")]
    Background,
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Normal
    }
}

/// 重试策略配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// 最大重试次数
    pub max_retries: u32,
    /// 首次重试间隔（秒）
    pub initial_delay_seconds: u64,
    /// 最大重试间隔（秒）
    pub max_delay_seconds: u64,
    /// 指数退避倍数
    pub exponential_base: f64,
    /// 是否启用随机抖动
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_seconds: 30,
            max_delay_seconds: 300,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

/// 任务定义
///
/// 由编排器在开启网站监控时创建，调度器负责持久化与触发。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub job_id: String,
    pub website_id: String,
    pub website_url: String,
    pub website_name: String,
    pub job_type: JobType,
    /// 触发器表达式：CRON（≥5个字段）或间隔（如 "30s"、"5m"、"1h"）
    pub trigger: String,
    pub priority: JobPriority,
    pub retry_config: RetryConfig,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobConfig {
    pub fn new(
        website_id: impl Into<String>,
        website_url: impl Into<String>,
        website_name: impl Into<String>,
        job_type: JobType,
        trigger: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4().to_string(),
            website_id: website_id.into(),
            website_url: website_url.into(),
            website_name: website_name.into(),
            job_type,
            trigger: trigger.into(),
            priority: JobPriority::default(),
            retry_config: RetryConfig::default(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn entity_description(&self) -> String {
        format!(
            "任务 '{}' (ID: {}, 类型: {})",
            self.website_name,
            self.job_id,
            self.job_type.as_str()
        )
    }
}

/// 执行状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "RETRYING")]
    Retrying,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "PAUSED")]
    Paused,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// 任务的一次执行实例
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub execution_id: String,
    pub job_id: String,
    pub website_id: String,
    pub status: ExecutionStatus,
    /// 当前尝试次数，从1开始
    pub attempt_number: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub result_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl JobExecution {
    pub fn new(job_id: impl Into<String>, website_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            website_id: website_id.into(),
            status: ExecutionStatus::Pending,
            attempt_number: attempt,
            started_at: None,
            completed_at: None,
            error_message: None,
            result_data: None,
            created_at: Utc::now(),
        }
    }

    pub fn mark_running(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_success(&mut self, result_data: Option<serde_json::Value>) {
        self.status = ExecutionStatus::Success;
        self.completed_at = Some(Utc::now());
        self.result_data = result_data;
    }

    pub fn mark_failed(&mut self, error_message: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(error_message.into());
    }

    pub fn mark_retrying(&mut self) {
        self.status = ExecutionStatus::Retrying;
    }

    pub fn mark_cancelled(&mut self) {
        self.status = ExecutionStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, ExecutionStatus::Running)
    }

    pub fn is_successful(&self) -> bool {
        matches!(self.status, ExecutionStatus::Success)
    }

    /// 执行耗时，未完成时返回None
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
