use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{JobExecution, JobPriority, JobType, RetryConfig};

/// 工作流中的一个步骤
///
/// `depends_on` 中的每个ID必须指向同一工作流内的其他步骤，
/// 由此构成的依赖图必须无环（注册时校验）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step_id: String,
    pub step_type: JobType,
    pub name: String,
    pub depends_on: HashSet<String>,
    pub timeout_seconds: u64,
    pub retry_config: RetryConfig,
    pub parameters: HashMap<String, serde_json::Value>,
}

impl WorkflowStep {
    pub fn new(step_id: impl Into<String>, step_type: JobType, name: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            step_type,
            name: name.into(),
            depends_on: HashSet::new(),
            timeout_seconds: 300,
            retry_config: RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            },
            parameters: HashMap::new(),
        }
    }

    pub fn depends_on(mut self, step_id: impl Into<String>) -> Self {
        self.depends_on.insert(step_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }
}

/// 工作流定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub workflow_id: String,
    pub name: String,
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    pub priority: JobPriority,
    pub timeout_seconds: u64,
}

impl WorkflowDefinition {
    pub fn new(
        workflow_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            name: name.into(),
            description: description.into(),
            steps: Vec::new(),
            priority: JobPriority::Normal,
            timeout_seconds: 1800,
        }
    }

    pub fn add_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }
}

/// 工作流执行状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkflowStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "PARTIAL_SUCCESS")]
    PartialSuccess,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowStatus::Pending | WorkflowStatus::Running)
    }
}

/// 工作流定义针对一个网站的一次运行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub execution_id: String,
    pub workflow_id: String,
    pub website_id: String,
    pub status: WorkflowStatus,
    /// 步骤ID -> 该步骤的执行记录
    pub step_executions: HashMap<String, JobExecution>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowExecution {
    pub fn new(workflow_id: impl Into<String>, website_id: impl Into<String>) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            website_id: website_id.into(),
            status: WorkflowStatus::Pending,
            step_executions: HashMap::new(),
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn mark_running(&mut self) {
        self.status = WorkflowStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn finish(&mut self, status: WorkflowStatus, error_message: Option<String>) {
        self.status = status;
        self.completed_at = Some(Utc::now());
        if error_message.is_some() {
            self.error_message = error_message;
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
