use thiserror::Error;

/// 编排核心错误类型定义
#[derive(Debug, Error)]
pub enum PagewatchError {
    #[error("调度器未运行")]
    SchedulerNotRunning,

    #[error("任务调度失败: {0}")]
    JobScheduling(String),

    #[error("任务执行错误: {0}")]
    JobExecution(String),

    #[error("任务未找到: {id}")]
    JobNotFound { id: String },

    #[error("无效的触发器表达式: {expr} - {message}")]
    InvalidTrigger { expr: String, message: String },

    #[error("工作流未找到: {id}")]
    WorkflowNotFound { id: String },

    #[error("工作流引擎未运行")]
    WorkflowNotRunning,

    #[error("工作流 {workflow_id} 存在循环依赖")]
    CircularDependency { workflow_id: String },

    #[error("工作流步骤 {step} 依赖了未定义的步骤 {missing}")]
    UnknownStepDependency { step: String, missing: String },

    #[error("未知的步骤类型: {0}")]
    UnknownStepType(String),

    #[error("工作流步骤 {step} 执行失败: {message}")]
    StepFailed { step: String, message: String },

    #[error("网站未找到: {id}")]
    WebsiteNotFound { id: String },

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("通知发送失败: {0}")]
    Notification(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type PagewatchResult<T> = std::result::Result<T, PagewatchError>;

impl PagewatchError {
    /// 该错误是否允许调用方重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PagewatchError::JobExecution(_)
                | PagewatchError::Storage(_)
                | PagewatchError::Notification(_)
                | PagewatchError::StepFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PagewatchError::WebsiteNotFound {
            id: "site-1".to_string(),
        };
        assert!(err.to_string().contains("site-1"));

        let err = PagewatchError::InvalidTrigger {
            expr: "abc".to_string(),
            message: "无法解析".to_string(),
        };
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PagewatchError::Storage("超时".to_string()).is_retryable());
        assert!(!PagewatchError::SchedulerNotRunning.is_retryable());
        assert!(!PagewatchError::CircularDependency {
            workflow_id: "wf".to_string()
        }
        .is_retryable());
    }
}
