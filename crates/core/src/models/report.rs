use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::JobExecution;

/// 单个组件的健康状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub component: String,
    pub healthy: bool,
    pub message: String,
    pub last_check: DateTime<Utc>,
    pub details: Option<serde_json::Value>,
}

impl ComponentHealth {
    pub fn healthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            healthy: true,
            message: message.into(),
            last_check: Utc::now(),
            details: None,
        }
    }

    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            healthy: false,
            message: message.into(),
            last_check: Utc::now(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// 系统资源指标快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// CPU利用率（0-100）
    pub cpu_percent: f64,
    /// 内存利用率（0-100）
    pub memory_percent: f64,
    /// 磁盘利用率（0-100）
    pub disk_percent: f64,
    /// 1分钟负载均值
    pub load_average: f64,
    pub collected_at: DateTime<Utc>,
}

impl Default for SystemMetrics {
    fn default() -> Self {
        Self {
            cpu_percent: 0.0,
            memory_percent: 0.0,
            disk_percent: 0.0,
            load_average: 0.0,
            collected_at: Utc::now(),
        }
    }
}

/// 调度器聚合统计（派生数据，不直接持久化）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerStats {
    pub total_jobs: usize,
    pub active_executions: usize,
    pub completed_executions: u64,
    pub failed_executions: u64,
    pub pending_retries: u64,
    pub uptime_seconds: u64,
    /// 吞吐量（每小时完成的执行数）
    pub jobs_per_hour: f64,
    /// 成功率（0-1），无执行记录时为1
    pub success_rate: f64,
    pub avg_duration_ms: f64,
}

impl Default for SchedulerStats {
    fn default() -> Self {
        Self {
            total_jobs: 0,
            active_executions: 0,
            completed_executions: 0,
            failed_executions: 0,
            pending_retries: 0,
            uptime_seconds: 0,
            jobs_per_hour: 0.0,
            success_rate: 1.0,
            avg_duration_ms: 0.0,
        }
    }
}

impl SchedulerStats {
    pub fn total_finished(&self) -> u64 {
        self.completed_executions + self.failed_executions
    }
}

/// 一次健康巡检的完整报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub report_id: String,
    pub generated_at: DateTime<Utc>,
    pub hostname: String,
    pub system: SystemMetrics,
    pub components: HashMap<String, ComponentHealth>,
    pub scheduler: SchedulerStats,
    pub active_jobs: usize,
    pub active_workflows: usize,
    pub recent_failures: Vec<JobExecution>,
    /// 面向运维的文字建议，由阈值判断派生
    pub recommendations: Vec<String>,
    /// 归一化健康评分，取值范围 [0,1]
    pub overall_health_score: f64,
}

impl MonitoringReport {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            report_id: Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            hostname: hostname.into(),
            system: SystemMetrics::default(),
            components: HashMap::new(),
            scheduler: SchedulerStats::default(),
            active_jobs: 0,
            active_workflows: 0,
            recent_failures: Vec::new(),
            recommendations: Vec::new(),
            overall_health_score: 1.0,
        }
    }

    pub fn unhealthy_components(&self) -> Vec<&ComponentHealth> {
        self.components.values().filter(|c| !c.healthy).collect()
    }
}
