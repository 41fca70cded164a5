//! 外部协作者接口
//!
//! 编排核心不实现抓取、分类、持久化和通知投递本身，
//! 只通过这些trait与外部组件交互。所有调用都可能失败，
//! 调用方必须捕获错误而不能让核心崩溃。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::PagewatchResult;
use crate::models::{ComponentHealth, JobConfig, JobExecution, JobPriority};

/// 被监控的网站
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Website {
    pub id: String,
    pub url: String,
    pub name: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// 网站内容快照（抓取引擎产出，存储在外部）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub website_id: String,
    pub content_hash: String,
    /// 抓取到的内容载荷，供分类器直接消费；存储端可能不回传
    pub content_data: Option<serde_json::Value>,
    pub captured_at: DateTime<Utc>,
}

/// 告警级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlertSeverity {
    #[serde(rename = "critical")]
    Critical,
    #[serde(rename = "high")]
    High,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "low")]
    Low,
}

/// 篡改告警
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub website_id: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    /// 是否已通过通知渠道发出
    pub notified: bool,
    pub created_at: DateTime<Utc>,
}

/// 持久化存储协作者
///
/// 同时承担业务数据（网站/快照/告警）与调度器的持久化任务存储：
/// 任务定义与执行历史以 `job_id`/`execution_id` 为键保存，
/// 使周期性任务在进程重启后得以恢复。
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_website(&self, website_id: &str) -> PagewatchResult<Option<Website>>;
    async fn list_websites(&self) -> PagewatchResult<Vec<Website>>;
    async fn get_latest_snapshot(&self, website_id: &str) -> PagewatchResult<Option<Snapshot>>;
    async fn get_website_alerts(&self, website_id: &str) -> PagewatchResult<Vec<Alert>>;
    async fn create_alert(&self, alert: Alert) -> PagewatchResult<Alert>;
    async fn update_alert(
        &self,
        alert_id: &str,
        fields: HashMap<String, serde_json::Value>,
    ) -> PagewatchResult<bool>;

    /// 持久化任务定义，key为job_id，重复保存视为更新
    async fn save_job(&self, job: &JobConfig) -> PagewatchResult<()>;
    async fn delete_job(&self, job_id: &str) -> PagewatchResult<bool>;
    /// 进程重启后恢复所有任务定义
    async fn load_jobs(&self) -> PagewatchResult<Vec<JobConfig>>;
    /// 保存执行记录用于审计与历史查询
    async fn save_execution(&self, execution: &JobExecution) -> PagewatchResult<()>;

    async fn health_check(&self) -> PagewatchResult<ComponentHealth>;
}

/// 浏览器自动化抓取协作者
#[async_trait]
pub trait Scraper: Send + Sync {
    /// 调度一次抓取，返回抓取引擎内部的任务ID
    async fn schedule_scraping(
        &self,
        website_id: &str,
        url: &str,
        priority: JobPriority,
        metadata: HashMap<String, serde_json::Value>,
    ) -> PagewatchResult<String>;

    /// 抓取引擎自身的调度统计（队列深度、吞吐等，结构由协作者定义）
    async fn orchestrator_stats(&self) -> PagewatchResult<serde_json::Value>;

    async fn health_check(&self) -> PagewatchResult<ComponentHealth>;
}

/// 内容分类协作者
#[async_trait]
pub trait Classifier: Send + Sync {
    /// 针对最近一次快照调度内容分类，返回分类任务ID
    ///
    /// `content_data` 是快照附带的内容载荷，分类器优先使用它，
    /// 缺失时按 `snapshot_id` 自行回查存储。
    #[allow(clippy::too_many_arguments)]
    async fn schedule_classification(
        &self,
        website_id: &str,
        url: &str,
        website_name: &str,
        snapshot_id: &str,
        content_data: Option<serde_json::Value>,
        priority: JobPriority,
        metadata: HashMap<String, serde_json::Value>,
    ) -> PagewatchResult<String>;

    /// 分类器自身的调度统计（队列深度、吞吐等，结构由协作者定义）
    async fn orchestrator_stats(&self) -> PagewatchResult<serde_json::Value>;

    async fn health_check(&self) -> PagewatchResult<ComponentHealth>;
}

/// 通知投递协作者
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 投递一条篡改告警，返回是否实际发出
    async fn send_alert_notification(&self, alert: &Alert) -> PagewatchResult<bool>;

    /// 系统健康告警（健康评分跌破阈值时触发）
    async fn send_health_alert(
        &self,
        message: &str,
        unhealthy_components: &[String],
        recommendations: &[String],
    ) -> PagewatchResult<()>;

    /// 周期性系统状态摘要
    async fn send_system_status(&self, status: &serde_json::Value) -> PagewatchResult<()>;
}
