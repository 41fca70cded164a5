//! 内置工作流目录，在引擎启动时注册

use pagewatch_core::{JobPriority, JobType, WorkflowDefinition, WorkflowStep};

/// 网站监控流水线：抓取 -> 分类 -> 告警处理
pub const WEBSITE_MONITORING: &str = "website_monitoring";

/// 系统健康巡检：三个独立探针 + 一个汇总步骤
pub const SYSTEM_HEALTH_CHECK: &str = "system_health_check";

pub fn builtin_workflows() -> Vec<WorkflowDefinition> {
    vec![website_monitoring(), system_health_check()]
}

fn website_monitoring() -> WorkflowDefinition {
    WorkflowDefinition::new(
        WEBSITE_MONITORING,
        "网站监控",
        "抓取网站内容、分类变更并处理产生的告警",
    )
    .add_step(
        WorkflowStep::new("scrape", JobType::WebsiteMonitor, "内容抓取").with_timeout(300),
    )
    .add_step(
        WorkflowStep::new("classify", JobType::Classification, "内容分类")
            .depends_on("scrape")
            .with_timeout(300),
    )
    .add_step(
        WorkflowStep::new("process_alerts", JobType::AlertProcessing, "告警处理")
            .depends_on("classify")
            .with_timeout(120),
    )
}

fn system_health_check() -> WorkflowDefinition {
    let mut def = WorkflowDefinition::new(
        SYSTEM_HEALTH_CHECK,
        "系统健康巡检",
        "探测各外部协作者并汇总结果",
    )
    .add_step(
        WorkflowStep::new("storage_probe", JobType::HealthCheck, "存储探针")
            .with_parameter("component", serde_json::json!("storage"))
            .with_timeout(30),
    )
    .add_step(
        WorkflowStep::new("scraper_probe", JobType::HealthCheck, "抓取引擎探针")
            .with_parameter("component", serde_json::json!("scraper"))
            .with_timeout(30),
    )
    .add_step(
        WorkflowStep::new("classifier_probe", JobType::HealthCheck, "分类器探针")
            .with_parameter("component", serde_json::json!("classifier"))
            .with_timeout(30),
    )
    .add_step(
        WorkflowStep::new("aggregate", JobType::HealthCheck, "结果汇总")
            .with_parameter("component", serde_json::json!("summary"))
            .depends_on("storage_probe")
            .depends_on("scraper_probe")
            .depends_on("classifier_probe")
            .with_timeout(30),
    );
    def.priority = JobPriority::Low;
    def
}
