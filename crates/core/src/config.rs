use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 全局并发执行上限（信号量容量）
    pub max_concurrent_jobs: usize,
    /// 扫描到期任务的轮询间隔（秒）
    pub poll_interval_seconds: u64,
    /// 过期告警宽限期（分钟）
    pub overdue_grace_minutes: i64,
    /// 已完成执行的内存保留窗口大小
    pub recent_window: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 10,
            poll_interval_seconds: 1,
            overdue_grace_minutes: 5,
            recent_window: 100,
        }
    }
}

/// 工作流引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// 已完成工作流的内存保留窗口大小
    pub history_size: usize,
    /// 步骤默认超时（秒）
    pub default_step_timeout_seconds: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            history_size: 50,
            default_step_timeout_seconds: 300,
        }
    }
}

/// 健康监控配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// 巡检间隔（秒）
    pub interval_seconds: u64,
    /// 报告环形缓冲区容量
    pub history_size: usize,
    /// 健康评分告警阈值（0-1）
    pub alert_threshold: f64,
    pub cpu_warning_percent: f64,
    pub memory_warning_percent: f64,
    pub disk_warning_percent: f64,
    /// 成功率低于该值时给出建议
    pub success_rate_warning: f64,
    /// 平均执行时长超过该值（毫秒）时给出建议
    pub slow_job_warning_ms: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            history_size: 100,
            alert_threshold: 0.7,
            cpu_warning_percent: 80.0,
            memory_warning_percent: 85.0,
            disk_warning_percent: 90.0,
            success_rate_warning: 0.9,
            slow_job_warning_ms: 60_000.0,
        }
    }
}

/// 编排器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// 未显式指定时的网站监控间隔触发器
    pub default_monitor_trigger: String,
    /// 系统健康巡检工作流的触发器
    pub health_check_trigger: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_monitor_trigger: "300s".to_string(),
            health_check_trigger: "15m".to_string(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" 或 "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 加载配置：TOML文件 + `PAGEWATCH_`前缀环境变量覆盖
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {path}"));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = ["config/pagewatch.toml", "pagewatch.toml"];
            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("PAGEWATCH")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("构建配置失败")?;
        let app_config: AppConfig = config.try_deserialize().context("解析配置失败")?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// 配置合法性校验
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_concurrent_jobs == 0 {
            return Err(anyhow::anyhow!("scheduler.max_concurrent_jobs 必须大于0"));
        }
        if self.scheduler.poll_interval_seconds == 0 {
            return Err(anyhow::anyhow!("scheduler.poll_interval_seconds 必须大于0"));
        }
        if !(0.0..=1.0).contains(&self.monitor.alert_threshold) {
            return Err(anyhow::anyhow!("monitor.alert_threshold 必须在 [0,1] 范围内"));
        }
        if self.monitor.history_size == 0 {
            return Err(anyhow::anyhow!("monitor.history_size 必须大于0"));
        }
        Ok(())
    }
}
