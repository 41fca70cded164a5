use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::interval;
use tracing::{debug, info, warn};

use pagewatch_core::{
    ComponentHealth, JobExecution, MonitorConfig, MonitoringReport, Notifier, PagewatchError,
    PagewatchResult, SchedulerStats, SystemMetrics,
};

use crate::probes::HealthProbe;
use crate::system_metrics;

/// 运行时统计来源（由编排层桥接调度器与工作流引擎）
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn scheduler_stats(&self) -> SchedulerStats;
    async fn active_jobs(&self) -> usize;
    async fn active_workflows(&self) -> usize;
    async fn recent_failures(&self) -> Vec<JobExecution>;
    /// 调度器与工作流引擎自身的健康状态
    async fn core_components(&self) -> Vec<ComponentHealth>;
}

struct Shared {
    config: MonitorConfig,
    probes: RwLock<Vec<Arc<dyn HealthProbe>>>,
    stats: Arc<dyn StatsSource>,
    notifier: Arc<dyn Notifier>,
    /// 报告环形缓冲区，最旧的先被淘汰
    reports: RwLock<VecDeque<MonitoringReport>>,
    running: AtomicBool,
    /// 当前是否处于告警状态，用于只在穿越阈值时发送告警
    alert_active: AtomicBool,
}

/// 健康监控器
///
/// 周期性生成系统健康报告：采集资源指标、探测各组件、
/// 汇总调度统计并计算归一化健康评分。评分跌破阈值时
/// 通过通知渠道发出健康告警，恢复后自动解除。
pub struct HealthMonitor {
    shared: Arc<Shared>,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl HealthMonitor {
    pub fn new(
        config: MonitorConfig,
        probes: Vec<Arc<dyn HealthProbe>>,
        stats: Arc<dyn StatsSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                probes: RwLock::new(probes),
                stats,
                notifier,
                reports: RwLock::new(VecDeque::new()),
                running: AtomicBool::new(false),
                alert_active: AtomicBool::new(false),
            }),
            handle: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
        }
    }

    /// 启动巡检循环
    pub async fn setup(&self) -> PagewatchResult<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(PagewatchError::Internal("健康监控器已在运行".to_string()));
        }

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let mut check_interval = interval(Duration::from_secs(shared.config.interval_seconds));
            loop {
                tokio::select! {
                    _ = check_interval.tick() => {
                        let report = shared.check_now().await;
                        debug!(
                            "健康巡检完成，评分 {:.2}，{}个组件不健康",
                            report.overall_health_score,
                            report.unhealthy_components().len()
                        );
                    }
                    _ = &mut shutdown_rx => {
                        info!("健康监控器收到停止信号");
                        break;
                    }
                }
            }
        });
        *self.handle.lock().await = Some(handle);
        info!(
            "健康监控器已启动，巡检间隔{}秒",
            self.shared.config.interval_seconds
        );
        Ok(())
    }

    /// 停止巡检循环
    pub async fn cleanup(&self) -> PagewatchResult<()> {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(shutdown_tx) = self.shutdown_tx.lock().await.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("等待巡检循环退出失败: {}", e);
            }
        }
        info!("健康监控器已停止");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// 注册一个额外的健康探针，下一轮巡检即生效
    pub async fn register_check(&self, probe: Arc<dyn HealthProbe>) {
        self.shared.probes.write().await.push(probe);
    }

    /// 立即执行一次巡检（生成报告、入历史、判断告警）
    pub async fn check_now(&self) -> MonitoringReport {
        self.shared.check_now().await
    }

    /// 生成一份报告但不入历史、不触发告警
    pub async fn generate_report(&self) -> MonitoringReport {
        self.shared.generate_report().await
    }

    pub async fn latest_report(&self) -> Option<MonitoringReport> {
        self.shared.reports.read().await.back().cloned()
    }

    /// 最近的巡检报告，最多返回`limit`条，最新的在队尾
    pub async fn report_history(&self, limit: usize) -> Vec<MonitoringReport> {
        let reports = self.shared.reports.read().await;
        let skip = reports.len().saturating_sub(limit);
        reports.iter().skip(skip).cloned().collect()
    }

    pub async fn health_check(&self) -> ComponentHealth {
        if self.is_running() {
            ComponentHealth::healthy("health_monitor", "健康监控器运行中")
        } else {
            ComponentHealth::unhealthy("health_monitor", "健康监控器未运行")
        }
    }
}

impl Shared {
    async fn check_now(&self) -> MonitoringReport {
        let report = self.generate_report().await;

        metrics::gauge!("pagewatch_health_score").set(report.overall_health_score);
        metrics::counter!("pagewatch_health_checks_total").increment(1);

        self.evaluate_alert(&report).await;

        let mut reports = self.reports.write().await;
        reports.push_back(report.clone());
        while reports.len() > self.config.history_size {
            reports.pop_front();
        }
        report
    }

    async fn generate_report(&self) -> MonitoringReport {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        let mut report = MonitoringReport::new(hostname);

        report.system = system_metrics::sample().await;

        let probes: Vec<Arc<dyn HealthProbe>> = self.probes.read().await.clone();
        for probe in &probes {
            let health = probe.check().await;
            report.components.insert(probe.name().to_string(), health);
        }
        for health in self.stats.core_components().await {
            report.components.insert(health.component.clone(), health);
        }

        report.scheduler = self.stats.scheduler_stats().await;
        report.active_jobs = self.stats.active_jobs().await;
        report.active_workflows = self.stats.active_workflows().await;
        report.recent_failures = self.stats.recent_failures().await;

        report.recommendations =
            recommendations(&self.config, &report.system, &report.scheduler, &report);
        report.overall_health_score =
            health_score(&report.system, &report.scheduler, &report.components);
        report
    }

    /// 只在评分穿越阈值时发送/解除告警，避免每轮巡检都重复通知
    async fn evaluate_alert(&self, report: &MonitoringReport) {
        let below = report.overall_health_score < self.config.alert_threshold;
        let was_active = self.alert_active.swap(below, Ordering::SeqCst);

        if below && !was_active {
            let unhealthy: Vec<String> = report
                .unhealthy_components()
                .iter()
                .map(|c| c.component.clone())
                .collect();
            let message = format!(
                "系统健康评分 {:.2} 低于告警阈值 {:.2}",
                report.overall_health_score, self.config.alert_threshold
            );
            warn!("{}", message);
            if let Err(e) = self
                .notifier
                .send_health_alert(&message, &unhealthy, &report.recommendations)
                .await
            {
                warn!("发送健康告警失败: {}", e);
            }
        } else if !below && was_active {
            info!(
                "系统健康评分恢复到 {:.2}，告警解除",
                report.overall_health_score
            );
            let status = serde_json::json!({
                "event": "recovered",
                "health_score": report.overall_health_score,
                "active_jobs": report.active_jobs,
                "active_workflows": report.active_workflows,
            });
            if let Err(e) = self.notifier.send_system_status(&status).await {
                warn!("发送系统状态摘要失败: {}", e);
            }
        }
    }
}

/// 归一化健康评分：资源、成功率、组件健康各占一票，取均值
///
/// 每个资源维度贡献 `1 - 利用率/100`，每个组件贡献 1（健康）或 0，
/// 调度成功率直接作为一项。结果恒定落在 [0,1]。
pub fn health_score(
    system: &SystemMetrics,
    scheduler: &SchedulerStats,
    components: &std::collections::HashMap<String, ComponentHealth>,
) -> f64 {
    let mut terms: Vec<f64> = vec![
        1.0 - (system.cpu_percent / 100.0).clamp(0.0, 1.0),
        1.0 - (system.memory_percent / 100.0).clamp(0.0, 1.0),
        1.0 - (system.disk_percent / 100.0).clamp(0.0, 1.0),
        scheduler.success_rate.clamp(0.0, 1.0),
    ];
    for health in components.values() {
        terms.push(if health.healthy { 1.0 } else { 0.0 });
    }
    let score = terms.iter().sum::<f64>() / terms.len() as f64;
    score.clamp(0.0, 1.0)
}

/// 基于阈值派生面向运维的文字建议
pub fn recommendations(
    config: &MonitorConfig,
    system: &SystemMetrics,
    scheduler: &SchedulerStats,
    report: &MonitoringReport,
) -> Vec<String> {
    let mut out = Vec::new();

    if system.cpu_percent > config.cpu_warning_percent {
        out.push(format!(
            "CPU使用率 {:.1}% 过高，考虑降低任务并发或扩容",
            system.cpu_percent
        ));
    }
    if system.memory_percent > config.memory_warning_percent {
        out.push(format!(
            "内存使用率 {:.1}% 过高，检查是否存在内存泄漏",
            system.memory_percent
        ));
    }
    if system.disk_percent > config.disk_warning_percent {
        out.push(format!(
            "磁盘使用率 {:.1}% 过高，清理历史数据或扩容",
            system.disk_percent
        ));
    }
    if scheduler.success_rate < config.success_rate_warning {
        out.push(format!(
            "任务成功率 {:.1}% 偏低，检查近期失败的执行记录",
            scheduler.success_rate * 100.0
        ));
    }
    if scheduler.avg_duration_ms > config.slow_job_warning_ms {
        out.push(format!(
            "平均执行时长 {:.0}ms 偏高，检查外部协作者响应速度",
            scheduler.avg_duration_ms
        ));
    }
    for health in report.unhealthy_components() {
        out.push(format!(
            "组件 {} 不健康: {}",
            health.component, health.message
        ));
    }
    out
}
