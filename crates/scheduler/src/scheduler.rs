use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::{broadcast, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pagewatch_core::{
    ComponentHealth, JobConfig, JobExecution, PagewatchError, PagewatchResult, SchedulerConfig,
    SchedulerStats, Storage,
};

use crate::retry::backoff_delay;
use crate::trigger::Trigger;

/// 任务函数的返回值
pub type JobFuture = Pin<Box<dyn Future<Output = PagewatchResult<serde_json::Value>> + Send>>;

/// 用户任务函数：每次执行（含重试）都会以新的调用上下文被调用
pub type JobFn = Arc<dyn Fn(JobInvocation) -> JobFuture + Send + Sync>;

/// 恢复持久化任务时为其重建任务函数的工厂
pub type JobFnFactory = dyn Fn(&JobConfig) -> JobFn + Send + Sync;

/// 一次任务调用的上下文
#[derive(Clone)]
pub struct JobInvocation {
    pub job: JobConfig,
    pub execution_id: String,
    pub attempt: u32,
}

struct JobEntry {
    config: JobConfig,
    trigger: Trigger,
    func: JobFn,
    paused: bool,
    last_fire: Option<DateTime<Utc>>,
}

struct Shared {
    config: SchedulerConfig,
    storage: Arc<dyn Storage>,
    jobs: RwLock<HashMap<String, JobEntry>>,
    /// 当前活跃执行的权威内存视图，用于快速状态查询
    active: RwLock<HashMap<String, JobExecution>>,
    /// 已完成执行的有界窗口，供统计与失败列表使用
    recent: Mutex<VecDeque<JobExecution>>,
    semaphore: Arc<Semaphore>,
    running: AtomicBool,
    started_at: RwLock<Option<DateTime<Utc>>>,
    completed: AtomicU64,
    failed: AtomicU64,
    pending_retries: AtomicU64,
}

/// 持久化任务调度器
///
/// 维护周期性/一次性任务集合，按触发器调度到期任务，
/// 以有界信号量控制并发，失败时按指数退避重试。
/// 任务定义通过存储协作者持久化，进程重启后可恢复。
pub struct JobScheduler {
    shared: Arc<Shared>,
    scan_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<broadcast::Sender<()>>>,
}

impl JobScheduler {
    pub fn new(config: SchedulerConfig, storage: Arc<dyn Storage>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self {
            shared: Arc::new(Shared {
                config,
                storage,
                jobs: RwLock::new(HashMap::new()),
                active: RwLock::new(HashMap::new()),
                recent: Mutex::new(VecDeque::new()),
                semaphore,
                running: AtomicBool::new(false),
                started_at: RwLock::new(None),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                pending_retries: AtomicU64::new(0),
            }),
            scan_handle: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
        }
    }

    /// 启动调度器：开启到期任务扫描循环
    pub async fn setup(&self) -> PagewatchResult<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(PagewatchError::Internal("调度器已在运行".to_string()));
        }
        *self.shared.started_at.write().await = Some(Utc::now());

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        let shared = Arc::clone(&self.shared);
        let poll_interval = shared.config.poll_interval_seconds;
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(poll_interval));
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        Shared::scan_once(&shared).await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("调度循环收到关闭信号");
                        break;
                    }
                }
            }
        });
        *self.scan_handle.lock().await = Some(handle);

        info!(
            "任务调度器已启动，并发上限: {}, 轮询间隔: {}秒",
            self.shared.config.max_concurrent_jobs, poll_interval
        );
        Ok(())
    }

    /// 停止调度器，已在运行的执行不会被打断
    pub async fn cleanup(&self) -> PagewatchResult<()> {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.scan_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("等待调度循环退出失败: {}", e);
            }
        }
        info!("任务调度器已停止");
        Ok(())
    }

    fn ensure_running(&self) -> PagewatchResult<()> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(PagewatchError::SchedulerNotRunning);
        }
        Ok(())
    }

    /// 注册任务：校验触发器、持久化定义、纳入调度
    ///
    /// 返回任务的调度句柄（job_id）。
    pub async fn schedule(&self, config: JobConfig, func: JobFn) -> PagewatchResult<String> {
        self.ensure_running()?;
        let trigger = Trigger::parse(&config.trigger)?;

        self.shared
            .storage
            .save_job(&config)
            .await
            .map_err(|e| PagewatchError::JobScheduling(format!("持久化任务定义失败: {e}")))?;

        let job_id = config.job_id.clone();
        info!(
            "已调度{}，触发器: {} ({})",
            config.entity_description(),
            config.trigger,
            trigger.description()
        );
        self.shared.jobs.write().await.insert(
            job_id.clone(),
            JobEntry {
                config,
                trigger,
                func,
                paused: false,
                last_fire: None,
            },
        );
        Ok(job_id)
    }

    /// 取消任务调度并删除持久化定义
    pub async fn unschedule(&self, job_id: &str) -> bool {
        let removed = self.shared.jobs.write().await.remove(job_id).is_some();
        if removed {
            if let Err(e) = self.shared.storage.delete_job(job_id).await {
                warn!("删除持久化任务 {} 失败: {}", job_id, e);
            }
            info!("任务 {} 已取消调度", job_id);
        }
        removed
    }

    pub async fn pause(&self, job_id: &str) -> bool {
        match self.shared.jobs.write().await.get_mut(job_id) {
            Some(entry) => {
                entry.paused = true;
                info!("任务 {} 已暂停", job_id);
                true
            }
            None => false,
        }
    }

    pub async fn resume(&self, job_id: &str) -> bool {
        match self.shared.jobs.write().await.get_mut(job_id) {
            Some(entry) => {
                entry.paused = false;
                info!("任务 {} 已恢复", job_id);
                true
            }
            None => false,
        }
    }

    /// 暂停所有任务，返回受影响数量
    pub async fn pause_all(&self) -> usize {
        let mut jobs = self.shared.jobs.write().await;
        for entry in jobs.values_mut() {
            entry.paused = true;
        }
        info!("已暂停全部 {} 个任务", jobs.len());
        jobs.len()
    }

    pub async fn resume_all(&self) -> usize {
        let mut jobs = self.shared.jobs.write().await;
        for entry in jobs.values_mut() {
            entry.paused = false;
        }
        info!("已恢复全部 {} 个任务", jobs.len());
        jobs.len()
    }

    /// 绕过触发器立即执行一个已注册的任务
    pub async fn run_job_now(&self, job_id: &str) -> PagewatchResult<String> {
        self.ensure_running()?;
        let (config, func) = {
            let jobs = self.shared.jobs.read().await;
            let entry = jobs.get(job_id).ok_or_else(|| PagewatchError::JobNotFound {
                id: job_id.to_string(),
            })?;
            (entry.config.clone(), entry.func.clone())
        };
        Ok(self.shared.spawn_execution(config, func, 1))
    }

    /// 进程重启后恢复持久化的任务定义
    ///
    /// 任务函数无法持久化，由调用方提供的工厂按任务定义重建。
    pub async fn restore_jobs(&self, factory: &JobFnFactory) -> PagewatchResult<usize> {
        self.ensure_running()?;
        let configs = self.shared.storage.load_jobs().await?;
        let mut restored = 0;
        let mut jobs = self.shared.jobs.write().await;
        for config in configs {
            let trigger = match Trigger::parse(&config.trigger) {
                Ok(t) => t,
                Err(e) => {
                    warn!("恢复任务 {} 失败，触发器无效: {}", config.job_id, e);
                    continue;
                }
            };
            let func = factory(&config);
            jobs.insert(
                config.job_id.clone(),
                JobEntry {
                    config,
                    trigger,
                    func,
                    paused: false,
                    last_fire: None,
                },
            );
            restored += 1;
        }
        if restored > 0 {
            info!("已从存储恢复 {} 个任务", restored);
        }
        Ok(restored)
    }

    /// 聚合统计，全部由内存计数器派生
    pub async fn stats(&self) -> SchedulerStats {
        let total_jobs = self.shared.jobs.read().await.len();
        let active_executions = self.shared.active.read().await.len();
        let completed = self.shared.completed.load(Ordering::Relaxed);
        let failed = self.shared.failed.load(Ordering::Relaxed);
        let pending_retries = self.shared.pending_retries.load(Ordering::Relaxed);

        let uptime_seconds = match *self.shared.started_at.read().await {
            Some(start) => (Utc::now() - start).num_seconds().max(0) as u64,
            None => 0,
        };

        let finished = completed + failed;
        let success_rate = if finished == 0 {
            1.0
        } else {
            completed as f64 / finished as f64
        };
        let jobs_per_hour = if uptime_seconds > 0 {
            finished as f64 * 3600.0 / uptime_seconds as f64
        } else {
            0.0
        };

        let avg_duration_ms = {
            let recent = self.shared.recent.lock().await;
            let durations: Vec<f64> = recent
                .iter()
                .filter_map(|e| e.duration())
                .map(|d| d.num_milliseconds() as f64)
                .collect();
            if durations.is_empty() {
                0.0
            } else {
                durations.iter().sum::<f64>() / durations.len() as f64
            }
        };

        SchedulerStats {
            total_jobs,
            active_executions,
            completed_executions: completed,
            failed_executions: failed,
            pending_retries,
            uptime_seconds,
            jobs_per_hour,
            success_rate,
            avg_duration_ms,
        }
    }

    pub async fn health_check(&self) -> ComponentHealth {
        let stats = self.stats().await;
        if self.shared.running.load(Ordering::SeqCst) {
            ComponentHealth::healthy("scheduler", "调度器运行中").with_details(serde_json::json!({
                "total_jobs": stats.total_jobs,
                "active_executions": stats.active_executions,
                "success_rate": stats.success_rate,
            }))
        } else {
            ComponentHealth::unhealthy("scheduler", "调度器未运行")
        }
    }

    /// 当前活跃（排队或运行中）的执行记录
    pub async fn active_executions(&self) -> Vec<JobExecution> {
        self.shared.active.read().await.values().cloned().collect()
    }

    /// 最近失败的执行记录，最新在前
    pub async fn recent_failures(&self, limit: usize) -> Vec<JobExecution> {
        self.shared
            .recent
            .lock()
            .await
            .iter()
            .rev()
            .filter(|e| e.error_message.is_some())
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }
}

impl Shared {
    /// 扫描一轮到期任务并派发
    async fn scan_once(shared: &Arc<Self>) {
        let start = std::time::Instant::now();
        let now = Utc::now();
        let mut due = Vec::new();
        {
            let mut jobs = shared.jobs.write().await;
            for entry in jobs.values_mut() {
                if entry.paused {
                    continue;
                }
                if entry.trigger.should_trigger(entry.last_fire, now) {
                    if entry.trigger.is_overdue(
                        entry.last_fire,
                        now,
                        shared.config.overdue_grace_minutes,
                    ) {
                        warn!(
                            "任务 {} 可能已过期，预期执行时间已过去超过{}分钟",
                            entry.config.job_id, shared.config.overdue_grace_minutes
                        );
                    }
                    entry.last_fire = Some(now);
                    due.push((entry.config.clone(), entry.func.clone()));
                }
            }
        }

        let dispatched = due.len();
        for (config, func) in due {
            shared.spawn_execution(config, func, 1);
        }
        if dispatched > 0 {
            debug!("本轮扫描派发了 {} 个任务", dispatched);
        }
        metrics::histogram!("pagewatch_scan_duration_seconds")
            .record(start.elapsed().as_secs_f64());
    }

    /// 为任务创建一次执行并异步派发，返回执行ID
    fn spawn_execution(self: &Arc<Self>, config: JobConfig, func: JobFn, attempt: u32) -> String {
        let execution = JobExecution::new(&config.job_id, &config.website_id, attempt);
        let execution_id = execution.execution_id.clone();
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            shared.run_execution(execution, config, func, attempt).await;
        });
        execution_id
    }

    async fn run_execution(
        self: Arc<Self>,
        mut execution: JobExecution,
        config: JobConfig,
        func: JobFn,
        attempt: u32,
    ) {
        let execution_id = execution.execution_id.clone();
        self.active
            .write()
            .await
            .insert(execution_id.clone(), execution.clone());

        // 并发槽位贯穿整个执行过程，所有退出路径依赖RAII释放
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.active.write().await.remove(&execution_id);
                return;
            }
        };

        execution.mark_running();
        if let Some(entry) = self.active.write().await.get_mut(&execution_id) {
            entry.mark_running();
        }

        let invocation = JobInvocation {
            job: config.clone(),
            execution_id: execution_id.clone(),
            attempt,
        };
        let started = std::time::Instant::now();
        let outcome = AssertUnwindSafe((func)(invocation)).catch_unwind().await;
        metrics::histogram!("pagewatch_job_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(PagewatchError::JobExecution(
                "任务函数发生panic".to_string(),
            )),
        };

        self.active.write().await.remove(&execution_id);

        match result {
            Ok(data) => {
                execution.mark_success(Some(data));
                self.completed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("pagewatch_jobs_completed_total").increment(1);
                debug!("执行 {} 成功（第{}次尝试）", execution_id, attempt);
            }
            Err(e) => {
                execution.mark_failed(e.to_string());
                self.failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("pagewatch_jobs_failed_total").increment(1);

                if attempt < config.retry_config.max_retries {
                    let delay = backoff_delay(&config.retry_config, attempt);
                    execution.mark_retrying();
                    info!(
                        "任务 {} 第{}次尝试失败，{:.1}秒后重试: {}",
                        config.job_id,
                        attempt,
                        delay.as_secs_f64(),
                        e
                    );
                    self.pending_retries.fetch_add(1, Ordering::Relaxed);
                    let shared = Arc::clone(&self);
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        shared.pending_retries.fetch_sub(1, Ordering::Relaxed);
                        if shared.running.load(Ordering::SeqCst) {
                            // 重试必须带上原始任务函数与参数
                            shared.spawn_execution(config, func, attempt + 1);
                        }
                    });
                } else {
                    warn!(
                        "任务 {} 第{}次尝试失败，重试次数已耗尽: {}",
                        config.job_id, attempt, e
                    );
                }
            }
        }

        self.push_recent(execution.clone()).await;
        if let Err(e) = self.storage.save_execution(&execution).await {
            warn!("保存执行记录 {} 失败: {}", execution_id, e);
        }
        drop(permit);
    }

    async fn push_recent(&self, execution: JobExecution) {
        let mut recent = self.recent.lock().await;
        recent.push_back(execution);
        while recent.len() > self.config.recent_window {
            recent.pop_front();
        }
    }
}
