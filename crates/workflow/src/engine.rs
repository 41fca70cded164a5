use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use pagewatch_core::{
    JobExecution, JobPriority, JobType, PagewatchError, PagewatchResult, WorkflowConfig,
    WorkflowDefinition, WorkflowExecution, WorkflowStatus, WorkflowStep,
};
use pagewatch_scheduler::retry::backoff_delay;

use crate::catalog;
use crate::graph;
use crate::steps::StepRunner;

struct Shared {
    config: WorkflowConfig,
    runner: StepRunner,
    definitions: RwLock<HashMap<String, WorkflowDefinition>>,
    /// 活跃执行的权威内存视图
    active: RwLock<HashMap<String, WorkflowExecution>>,
    /// 已完成执行的有界历史
    recent: Mutex<VecDeque<WorkflowExecution>>,
    /// 已请求取消的执行ID
    cancelled: RwLock<HashSet<String>>,
    running: AtomicBool,
    total_executed: AtomicU64,
}

/// DAG工作流引擎
///
/// 注册时校验依赖图（拒绝环与悬空依赖），执行时反复计算
/// "就绪集"——依赖全部完成的步骤——并发运行整个就绪集，
/// 任一步骤失败立即终止工作流（失败步骤的后继永不启动）。
pub struct WorkflowEngine {
    shared: Arc<Shared>,
}

impl WorkflowEngine {
    pub fn new(config: WorkflowConfig, runner: StepRunner) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                runner,
                definitions: RwLock::new(HashMap::new()),
                active: RwLock::new(HashMap::new()),
                recent: Mutex::new(VecDeque::new()),
                cancelled: RwLock::new(HashSet::new()),
                running: AtomicBool::new(false),
                total_executed: AtomicU64::new(0),
            }),
        }
    }

    /// 启动引擎并注册内置工作流目录；停止后可再次启动
    pub async fn setup(&self) -> PagewatchResult<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(PagewatchError::Internal("工作流引擎已在运行".to_string()));
        }
        for def in catalog::builtin_workflows() {
            // 重启时内置工作流已在注册表里，跳过
            if self
                .shared
                .definitions
                .read()
                .await
                .contains_key(&def.workflow_id)
            {
                continue;
            }
            if let Err(e) = self.register_workflow(def).await {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }
        info!("工作流引擎已启动");
        Ok(())
    }

    /// 停止引擎；进行中的执行不会被打断
    pub async fn cleanup(&self) -> PagewatchResult<()> {
        self.shared.running.store(false, Ordering::SeqCst);
        info!("工作流引擎已停止");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// 注册工作流定义，注册时即校验依赖图
    pub async fn register_workflow(&self, def: WorkflowDefinition) -> PagewatchResult<()> {
        graph::validate(&def)?;
        let mut definitions = self.shared.definitions.write().await;
        if definitions.contains_key(&def.workflow_id) {
            return Err(PagewatchError::Configuration(format!(
                "工作流 {} 已注册",
                def.workflow_id
            )));
        }
        info!("已注册工作流 {} ({}个步骤)", def.workflow_id, def.steps.len());
        definitions.insert(def.workflow_id.clone(), def);
        Ok(())
    }

    /// 触发一次工作流执行，立即返回执行ID，执行异步推进
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        website_id: &str,
        params: HashMap<String, serde_json::Value>,
    ) -> PagewatchResult<String> {
        if !self.is_running() {
            return Err(PagewatchError::WorkflowNotRunning);
        }
        let def = self
            .shared
            .definitions
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| PagewatchError::WorkflowNotFound {
                id: workflow_id.to_string(),
            })?;
        // 执行开始前再次校验，任何环都会在任何步骤运行前中止
        graph::validate(&def)?;

        let execution = WorkflowExecution::new(workflow_id, website_id);
        let execution_id = execution.execution_id.clone();
        self.shared
            .active
            .write()
            .await
            .insert(execution_id.clone(), execution);
        self.shared.total_executed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pagewatch_workflows_started_total").increment(1);

        info!(
            "工作流 {} 开始执行 {} (网站: {})",
            workflow_id, execution_id, website_id
        );
        let shared = Arc::clone(&self.shared);
        let driver_id = execution_id.clone();
        let website = website_id.to_string();
        tokio::spawn(async move {
            Shared::drive(shared, def, driver_id, website, params).await;
        });
        Ok(execution_id)
    }

    /// 取消执行：只标记状态与时间戳，已在运行的步骤会各自跑完
    pub async fn cancel_workflow(&self, execution_id: &str) -> bool {
        if !self.shared.active.read().await.contains_key(execution_id) {
            return false;
        }
        self.shared
            .cancelled
            .write()
            .await
            .insert(execution_id.to_string());
        let mut active = self.shared.active.write().await;
        match active.get_mut(execution_id) {
            Some(execution) => {
                execution.status = WorkflowStatus::Cancelled;
                execution.completed_at = Some(Utc::now());
                info!("工作流执行 {} 已标记取消", execution_id);
                true
            }
            None => {
                // 在两次加锁之间执行已经结束
                drop(active);
                self.shared.cancelled.write().await.remove(execution_id);
                false
            }
        }
    }

    /// 查询执行状态：先查活跃集，再查历史窗口
    pub async fn status(&self, execution_id: &str) -> Option<WorkflowExecution> {
        if let Some(execution) = self.shared.active.read().await.get(execution_id) {
            return Some(execution.clone());
        }
        self.shared
            .recent
            .lock()
            .await
            .iter()
            .find(|e| e.execution_id == execution_id)
            .cloned()
    }

    pub async fn list_active(&self) -> Vec<WorkflowExecution> {
        self.shared.active.read().await.values().cloned().collect()
    }

    pub async fn active_count(&self) -> usize {
        self.shared.active.read().await.len()
    }

    pub fn total_executed(&self) -> u64 {
        self.shared.total_executed.load(Ordering::Relaxed)
    }

    pub async fn registered_workflows(&self) -> Vec<String> {
        self.shared.definitions.read().await.keys().cloned().collect()
    }

    pub async fn health_check(&self) -> pagewatch_core::ComponentHealth {
        if self.is_running() {
            pagewatch_core::ComponentHealth::healthy("workflow_engine", "工作流引擎运行中")
                .with_details(serde_json::json!({
                    "registered": self.shared.definitions.read().await.len(),
                    "active": self.active_count().await,
                    "total_executed": self.total_executed(),
                }))
        } else {
            pagewatch_core::ComponentHealth::unhealthy("workflow_engine", "工作流引擎未运行")
        }
    }
}

impl Shared {
    /// 驱动一次工作流执行：按波次运行就绪集直到完成、失败或取消
    async fn drive(
        shared: Arc<Self>,
        def: WorkflowDefinition,
        execution_id: String,
        website_id: String,
        params: HashMap<String, serde_json::Value>,
    ) {
        if let Some(execution) = shared.active.write().await.get_mut(&execution_id) {
            execution.mark_running();
        }

        let mut completed: HashSet<String> = HashSet::new();
        let mut failure: Option<(String, String)> = None;
        let mut cancelled = false;

        loop {
            if shared.cancelled.read().await.contains(&execution_id) {
                cancelled = true;
                break;
            }
            let ready: Vec<WorkflowStep> = graph::ready_steps(&def, &completed)
                .into_iter()
                .cloned()
                .collect();
            if ready.is_empty() {
                break;
            }
            debug!(
                "工作流执行 {} 本波次并发运行 {} 个步骤",
                execution_id,
                ready.len()
            );

            let futures = ready.iter().map(|step| {
                shared.run_step(&execution_id, step, &website_id, def.priority, &params)
            });
            let results = join_all(futures).await;

            for (step, step_execution) in ready.iter().zip(results) {
                if step_execution.is_successful() {
                    completed.insert(step.step_id.clone());
                } else if failure.is_none() {
                    failure = Some((
                        step.step_id.clone(),
                        step_execution
                            .error_message
                            .clone()
                            .unwrap_or_else(|| "未知错误".to_string()),
                    ));
                }
            }
            // 失败立即终止：失败步骤的后继永不启动
            if failure.is_some() {
                break;
            }
        }

        if !cancelled {
            cancelled = shared.cancelled.read().await.contains(&execution_id);
        }
        shared.cancelled.write().await.remove(&execution_id);

        let Some(mut execution) = shared.active.write().await.remove(&execution_id) else {
            return;
        };

        if cancelled {
            if execution.status != WorkflowStatus::Cancelled {
                execution.finish(WorkflowStatus::Cancelled, None);
            }
            info!("工作流执行 {} 已取消", execution_id);
        } else if let Some((step_id, message)) = failure {
            execution.finish(
                WorkflowStatus::Failed,
                Some(format!("步骤 {step_id} 失败: {message}")),
            );
            metrics::counter!("pagewatch_workflows_failed_total").increment(1);
            info!("工作流执行 {} 失败于步骤 {}", execution_id, step_id);
        } else if completed.len() == def.steps.len() {
            execution.finish(WorkflowStatus::Success, None);
            metrics::counter!("pagewatch_workflows_completed_total").increment(1);
            info!("工作流执行 {} 成功完成", execution_id);
        } else {
            // 理论上不可达：依赖图已在注册与执行前校验无环
            execution.finish(
                WorkflowStatus::PartialSuccess,
                Some("部分步骤未能被调度执行".to_string()),
            );
            warn!("工作流执行 {} 以部分成功结束", execution_id);
        }

        shared.push_recent(execution).await;
    }

    /// 运行单个步骤，带超时与步骤级重试
    async fn run_step(
        &self,
        execution_id: &str,
        step: &WorkflowStep,
        website_id: &str,
        priority: JobPriority,
        params: &HashMap<String, serde_json::Value>,
    ) -> JobExecution {
        let mut step_execution = JobExecution::new(step.step_id.clone(), website_id, 1);
        step_execution.mark_running();
        if let Some(execution) = self.active.write().await.get_mut(execution_id) {
            execution
                .step_executions
                .insert(step.step_id.clone(), step_execution.clone());
        }

        let timeout_seconds = if step.timeout_seconds > 0 {
            step.timeout_seconds
        } else {
            self.config.default_step_timeout_seconds
        };
        let timeout = Duration::from_secs(timeout_seconds);
        let max_attempts = step.retry_config.max_retries + 1;
        let mut attempt: u32 = 1;

        loop {
            step_execution.attempt_number = attempt;
            let outcome = match tokio::time::timeout(
                timeout,
                self.dispatch_step(step, website_id, priority, params),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(PagewatchError::StepFailed {
                    step: step.step_id.clone(),
                    message: format!("步骤执行超过{timeout_seconds}秒"),
                }),
            };

            match outcome {
                Ok(data) => {
                    step_execution.mark_success(Some(data));
                    break;
                }
                Err(e) if attempt < max_attempts => {
                    let delay = backoff_delay(&step.retry_config, attempt);
                    warn!(
                        "步骤 {} 第{}次尝试失败，{:.1}秒后重试: {}",
                        step.step_id,
                        attempt,
                        delay.as_secs_f64(),
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    step_execution.mark_failed(e.to_string());
                    break;
                }
            }
        }

        if let Some(execution) = self.active.write().await.get_mut(execution_id) {
            execution
                .step_executions
                .insert(step.step_id.clone(), step_execution.clone());
        }
        step_execution
    }

    async fn dispatch_step(
        &self,
        step: &WorkflowStep,
        website_id: &str,
        priority: JobPriority,
        params: &HashMap<String, serde_json::Value>,
    ) -> PagewatchResult<serde_json::Value> {
        if step.step_type == JobType::Maintenance {
            // 维护步骤清理引擎自身的历史记录
            let pruned = self.prune_history().await;
            return Ok(serde_json::json!({ "pruned_executions": pruned }));
        }
        self.runner.dispatch(step, website_id, priority, params).await
    }

    /// 清理超过24小时的历史执行，返回清理数量
    async fn prune_history(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::hours(24);
        let mut recent = self.recent.lock().await;
        let before = recent.len();
        recent.retain(|e| e.completed_at.map(|t| t > cutoff).unwrap_or(true));
        before - recent.len()
    }

    async fn push_recent(&self, execution: WorkflowExecution) {
        let mut recent = self.recent.lock().await;
        recent.push_back(execution);
        while recent.len() > self.config.history_size {
            recent.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use pagewatch_core::ExecutionStatus;

    use super::*;
    use crate::test_utils::{
        engine_with_classifier, engine_with_stubs, failing_classifier_engine, slow_scraper_engine,
        wait_for_terminal,
    };
    use crate::{SYSTEM_HEALTH_CHECK, WEBSITE_MONITORING};

    fn chain_def(workflow_id: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(workflow_id, "三步链", "")
            .add_step(WorkflowStep::new("a", JobType::WebsiteMonitor, "抓取"))
            .add_step(
                WorkflowStep::new("b", JobType::Classification, "分类").depends_on("a"),
            )
            .add_step(
                WorkflowStep::new("c", JobType::AlertProcessing, "告警").depends_on("b"),
            )
    }

    #[tokio::test]
    async fn test_execute_requires_running_engine() {
        let engine = engine_with_stubs();
        let result = engine
            .execute_workflow(WEBSITE_MONITORING, "site-1", HashMap::new())
            .await;
        assert!(matches!(result, Err(PagewatchError::WorkflowNotRunning)));
    }

    #[tokio::test]
    async fn test_engine_restarts_after_cleanup() {
        let engine = engine_with_stubs();
        engine.setup().await.unwrap();
        engine.cleanup().await.unwrap();
        assert!(!engine.is_running());

        // 再次启动不会因内置工作流重复注册而失败
        engine.setup().await.unwrap();
        assert!(engine.is_running());
        // 用户注册的工作流在重启后依然保留且可执行
        let execution_id = engine
            .execute_workflow(WEBSITE_MONITORING, "site-1", HashMap::new())
            .await
            .unwrap();
        let execution = wait_for_terminal(&engine, &execution_id).await;
        assert_eq!(execution.status, WorkflowStatus::Success);
    }

    #[tokio::test]
    async fn test_register_cyclic_workflow_rejected() {
        let engine = engine_with_stubs();
        engine.setup().await.unwrap();

        let def = WorkflowDefinition::new("cyclic", "环", "")
            .add_step(WorkflowStep::new("a", JobType::HealthCheck, "a").depends_on("b"))
            .add_step(WorkflowStep::new("b", JobType::HealthCheck, "b").depends_on("a"));
        let result = engine.register_workflow(def).await;
        assert!(matches!(
            result,
            Err(PagewatchError::CircularDependency { .. })
        ));
        // 注册失败的工作流不可执行
        assert!(!engine.registered_workflows().await.contains(&"cyclic".to_string()));
    }

    #[tokio::test]
    async fn test_register_duplicate_rejected() {
        let engine = engine_with_stubs();
        engine.setup().await.unwrap();
        let result = engine.register_workflow(chain_def(WEBSITE_MONITORING)).await;
        assert!(matches!(result, Err(PagewatchError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unknown_workflow_rejected() {
        let engine = engine_with_stubs();
        engine.setup().await.unwrap();
        let result = engine
            .execute_workflow("ghost", "site-1", HashMap::new())
            .await;
        assert!(matches!(
            result,
            Err(PagewatchError::WorkflowNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_website_monitoring_end_to_end_success() {
        let engine = engine_with_stubs();
        engine.setup().await.unwrap();

        let execution_id = engine
            .execute_workflow(WEBSITE_MONITORING, "site-1", HashMap::new())
            .await
            .unwrap();
        let execution = wait_for_terminal(&engine, &execution_id).await;

        assert_eq!(execution.status, WorkflowStatus::Success);
        assert_eq!(execution.step_executions.len(), 3);
        for step_id in ["scrape", "classify", "process_alerts"] {
            let step = execution.step_executions.get(step_id).unwrap();
            assert_eq!(step.status, ExecutionStatus::Success, "{step_id} 未成功");
        }
        // 完成后从活跃集移除，转入历史
        assert_eq!(engine.active_count().await, 0);
        assert!(engine.status(&execution_id).await.is_some());
    }

    #[tokio::test]
    async fn test_classification_receives_snapshot_content() {
        let (engine, classifier) = engine_with_classifier();
        engine.setup().await.unwrap();

        let execution_id = engine
            .execute_workflow(WEBSITE_MONITORING, "site-1", HashMap::new())
            .await
            .unwrap();
        let execution = wait_for_terminal(&engine, &execution_id).await;
        assert_eq!(execution.status, WorkflowStatus::Success);

        // 快照的内容载荷随分类调用一并下发
        let content = classifier.last_content.lock().unwrap().clone();
        assert_eq!(
            content,
            Some(serde_json::json!({"html": "<html>桩页面</html>"}))
        );
    }

    #[tokio::test]
    async fn test_failed_step_aborts_dependents() {
        let engine = failing_classifier_engine("分类模型不可用");
        engine.setup().await.unwrap();

        let execution_id = engine
            .execute_workflow(WEBSITE_MONITORING, "site-1", HashMap::new())
            .await
            .unwrap();
        let execution = wait_for_terminal(&engine, &execution_id).await;

        assert_eq!(execution.status, WorkflowStatus::Failed);
        // 失败步骤的后继永不启动
        assert!(!execution.step_executions.contains_key("process_alerts"));
        assert!(execution
            .error_message
            .as_deref()
            .unwrap()
            .contains("分类模型不可用"));
        assert!(execution
            .error_message
            .as_deref()
            .unwrap()
            .contains("classify"));
    }

    #[tokio::test]
    async fn test_chain_failure_creates_no_downstream_executions() {
        // A→B→C，A失败则B、C的执行记录都不应存在
        let engine = failing_classifier_engine("任意错误");
        engine.setup().await.unwrap();

        let def = WorkflowDefinition::new("chain3", "链", "")
            .add_step(WorkflowStep::new("a", JobType::Classification, "分类"))
            .add_step(WorkflowStep::new("b", JobType::WebsiteMonitor, "抓取").depends_on("a"))
            .add_step(WorkflowStep::new("c", JobType::AlertProcessing, "告警").depends_on("b"));
        engine.register_workflow(def).await.unwrap();

        let execution_id = engine
            .execute_workflow("chain3", "site-1", HashMap::new())
            .await
            .unwrap();
        let execution = wait_for_terminal(&engine, &execution_id).await;

        assert_eq!(execution.status, WorkflowStatus::Failed);
        assert!(execution.step_executions.contains_key("a"));
        assert!(!execution.step_executions.contains_key("b"));
        assert!(!execution.step_executions.contains_key("c"));
    }

    #[tokio::test]
    async fn test_system_health_check_workflow() {
        let engine = engine_with_stubs();
        engine.setup().await.unwrap();

        let execution_id = engine
            .execute_workflow(SYSTEM_HEALTH_CHECK, "system", HashMap::new())
            .await
            .unwrap();
        let execution = wait_for_terminal(&engine, &execution_id).await;

        assert_eq!(execution.status, WorkflowStatus::Success);
        assert_eq!(execution.step_executions.len(), 4);
    }

    #[tokio::test]
    async fn test_cancel_marks_execution_cancelled() {
        let engine = slow_scraper_engine(Duration::from_millis(300));
        engine.setup().await.unwrap();

        let execution_id = engine
            .execute_workflow(WEBSITE_MONITORING, "site-1", HashMap::new())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(engine.cancel_workflow(&execution_id).await);

        let execution = wait_for_terminal(&engine, &execution_id).await;
        assert_eq!(execution.status, WorkflowStatus::Cancelled);
        assert!(execution.completed_at.is_some());
        // 取消不存在的执行返回false
        assert!(!engine.cancel_workflow("ghost").await);
    }

    #[tokio::test]
    async fn test_step_timeout_fails_step() {
        let engine = slow_scraper_engine(Duration::from_secs(30));
        engine.setup().await.unwrap();

        let def = WorkflowDefinition::new("timeout_wf", "超时", "")
            .add_step(WorkflowStep::new("scrape", JobType::WebsiteMonitor, "抓取").with_timeout(1));
        engine.register_workflow(def).await.unwrap();

        let execution_id = engine
            .execute_workflow("timeout_wf", "site-1", HashMap::new())
            .await
            .unwrap();
        let execution = wait_for_terminal(&engine, &execution_id).await;
        assert_eq!(execution.status, WorkflowStatus::Failed);
        assert!(execution.error_message.as_deref().unwrap().contains("超过"));
    }

    #[tokio::test]
    async fn test_unknown_health_component_fails_workflow() {
        let engine = engine_with_stubs();
        engine.setup().await.unwrap();

        let def = WorkflowDefinition::new("bad_probe", "未知探针", "").add_step(
            WorkflowStep::new("probe", JobType::HealthCheck, "探针")
                .with_parameter("component", serde_json::json!("mainframe")),
        );
        engine.register_workflow(def).await.unwrap();

        let execution_id = engine
            .execute_workflow("bad_probe", "system", HashMap::new())
            .await
            .unwrap();
        let execution = wait_for_terminal(&engine, &execution_id).await;
        assert_eq!(execution.status, WorkflowStatus::Failed);
        assert!(execution
            .error_message
            .as_deref()
            .unwrap()
            .contains("mainframe"));
    }
}
