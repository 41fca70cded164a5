use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

use pagewatch_core::{AppConfig, Classifier, Notifier, Scraper, Storage};
use pagewatch_orchestrator::Orchestrator;

use crate::sim::{SimClassifier, SimNotifier, SimScraper, SimStorage};

/// 主应用程序
///
/// 演示模式下用内置模拟协作者组装编排器，
/// 启动后为存储中的所有网站开启周期监控。
pub struct Application {
    config: AppConfig,
    storage: Arc<dyn Storage>,
    orchestrator: Arc<Orchestrator>,
}

impl Application {
    /// 以内置模拟协作者创建应用实例
    pub fn with_simulated_collaborators(config: AppConfig, demo_websites: usize) -> Self {
        let storage = Arc::new(SimStorage::with_demo_websites(demo_websites));
        let scraper: Arc<dyn Scraper> = Arc::new(SimScraper::new(Arc::clone(&storage)));
        let classifier: Arc<dyn Classifier> = Arc::new(SimClassifier::new(Arc::clone(&storage)));
        let notifier: Arc<dyn Notifier> = Arc::new(SimNotifier);

        let storage: Arc<dyn Storage> = storage;
        let orchestrator = Arc::new(Orchestrator::new(
            config.clone(),
            Arc::clone(&storage),
            scraper,
            classifier,
            notifier,
        ));
        Self {
            config,
            storage,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// 运行应用直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.orchestrator
            .start()
            .await
            .context("启动编排器失败")?;

        // 为存储中的所有网站开启周期监控
        let websites = self
            .storage
            .list_websites()
            .await
            .context("读取网站列表失败")?;
        for website in &websites {
            if !website.enabled {
                continue;
            }
            match self
                .orchestrator
                .schedule_website_monitoring(&website.id, None, None)
                .await
            {
                Ok(job_id) => info!("网站 {} 监控已开启，任务 {}", website.name, job_id),
                Err(e) => warn!("开启网站 {} 监控失败: {}", website.name, e),
            }
        }
        info!(
            "应用已就绪，监控 {} 个网站，默认触发器: {}",
            websites.len(),
            self.config.orchestrator.default_monitor_trigger
        );

        // 阻塞直到收到关闭信号
        let _ = shutdown_rx.recv().await;

        self.orchestrator.stop().await.context("停止编排器失败")?;
        Ok(())
    }
}
