//! 组件健康探针
//!
//! 把各外部协作者的健康检查统一为 `HealthProbe`，
//! 检查失败永远折算为不健康状态而不是向上抛错。

use std::sync::Arc;

use async_trait::async_trait;

use pagewatch_core::{Classifier, ComponentHealth, Scraper, Storage};

#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self) -> ComponentHealth;
}

pub struct StorageProbe {
    storage: Arc<dyn Storage>,
}

impl StorageProbe {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl HealthProbe for StorageProbe {
    fn name(&self) -> &str {
        "storage"
    }

    async fn check(&self) -> ComponentHealth {
        match self.storage.health_check().await {
            Ok(health) => health,
            Err(e) => ComponentHealth::unhealthy("storage", format!("健康检查失败: {e}")),
        }
    }
}

pub struct ScraperProbe {
    scraper: Arc<dyn Scraper>,
}

impl ScraperProbe {
    pub fn new(scraper: Arc<dyn Scraper>) -> Self {
        Self { scraper }
    }
}

#[async_trait]
impl HealthProbe for ScraperProbe {
    fn name(&self) -> &str {
        "scraper"
    }

    async fn check(&self) -> ComponentHealth {
        match self.scraper.health_check().await {
            // 协作者的编排统计一并附到健康详情里
            Ok(health) => match self.scraper.orchestrator_stats().await {
                Ok(stats) => health.with_details(stats),
                Err(_) => health,
            },
            Err(e) => ComponentHealth::unhealthy("scraper", format!("健康检查失败: {e}")),
        }
    }
}

pub struct ClassifierProbe {
    classifier: Arc<dyn Classifier>,
}

impl ClassifierProbe {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl HealthProbe for ClassifierProbe {
    fn name(&self) -> &str {
        "classifier"
    }

    async fn check(&self) -> ComponentHealth {
        match self.classifier.health_check().await {
            Ok(health) => match self.classifier.orchestrator_stats().await {
                Ok(stats) => health.with_details(stats),
                Err(_) => health,
            },
            Err(e) => ComponentHealth::unhealthy("classifier", format!("健康检查失败: {e}")),
        }
    }
}
