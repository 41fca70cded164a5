pub mod monitor;
pub mod probes;
pub mod system_metrics;

pub use monitor::{HealthMonitor, StatsSource};
pub use probes::{ClassifierProbe, HealthProbe, ScraperProbe, StorageProbe};
