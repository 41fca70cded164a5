pub mod catalog;
pub mod engine;
pub mod graph;
pub mod steps;

pub use catalog::{builtin_workflows, SYSTEM_HEALTH_CHECK, WEBSITE_MONITORING};
pub use engine::WorkflowEngine;
pub use steps::StepRunner;

#[cfg(test)]
pub(crate) mod test_utils;
