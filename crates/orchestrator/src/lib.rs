pub mod bridge;
pub mod orchestrator;

pub use orchestrator::Orchestrator;

#[cfg(test)]
pub(crate) mod test_utils;
