pub mod retry;
pub mod scheduler;
pub mod trigger;

#[cfg(test)]
pub(crate) mod test_utils;

pub use retry::{backoff_delay, pre_jitter_delay};
pub use scheduler::{JobFn, JobFnFactory, JobFuture, JobInvocation, JobScheduler};
pub use trigger::Trigger;
