use std::time::Duration;

use pagewatch_core::RetryConfig;

/// 计算第`attempt`次尝试失败后的重试延迟（不含抖动）
///
/// 延迟 = min(initial * base^(attempt-1), max)，随尝试次数单调不减。
pub fn pre_jitter_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let initial = config.initial_delay_seconds as f64;
    let max = config.max_delay_seconds as f64;
    let exponent = attempt.saturating_sub(1) as i32;
    let delay = initial * config.exponential_base.powi(exponent);
    Duration::from_secs_f64(delay.min(max))
}

/// 计算实际重试延迟，启用抖动时按 [0.5, 1.0] 的均匀随机因子缩放
///
/// 抖动用于避免大量任务在同一时刻重试（雷群效应）。
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base = pre_jitter_delay(config, attempt);
    if !config.jitter {
        return base;
    }
    let factor = 0.5 + rand::random::<f64>() * 0.5;
    base.mul_f64(factor)
}
