//! 系统资源指标采集
//!
//! Linux下读取 /proc 计算各项利用率，其他平台返回默认值。

use chrono::Utc;

use pagewatch_core::SystemMetrics;

/// 采集一次系统资源指标
pub async fn sample() -> SystemMetrics {
    SystemMetrics {
        cpu_percent: cpu_percent().await,
        memory_percent: memory_percent(),
        disk_percent: disk_percent(),
        load_average: load_average(),
        collected_at: Utc::now(),
    }
}

/// CPU利用率：两次采样 /proc/stat 取差值
#[cfg(target_os = "linux")]
async fn cpu_percent() -> f64 {
    let Some(first) = read_cpu_times() else {
        return 0.0;
    };
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let Some(second) = read_cpu_times() else {
        return 0.0;
    };

    let total = second.0 - first.0;
    let idle = second.1 - first.1;
    if total <= 0.0 {
        return 0.0;
    }
    ((total - idle) / total * 100.0).clamp(0.0, 100.0)
}

#[cfg(not(target_os = "linux"))]
async fn cpu_percent() -> f64 {
    0.0
}

/// 返回 (total, idle) 累计时钟数
#[cfg(target_os = "linux")]
fn read_cpu_times() -> Option<(f64, f64)> {
    let stat = std::fs::read_to_string("/proc/stat").ok()?;
    let line = stat.lines().next()?;
    if !line.starts_with("cpu ") {
        return None;
    }
    let fields: Vec<f64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|v| v.parse().ok())
        .collect();
    if fields.len() < 5 {
        return None;
    }
    let total: f64 = fields.iter().sum();
    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0.0);
    Some((total, idle))
}

#[cfg(target_os = "linux")]
fn memory_percent() -> f64 {
    let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") else {
        return 0.0;
    };
    let mut total = 0.0;
    let mut available = 0.0;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = parse_kb(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = parse_kb(rest);
        }
    }
    if total <= 0.0 {
        return 0.0;
    }
    ((total - available) / total * 100.0).clamp(0.0, 100.0)
}

#[cfg(not(target_os = "linux"))]
fn memory_percent() -> f64 {
    0.0
}

#[cfg(target_os = "linux")]
fn parse_kb(rest: &str) -> f64 {
    rest.split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0)
}

/// 磁盘利用率需要statvfs，暂不采集
fn disk_percent() -> f64 {
    0.0
}

#[cfg(target_os = "linux")]
fn load_average() -> f64 {
    std::fs::read_to_string("/proc/loadavg")
        .ok()
        .and_then(|s| {
            s.split_whitespace()
                .next()
                .and_then(|v| v.parse::<f64>().ok())
        })
        .unwrap_or(0.0)
}

#[cfg(not(target_os = "linux"))]
fn load_average() -> f64 {
    0.0
}
