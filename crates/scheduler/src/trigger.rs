use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::debug;

use pagewatch_core::{PagewatchError, PagewatchResult};

/// 触发器表达式解析和计算工具
///
/// 表达式要么是CRON（≥5个空格分隔字段），要么是后缀编码的间隔
/// （`Ns`/`Nm`/`Nh`/`Nd`，纯数字默认为秒）。
#[derive(Debug, Clone)]
pub enum Trigger {
    Cron(Box<Schedule>),
    Interval(Duration),
}

impl Trigger {
    /// 解析触发器表达式，无法解析时立即报错
    pub fn parse(expr: &str) -> PagewatchResult<Self> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(PagewatchError::InvalidTrigger {
                expr: expr.to_string(),
                message: "表达式为空".to_string(),
            });
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() >= 5 {
            // cron crate需要秒字段，5字段表达式补一个秒列
            let normalized = if fields.len() == 5 {
                format!("0 {trimmed}")
            } else {
                trimmed.to_string()
            };
            let schedule =
                Schedule::from_str(&normalized).map_err(|e| PagewatchError::InvalidTrigger {
                    expr: expr.to_string(),
                    message: e.to_string(),
                })?;
            return Ok(Trigger::Cron(Box::new(schedule)));
        }

        Self::parse_interval(trimmed).ok_or_else(|| PagewatchError::InvalidTrigger {
            expr: expr.to_string(),
            message: "既不是CRON表达式也不是有效的间隔".to_string(),
        })
    }

    fn parse_interval(expr: &str) -> Option<Trigger> {
        let (number, unit_seconds) = match expr.chars().last()? {
            's' => (&expr[..expr.len() - 1], 1u64),
            'm' => (&expr[..expr.len() - 1], 60),
            'h' => (&expr[..expr.len() - 1], 3600),
            'd' => (&expr[..expr.len() - 1], 86_400),
            c if c.is_ascii_digit() => (expr, 1),
            _ => return None,
        };
        let value: u64 = number.parse().ok()?;
        if value == 0 {
            return None;
        }
        Some(Trigger::Interval(Duration::from_secs(value * unit_seconds)))
    }

    /// 检查给定时间是否应该触发任务
    pub fn should_trigger(&self, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match self {
            Trigger::Cron(schedule) => {
                // 从上次执行之后查找下一次执行时间；从未执行过时
                // 从一分钟前开始检查，避免错过刚到达的时间点
                let check_from = last_run.unwrap_or(now - chrono::Duration::minutes(1));
                match schedule.after(&check_from).next() {
                    Some(next) => next <= now,
                    None => false,
                }
            }
            Trigger::Interval(interval) => match last_run {
                // 间隔任务首次调度立即触发
                None => true,
                Some(last) => {
                    let elapsed = now - last;
                    elapsed >= chrono::Duration::from_std(*interval)
                        .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 2))
                }
            },
        }
    }

    /// 获取下一次执行时间
    pub fn next_execution_time(
        &self,
        last_run: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Cron(schedule) => schedule.after(&last_run.unwrap_or(now)).next(),
            Trigger::Interval(interval) => {
                let base = last_run.unwrap_or(now);
                Some(base + chrono::Duration::from_std(*interval).ok()?)
            }
        }
    }

    /// 检查任务是否已过期（超过预期执行时间太久）
    pub fn is_overdue(
        &self,
        last_run: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        grace_minutes: i64,
    ) -> bool {
        let Some(last) = last_run else {
            return false;
        };
        match self.next_execution_time(Some(last), now) {
            Some(expected) => {
                let overdue = now > expected + chrono::Duration::minutes(grace_minutes);
                if overdue {
                    debug!(
                        "预期执行时间 {} 已过去超过{}分钟",
                        expected.format("%Y-%m-%d %H:%M:%S UTC"),
                        grace_minutes
                    );
                }
                overdue
            }
            None => false,
        }
    }

    /// 触发器的描述文字，用于日志
    pub fn description(&self) -> String {
        match self {
            Trigger::Cron(_) => "CRON".to_string(),
            Trigger::Interval(interval) => {
                let seconds = interval.as_secs();
                match seconds {
                    s if s < 60 => format!("每{s}秒"),
                    s if s < 3600 => format!("每{}分钟", s / 60),
                    s if s < 86_400 => format!("每{}小时", s / 3600),
                    s => format!("每{}天", s / 86_400),
                }
            }
        }
    }
}
