use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::{AnalyticsError, AnalyticsResult};

/// 模块调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// 应用时区，固定偏移，如 "UTC"、"+03:00"
    pub timezone: String,
    /// 全局并发执行的模块数
    pub max_workers: usize,
    /// 错过的触发时间在多少秒内仍然执行
    pub misfire_grace_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timezone: "UTC".to_string(),
            max_workers: 5,
            misfire_grace_seconds: 300,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_workers == 0 {
            return Err(anyhow::anyhow!("max_workers必须大于0"));
        }
        parse_timezone(&self.timezone)?;
        Ok(())
    }

    pub fn timezone_offset(&self) -> AnalyticsResult<FixedOffset> {
        parse_timezone(&self.timezone)
    }
}

/// 解析固定偏移时区："UTC"/"Z" 或 "+HH:MM"/"-HH:MM"
pub fn parse_timezone(value: &str) -> AnalyticsResult<FixedOffset> {
    let value = value.trim();
    let invalid = || AnalyticsError::Configuration(format!("无效的时区: '{value}'"));

    if value.eq_ignore_ascii_case("utc") || value == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = if let Some(rest) = value.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = value.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(invalid());
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes >= 60 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// 模块执行器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// 运行记录中保存的输出最大字符数
    pub max_output_chars: usize,
    /// 查询历史时默认返回的记录数
    pub run_history_limit: i64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_output_chars: 10_000,
            run_history_limit: 50,
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_output_chars == 0 {
            return Err(anyhow::anyhow!("max_output_chars必须大于0"));
        }
        if self.run_history_limit <= 0 {
            return Err(anyhow::anyhow!("run_history_limit必须大于0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_timezone("+03:00").unwrap().local_minus_utc(), 3 * 3600);
        assert_eq!(parse_timezone("-05:30").unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!(parse_timezone("+8").unwrap().local_minus_utc(), 8 * 3600);
        assert!(parse_timezone("Europe/Moscow").is_err());
        assert!(parse_timezone("+25:00").is_err());
        assert!(parse_timezone("").is_err());
    }

    #[test]
    fn test_scheduler_config_validation() {
        assert!(SchedulerConfig::default().validate().is_ok());
        let config = SchedulerConfig {
            max_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
