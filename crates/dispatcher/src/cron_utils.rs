use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use cron::Schedule;

use analytics_core::{AnalyticsError, AnalyticsResult};

/// CRON表达式解析和调度工具
///
/// 接受标准5段表达式（分 时 日 月 周），在前面补上秒字段；
/// 6段表达式（秒在最前）原样使用。触发时间按给定时区计算。
#[derive(Debug, Clone)]
pub struct CronScheduler {
    expression: String,
    schedule: Schedule,
    timezone: FixedOffset,
}

impl CronScheduler {
    /// 创建按UTC计算的CRON调度器
    pub fn new(cron_expr: &str) -> AnalyticsResult<Self> {
        Self::with_timezone(cron_expr, Utc.fix())
    }

    pub fn with_timezone(cron_expr: &str, timezone: FixedOffset) -> AnalyticsResult<Self> {
        let schedule = Self::parse(cron_expr)?;
        Ok(Self {
            expression: cron_expr.trim().to_string(),
            schedule,
            timezone,
        })
    }

    /// 5段表达式补秒字段，并把星期字段换成星期名称
    ///
    /// 标准 cron 中 0 和 7 都是周日、1 是周一；cron crate 从周日=1 开始计数，
    /// 所以数字星期在这里展开成 `SUN`..`SAT`。6段表达式原样交给 cron crate。
    pub fn normalize(cron_expr: &str) -> String {
        let trimmed = cron_expr.trim();
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() == 5 {
            let day_of_week = normalize_day_of_week(fields[4]);
            format!("0 {} {}", fields[..4].join(" "), day_of_week)
        } else {
            trimmed.to_string()
        }
    }

    fn parse(cron_expr: &str) -> AnalyticsResult<Schedule> {
        if cron_expr.trim().is_empty() {
            return Err(AnalyticsError::InvalidCron {
                expr: cron_expr.to_string(),
                message: "表达式为空".to_string(),
            });
        }
        Schedule::from_str(&Self::normalize(cron_expr)).map_err(|e| AnalyticsError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> AnalyticsResult<()> {
        Self::parse(cron_expr).map(|_| ())
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    /// 获取 `from` 之后（不含）的下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<FixedOffset>> {
        self.schedule
            .after(&from.with_timezone(&self.timezone))
            .next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<FixedOffset>> {
        self.schedule
            .after(&from.with_timezone(&self.timezone))
            .take(count)
            .collect()
    }

    /// 获取任务的执行频率描述
    pub fn get_frequency_description(&self) -> String {
        let upcoming = self.upcoming_times(Utc::now(), 2);
        if upcoming.len() >= 2 {
            let seconds = (upcoming[1] - upcoming[0]).num_seconds();

            match seconds {
                s if s < 60 => format!("每{s}秒"),
                s if s < 3600 => format!("每{}分钟", s / 60),
                s if s < 86400 => format!("每{}小时", s / 3600),
                s if s < 604800 => format!("每{}天", s / 86400),
                s => format!("每{}周", s / 604800),
            }
        } else {
            "无法确定频率".to_string()
        }
    }

    /// 触发器描述，用于任务列表展示
    pub fn description(&self) -> String {
        format!("cron[{}] {}", self.expression, self.timezone)
    }
}

const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// 数字星期（0-7，支持列表、范围和步长）展开为名称列表
///
/// `*`、`?` 和已经使用名称的字段不变；无法识别的字段原样返回，由 cron crate 报错。
fn normalize_day_of_week(field: &str) -> String {
    if field == "*" || field == "?" || field.chars().any(|c| c.is_ascii_alphabetic()) {
        return field.to_string();
    }

    let mut days = [false; 7];
    for item in field.split(',') {
        let Some(values) = expand_day_item(item) else {
            return field.to_string();
        };
        for value in values {
            days[value % 7] = true;
        }
    }

    WEEKDAY_NAMES
        .iter()
        .zip(days)
        .filter_map(|(name, selected)| selected.then_some(*name))
        .collect::<Vec<_>>()
        .join(",")
}

fn expand_day_item(item: &str) -> Option<Vec<usize>> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, step.parse::<usize>().ok().filter(|s| *s > 0)?),
        None => (item, 1),
    };

    let (start, end) = if range == "*" {
        (0, 6)
    } else if let Some((start, end)) = range.split_once('-') {
        (start.parse::<usize>().ok()?, end.parse::<usize>().ok()?)
    } else {
        let start = range.parse::<usize>().ok()?;
        // "N/S" 表示从 N 到周末
        (start, if item.contains('/') { 6 } else { start })
    };

    if start > end || end > 7 {
        return None;
    }
    Some((start..=end).step_by(step).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_normalize() {
        assert_eq!(CronScheduler::normalize("0 9 * * *"), "0 0 9 * * *");
        assert_eq!(CronScheduler::normalize(" */5 * * * * * "), "*/5 * * * * *");
        assert_eq!(
            CronScheduler::normalize("0 9 * * 1-5"),
            "0 0 9 * * MON,TUE,WED,THU,FRI"
        );
        assert_eq!(CronScheduler::normalize("0 9 * * MON-FRI"), "0 0 9 * * MON-FRI");
    }

    #[test]
    fn test_normalize_day_of_week() {
        assert_eq!(normalize_day_of_week("0"), "SUN");
        assert_eq!(normalize_day_of_week("7"), "SUN");
        assert_eq!(normalize_day_of_week("1,3"), "MON,WED");
        assert_eq!(normalize_day_of_week("5-7"), "SUN,FRI,SAT");
        assert_eq!(normalize_day_of_week("*/2"), "SUN,TUE,THU,SAT");
        assert_eq!(normalize_day_of_week("1-5/2"), "MON,WED,FRI");
        assert_eq!(normalize_day_of_week("4/1"), "THU,FRI,SAT");
        assert_eq!(normalize_day_of_week("?"), "?");
        // 无法识别的字段交给 cron crate 报错
        assert_eq!(normalize_day_of_week("8"), "8");
        assert_eq!(normalize_day_of_week("5-2"), "5-2");
    }

    #[test]
    fn test_five_field_next_time() {
        let scheduler = CronScheduler::new("0 9 * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let next = scheduler.next_execution_time(now).unwrap();

        assert_eq!(next.hour(), 9);
        assert_eq!(next.minute(), 0);
        assert_eq!(next.second(), 0);
        assert_eq!(next.date_naive().to_string(), "2024-01-02");
    }

    #[test]
    fn test_timezone_shifts_trigger() {
        let tz = FixedOffset::east_opt(3 * 3600).unwrap();
        let scheduler = CronScheduler::with_timezone("0 9 * * *", tz).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let next = scheduler.next_execution_time(now).unwrap();

        assert_eq!(next.hour(), 9);
        assert_eq!(next.with_timezone(&Utc).hour(), 6);
    }

    #[test]
    fn test_validate_cron_expression() {
        assert!(CronScheduler::validate_cron_expression("0 */4 * * *").is_ok());
        assert!(CronScheduler::validate_cron_expression("*/2 * * * * *").is_ok());
        assert!(CronScheduler::validate_cron_expression("invalid").is_err());
        assert!(CronScheduler::validate_cron_expression("0 0 32 * *").is_err());
        assert!(CronScheduler::validate_cron_expression("0 9 * * 0").is_ok());
        assert!(matches!(
            CronScheduler::validate_cron_expression(""),
            Err(AnalyticsError::InvalidCron { .. })
        ));
    }

    #[test]
    fn test_frequency_description() {
        assert_eq!(
            CronScheduler::new("0 */4 * * *").unwrap().get_frequency_description(),
            "每4小时"
        );
        assert_eq!(
            CronScheduler::new("*/10 * * * * *").unwrap().get_frequency_description(),
            "每10秒"
        );
        assert!(CronScheduler::new("0 9 * * *")
            .unwrap()
            .description()
            .contains("0 9 * * *"));
    }
}
