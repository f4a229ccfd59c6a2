use analytics_core::{
    models::{AlertRecord, ModuleRunResult, Severity},
    traits::AlertSink,
    AnalyticsResult,
};
use async_trait::async_trait;
use tracing::{error, info, warn};

/// 把告警写入日志的默认通知渠道
#[derive(Debug, Default, Clone)]
pub struct LoggingAlertSink;

impl LoggingAlertSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AlertSink for LoggingAlertSink {
    async fn deliver(&self, module_id: &str, alerts: &[AlertRecord]) -> AnalyticsResult<()> {
        for alert in alerts {
            match alert.severity {
                Severity::Critical | Severity::High => warn!(
                    event = "alert",
                    module.id = module_id,
                    alert.severity = alert.severity.as_str(),
                    alert.entity = alert.entity.as_deref().unwrap_or_default(),
                    "{}: {}",
                    alert.title,
                    alert.message
                ),
                Severity::Medium | Severity::Low => info!(
                    event = "alert",
                    module.id = module_id,
                    alert.severity = alert.severity.as_str(),
                    alert.entity = alert.entity.as_deref().unwrap_or_default(),
                    "{}: {}",
                    alert.title,
                    alert.message
                ),
            }
        }
        Ok(())
    }

    async fn notify_run_failure(&self, result: &ModuleRunResult) -> AnalyticsResult<()> {
        error!(
            event = "module_run_failure_notification",
            module.id = %result.module_id,
            run.status = result.status.as_str(),
            error = result.error.as_deref().unwrap_or_default(),
            "模块运行失败"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_logging_sink_accepts_everything() {
        let sink = LoggingAlertSink::new();
        let alerts = vec![
            AlertRecord::new("m", Severity::Critical, "t", "msg").with_entity("Campaign 1"),
            AlertRecord::new("m", Severity::Low, "t", "msg"),
        ];
        assert!(sink.deliver("m", &alerts).await.is_ok());
        assert!(sink.deliver("m", &[]).await.is_ok());

        let failed = ModuleRunResult::failed("m", "boom", Utc::now(), 0.1);
        assert!(sink.notify_run_failure(&failed).await.is_ok());
    }
}
