use async_trait::async_trait;

use crate::{
    models::{AlertRecord, ModuleRunResult},
    AnalyticsResult,
};

/// 通知渠道
///
/// 业务告警只在模块配置 `alerts_enabled` 时投递；
/// 运行失败（失败/超时）通过独立的 `notify_run_failure` 上报。
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, module_id: &str, alerts: &[AlertRecord]) -> AnalyticsResult<()>;

    async fn notify_run_failure(&self, result: &ModuleRunResult) -> AnalyticsResult<()>;
}
