use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    models::{CampaignDailyStat, ModuleConfig, ModuleRunRecord, ModuleRunStatus, OfferDailyStat},
    AnalyticsResult,
};

/// 模块配置持久化
///
/// `upsert` 必须是单条原子写入，读取方不会看到写了一半的配置。
#[async_trait]
pub trait ModuleConfigRepository: Send + Sync {
    async fn get(&self, module_id: &str) -> AnalyticsResult<Option<ModuleConfig>>;
    async fn upsert(&self, module_id: &str, config: &ModuleConfig) -> AnalyticsResult<()>;
    /// 仅在没有记录时写入，返回是否写入；已有记录保持不变
    async fn insert_if_absent(
        &self,
        module_id: &str,
        config: &ModuleConfig,
    ) -> AnalyticsResult<bool>;
    async fn list(&self) -> AnalyticsResult<Vec<(String, ModuleConfig)>>;
    async fn delete(&self, module_id: &str) -> AnalyticsResult<bool>;
}

/// 模块运行记录，只追加
#[async_trait]
pub trait ModuleRunRepository: Send + Sync {
    async fn create(&self, record: &ModuleRunRecord) -> AnalyticsResult<ModuleRunRecord>;
    async fn get_by_id(&self, id: i64) -> AnalyticsResult<Option<ModuleRunRecord>>;
    /// 按开始时间倒序返回最近的记录
    async fn get_recent_runs(
        &self,
        module_id: &str,
        limit: i64,
    ) -> AnalyticsResult<Vec<ModuleRunRecord>>;
    async fn get_last_run(&self, module_id: &str) -> AnalyticsResult<Option<ModuleRunRecord>> {
        Ok(self.get_recent_runs(module_id, 1).await?.into_iter().next())
    }
    async fn count_by_status(
        &self,
        module_id: &str,
        status: ModuleRunStatus,
    ) -> AnalyticsResult<i64>;
}

/// 模块在 `analyze` 中使用的只读数据存储
///
/// 日期区间均为闭区间。
#[async_trait]
pub trait StatsRepository: Send + Sync {
    async fn get_campaign_stats(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AnalyticsResult<Vec<CampaignDailyStat>>;

    async fn get_offer_stats(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AnalyticsResult<Vec<OfferDailyStat>>;
}
