use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use analytics_core::{
    models::{CampaignDailyStat, ModuleConfig, ModuleRunRecord, ModuleRunStatus, OfferDailyStat},
    traits::{ModuleConfigRepository, ModuleRunRepository, StatsRepository},
    AnalyticsResult,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::debug;

/// 内存模块配置存储
///
/// 适用于嵌入式运行和测试，进程退出后配置丢失。
#[derive(Debug, Default)]
pub struct InMemoryModuleConfigRepository {
    configs: RwLock<BTreeMap<String, ModuleConfig>>,
}

impl InMemoryModuleConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModuleConfigRepository for InMemoryModuleConfigRepository {
    async fn get(&self, module_id: &str) -> AnalyticsResult<Option<ModuleConfig>> {
        Ok(self.configs.read().await.get(module_id).cloned())
    }

    async fn upsert(&self, module_id: &str, config: &ModuleConfig) -> AnalyticsResult<()> {
        self.configs
            .write()
            .await
            .insert(module_id.to_string(), config.clone());
        debug!("模块配置已写入内存: {}", module_id);
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        module_id: &str,
        config: &ModuleConfig,
    ) -> AnalyticsResult<bool> {
        let mut configs = self.configs.write().await;
        if configs.contains_key(module_id) {
            return Ok(false);
        }
        configs.insert(module_id.to_string(), config.clone());
        Ok(true)
    }

    async fn list(&self) -> AnalyticsResult<Vec<(String, ModuleConfig)>> {
        Ok(self
            .configs
            .read()
            .await
            .iter()
            .map(|(id, config)| (id.clone(), config.clone()))
            .collect())
    }

    async fn delete(&self, module_id: &str) -> AnalyticsResult<bool> {
        Ok(self.configs.write().await.remove(module_id).is_some())
    }
}

/// 内存运行记录存储
#[derive(Debug)]
pub struct InMemoryModuleRunRepository {
    records: RwLock<Vec<ModuleRunRecord>>,
    next_id: AtomicI64,
}

impl Default for InMemoryModuleRunRepository {
    fn default() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryModuleRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ModuleRunRepository for InMemoryModuleRunRepository {
    async fn create(&self, record: &ModuleRunRecord) -> AnalyticsResult<ModuleRunRecord> {
        let created = ModuleRunRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            ..record.clone()
        };
        self.records.write().await.push(created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> AnalyticsResult<Option<ModuleRunRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|record| record.id == id)
            .cloned())
    }

    async fn get_recent_runs(
        &self,
        module_id: &str,
        limit: i64,
    ) -> AnalyticsResult<Vec<ModuleRunRecord>> {
        let mut runs: Vec<ModuleRunRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|record| record.module_id == module_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        runs.truncate(limit.max(0) as usize);
        Ok(runs)
    }

    async fn count_by_status(
        &self,
        module_id: &str,
        status: ModuleRunStatus,
    ) -> AnalyticsResult<i64> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|record| record.module_id == module_id && record.status == status)
            .count() as i64)
    }
}

/// 内存统计数据
#[derive(Debug, Default)]
pub struct InMemoryStatsRepository {
    campaigns: RwLock<Vec<CampaignDailyStat>>,
    offers: RwLock<Vec<OfferDailyStat>>,
}

impl InMemoryStatsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stats(campaigns: Vec<CampaignDailyStat>, offers: Vec<OfferDailyStat>) -> Self {
        Self {
            campaigns: RwLock::new(campaigns),
            offers: RwLock::new(offers),
        }
    }

    pub async fn add_campaign_stat(&self, stat: CampaignDailyStat) {
        self.campaigns.write().await.push(stat);
    }

    pub async fn add_offer_stat(&self, stat: OfferDailyStat) {
        self.offers.write().await.push(stat);
    }
}

#[async_trait]
impl StatsRepository for InMemoryStatsRepository {
    async fn get_campaign_stats(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AnalyticsResult<Vec<CampaignDailyStat>> {
        let mut stats: Vec<CampaignDailyStat> = self
            .campaigns
            .read()
            .await
            .iter()
            .filter(|stat| stat.date >= from && stat.date <= to)
            .cloned()
            .collect();
        stats.sort_by_key(|stat| (stat.campaign_id, stat.date));
        Ok(stats)
    }

    async fn get_offer_stats(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AnalyticsResult<Vec<OfferDailyStat>> {
        let mut stats: Vec<OfferDailyStat> = self
            .offers
            .read()
            .await
            .iter()
            .filter(|stat| stat.date >= from && stat.date <= to)
            .cloned()
            .collect();
        stats.sort_by_key(|stat| (stat.offer_id, stat.date));
        Ok(stats)
    }
}
