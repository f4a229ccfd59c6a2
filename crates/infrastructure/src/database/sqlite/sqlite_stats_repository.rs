use analytics_core::{
    models::{CampaignDailyStat, OfferDailyStat},
    traits::StatsRepository,
    AnalyticsError, AnalyticsResult,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// 按天统计数据的只读访问，数据由采集器写入
pub struct SqliteStatsRepository {
    pool: SqlitePool,
}

impl SqliteStatsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 写入或覆盖一天的活动统计，供采集器和测试使用
    pub async fn upsert_campaign_stat(&self, stat: &CampaignDailyStat) -> AnalyticsResult<()> {
        sqlx::query(
            r#"
            INSERT INTO campaign_daily_stats (campaign_id, campaign_name, date, clicks, leads,
                                              approved_leads, cost, revenue)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(campaign_id, date) DO UPDATE SET
                campaign_name = excluded.campaign_name,
                clicks = excluded.clicks,
                leads = excluded.leads,
                approved_leads = excluded.approved_leads,
                cost = excluded.cost,
                revenue = excluded.revenue
            "#,
        )
        .bind(stat.campaign_id)
        .bind(&stat.campaign_name)
        .bind(stat.date)
        .bind(stat.clicks)
        .bind(stat.leads)
        .bind(stat.approved_leads)
        .bind(stat.cost)
        .bind(stat.revenue)
        .execute(&self.pool)
        .await
        .map_err(AnalyticsError::Database)?;
        Ok(())
    }

    pub async fn upsert_offer_stat(&self, stat: &OfferDailyStat) -> AnalyticsResult<()> {
        sqlx::query(
            r#"
            INSERT INTO offer_daily_stats (offer_id, offer_name, date, clicks, leads,
                                           approved_leads, revenue)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(offer_id, date) DO UPDATE SET
                offer_name = excluded.offer_name,
                clicks = excluded.clicks,
                leads = excluded.leads,
                approved_leads = excluded.approved_leads,
                revenue = excluded.revenue
            "#,
        )
        .bind(stat.offer_id)
        .bind(&stat.offer_name)
        .bind(stat.date)
        .bind(stat.clicks)
        .bind(stat.leads)
        .bind(stat.approved_leads)
        .bind(stat.revenue)
        .execute(&self.pool)
        .await
        .map_err(AnalyticsError::Database)?;
        Ok(())
    }
}

#[async_trait]
impl StatsRepository for SqliteStatsRepository {
    async fn get_campaign_stats(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AnalyticsResult<Vec<CampaignDailyStat>> {
        let rows = sqlx::query(
            "SELECT campaign_id, campaign_name, date, clicks, leads, approved_leads, cost, revenue
             FROM campaign_daily_stats
             WHERE date >= ? AND date <= ?
             ORDER BY campaign_id, date",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(AnalyticsError::Database)?;

        debug!("读取活动统计 {} 行 ({} ~ {})", rows.len(), from, to);
        rows.iter()
            .map(|row| {
                Ok(CampaignDailyStat {
                    campaign_id: row.try_get("campaign_id")?,
                    campaign_name: row.try_get("campaign_name")?,
                    date: row.try_get("date")?,
                    clicks: row.try_get("clicks")?,
                    leads: row.try_get("leads")?,
                    approved_leads: row.try_get("approved_leads")?,
                    cost: row.try_get("cost")?,
                    revenue: row.try_get("revenue")?,
                })
            })
            .collect()
    }

    async fn get_offer_stats(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AnalyticsResult<Vec<OfferDailyStat>> {
        let rows = sqlx::query(
            "SELECT offer_id, offer_name, date, clicks, leads, approved_leads, revenue
             FROM offer_daily_stats
             WHERE date >= ? AND date <= ?
             ORDER BY offer_id, date",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(AnalyticsError::Database)?;

        debug!("读取offer统计 {} 行 ({} ~ {})", rows.len(), from, to);
        rows.iter()
            .map(|row| {
                Ok(OfferDailyStat {
                    offer_id: row.try_get("offer_id")?,
                    offer_name: row.try_get("offer_name")?,
                    date: row.try_get("date")?,
                    clicks: row.try_get("clicks")?,
                    leads: row.try_get("leads")?,
                    approved_leads: row.try_get("approved_leads")?,
                    revenue: row.try_get("revenue")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;

    fn campaign(id: i64, date: NaiveDate, leads: i64) -> CampaignDailyStat {
        CampaignDailyStat {
            campaign_id: id,
            campaign_name: format!("Campaign {id}"),
            date,
            clicks: 100,
            leads,
            approved_leads: 0,
            cost: 10.0,
            revenue: 5.0,
        }
    }

    #[tokio::test]
    async fn test_campaign_stats_window() {
        let db = DatabaseManager::new("sqlite::memory:", 1).await.unwrap();
        db.migrate().await.unwrap();
        let repo = SqliteStatsRepository::new(db.pool().clone());

        let d1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let d3 = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();
        for stat in [campaign(1, d1, 3), campaign(1, d2, 4), campaign(2, d3, 5)] {
            repo.upsert_campaign_stat(&stat).await.unwrap();
        }
        // 覆盖同一天
        repo.upsert_campaign_stat(&campaign(1, d2, 9)).await.unwrap();

        let stats = repo.get_campaign_stats(d2, d3).await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].leads, 9);
        assert_eq!(stats[1].campaign_id, 2);
    }

    #[tokio::test]
    async fn test_offer_stats() {
        let db = DatabaseManager::new("sqlite::memory:", 1).await.unwrap();
        db.migrate().await.unwrap();
        let repo = SqliteStatsRepository::new(db.pool().clone());

        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        repo.upsert_offer_stat(&OfferDailyStat {
            offer_id: 7,
            offer_name: "Offer 7".to_string(),
            date,
            clicks: 1000,
            leads: 20,
            approved_leads: 10,
            revenue: 200.0,
        })
        .await
        .unwrap();

        let stats = repo.get_offer_stats(date, date).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].offer_name, "Offer 7");
        assert!(repo
            .get_offer_stats(date.succ_opt().unwrap(), date.succ_opt().unwrap())
            .await
            .unwrap()
            .is_empty());
    }
}
