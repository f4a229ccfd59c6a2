use analytics_core::{
    models::{ModuleConfig, ModuleParams},
    traits::ModuleConfigRepository,
    AnalyticsError, AnalyticsResult,
};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

pub struct SqliteModuleConfigRepository {
    pool: SqlitePool,
}

impl SqliteModuleConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> AnalyticsResult<(String, ModuleConfig)> {
        let params_json: String = row.try_get("params")?;
        let params: ModuleParams = serde_json::from_str(&params_json)?;
        let timeout_seconds: i64 = row.try_get("timeout_seconds")?;
        let cache_ttl_seconds: i64 = row.try_get("cache_ttl_seconds")?;

        Ok((
            row.try_get("module_id")?,
            ModuleConfig {
                enabled: row.try_get("enabled")?,
                schedule: row.try_get("schedule")?,
                alerts_enabled: row.try_get("alerts_enabled")?,
                timeout_seconds: timeout_seconds.max(0) as u64,
                cache_ttl_seconds: cache_ttl_seconds.max(0) as u64,
                params,
            },
        ))
    }
}

#[async_trait]
impl ModuleConfigRepository for SqliteModuleConfigRepository {
    async fn get(&self, module_id: &str) -> AnalyticsResult<Option<ModuleConfig>> {
        let row = sqlx::query(
            "SELECT module_id, enabled, schedule, alerts_enabled, timeout_seconds,
                    cache_ttl_seconds, params
             FROM module_configs WHERE module_id = ?",
        )
        .bind(module_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AnalyticsError::Database)?;

        match row {
            Some(row) => Ok(Some(Self::row_to_config(&row)?.1)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, config), fields(module.id = %module_id, enabled = config.enabled))]
    async fn upsert(&self, module_id: &str, config: &ModuleConfig) -> AnalyticsResult<()> {
        let params = serde_json::to_string(&config.params)?;

        sqlx::query(
            r#"
            INSERT INTO module_configs (module_id, enabled, schedule, alerts_enabled,
                                        timeout_seconds, cache_ttl_seconds, params, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(module_id) DO UPDATE SET
                enabled = excluded.enabled,
                schedule = excluded.schedule,
                alerts_enabled = excluded.alerts_enabled,
                timeout_seconds = excluded.timeout_seconds,
                cache_ttl_seconds = excluded.cache_ttl_seconds,
                params = excluded.params,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(module_id)
        .bind(config.enabled)
        .bind(&config.schedule)
        .bind(config.alerts_enabled)
        .bind(config.timeout_seconds as i64)
        .bind(config.cache_ttl_seconds as i64)
        .bind(params)
        .execute(&self.pool)
        .await
        .map_err(AnalyticsError::Database)?;

        debug!("模块配置已写入: {}", module_id);
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        module_id: &str,
        config: &ModuleConfig,
    ) -> AnalyticsResult<bool> {
        let params = serde_json::to_string(&config.params)?;

        let result = sqlx::query(
            r#"
            INSERT INTO module_configs (module_id, enabled, schedule, alerts_enabled,
                                        timeout_seconds, cache_ttl_seconds, params, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(module_id) DO NOTHING
            "#,
        )
        .bind(module_id)
        .bind(config.enabled)
        .bind(&config.schedule)
        .bind(config.alerts_enabled)
        .bind(config.timeout_seconds as i64)
        .bind(config.cache_ttl_seconds as i64)
        .bind(params)
        .execute(&self.pool)
        .await
        .map_err(AnalyticsError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> AnalyticsResult<Vec<(String, ModuleConfig)>> {
        let rows = sqlx::query(
            "SELECT module_id, enabled, schedule, alerts_enabled, timeout_seconds,
                    cache_ttl_seconds, params
             FROM module_configs ORDER BY module_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AnalyticsError::Database)?;

        rows.iter().map(Self::row_to_config).collect()
    }

    async fn delete(&self, module_id: &str) -> AnalyticsResult<bool> {
        let result = sqlx::query("DELETE FROM module_configs WHERE module_id = ?")
            .bind(module_id)
            .execute(&self.pool)
            .await
            .map_err(AnalyticsError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use serde_json::json;

    async fn repository() -> (DatabaseManager, SqliteModuleConfigRepository) {
        let db = DatabaseManager::new("sqlite::memory:", 1).await.unwrap();
        db.migrate().await.unwrap();
        let repo = SqliteModuleConfigRepository::new(db.pool().clone());
        (db, repo)
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let (_db, repo) = repository().await;
        assert!(repo.get("roi_monitor").await.unwrap().is_none());

        let config = ModuleConfig::default()
            .with_schedule("0 */4 * * *")
            .with_param("min_spend", 50.0)
            .with_param("days", 7);
        repo.upsert("roi_monitor", &config).await.unwrap();

        let loaded = repo.get("roi_monitor").await.unwrap().unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let (_db, repo) = repository().await;
        repo.upsert("m", &ModuleConfig::default()).await.unwrap();
        repo.upsert("m", &ModuleConfig::default().with_enabled(false).with_timeout(30))
            .await
            .unwrap();

        let loaded = repo.get("m").await.unwrap().unwrap();
        assert!(!loaded.enabled);
        assert_eq!(loaded.timeout_seconds, 30);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_if_absent_keeps_existing_row() {
        let (_db, repo) = repository().await;
        assert!(repo.insert_if_absent("m", &ModuleConfig::default()).await.unwrap());

        let saved = ModuleConfig::default().with_enabled(false).with_schedule("0 9 * * *");
        repo.upsert("m", &saved).await.unwrap();
        assert!(!repo.insert_if_absent("m", &ModuleConfig::default()).await.unwrap());

        assert_eq!(repo.get("m").await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let (_db, repo) = repository().await;
        repo.upsert("b", &ModuleConfig::default()).await.unwrap();
        repo.upsert("a", &ModuleConfig::default().with_param("flag", json!(true)))
            .await
            .unwrap();

        let ids: Vec<String> = repo.list().await.unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

        assert!(repo.delete("a").await.unwrap());
        assert!(!repo.delete("a").await.unwrap());
    }
}
