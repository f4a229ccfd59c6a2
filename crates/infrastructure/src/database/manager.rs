use std::sync::Arc;
use std::time::Duration;

use analytics_core::{
    config::DatabaseConfig,
    traits::{ModuleConfigRepository, ModuleRunRepository, StatsRepository},
    AnalyticsError, AnalyticsResult,
};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::{debug, info};

use super::sqlite::{SqliteModuleConfigRepository, SqliteModuleRunRepository, SqliteStatsRepository};

const SCHEMA: &[(&str, &str)] = &[
    (
        "module_configs",
        r#"
        CREATE TABLE IF NOT EXISTS module_configs (
            module_id TEXT PRIMARY KEY,
            enabled INTEGER NOT NULL,
            schedule TEXT NOT NULL DEFAULT '',
            alerts_enabled INTEGER NOT NULL,
            timeout_seconds INTEGER NOT NULL,
            cache_ttl_seconds INTEGER NOT NULL,
            params TEXT NOT NULL DEFAULT '{}',
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "module_runs",
        r#"
        CREATE TABLE IF NOT EXISTS module_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            module_id TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at DATETIME NOT NULL,
            completed_at DATETIME NOT NULL,
            duration_seconds REAL NOT NULL,
            used_cache INTEGER NOT NULL DEFAULT 0,
            output TEXT,
            error_message TEXT,
            alert_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    ),
    (
        "idx_module_runs_module",
        "CREATE INDEX IF NOT EXISTS idx_module_runs_module ON module_runs (module_id, started_at)",
    ),
    (
        "campaign_daily_stats",
        r#"
        CREATE TABLE IF NOT EXISTS campaign_daily_stats (
            campaign_id INTEGER NOT NULL,
            campaign_name TEXT NOT NULL,
            date DATE NOT NULL,
            clicks INTEGER NOT NULL DEFAULT 0,
            leads INTEGER NOT NULL DEFAULT 0,
            approved_leads INTEGER NOT NULL DEFAULT 0,
            cost REAL NOT NULL DEFAULT 0,
            revenue REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (campaign_id, date)
        )
        "#,
    ),
    (
        "offer_daily_stats",
        r#"
        CREATE TABLE IF NOT EXISTS offer_daily_stats (
            offer_id INTEGER NOT NULL,
            offer_name TEXT NOT NULL,
            date DATE NOT NULL,
            clicks INTEGER NOT NULL DEFAULT 0,
            leads INTEGER NOT NULL DEFAULT 0,
            approved_leads INTEGER NOT NULL DEFAULT 0,
            revenue REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (offer_id, date)
        )
        "#,
    ),
];

/// SQLite 数据库管理器
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(url: &str, max_connections: u32) -> AnalyticsResult<Self> {
        let config = DatabaseConfig {
            url: url.to_string(),
            max_connections,
            ..Default::default()
        };
        Self::from_config(&config).await
    }

    pub async fn from_config(config: &DatabaseConfig) -> AnalyticsResult<Self> {
        let in_memory = config.url.contains(":memory:");
        // 每个连接都有独立的内存数据库，必须固定为单连接且不回收
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
        };

        let pool = options
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(AnalyticsError::Database)?;

        info!("数据库连接已建立: {}", config.url);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 创建所需的表，可重复执行
    pub async fn migrate(&self) -> AnalyticsResult<()> {
        for (name, statement) in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AnalyticsError::DatabaseOperation(format!("创建 {name} 失败: {e}")))?;
            debug!("数据库对象 {} 已就绪", name);
        }
        Ok(())
    }

    pub async fn health_check(&self) -> AnalyticsResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(AnalyticsError::Database)?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn module_config_repository(&self) -> Arc<dyn ModuleConfigRepository> {
        Arc::new(SqliteModuleConfigRepository::new(self.pool.clone()))
    }

    pub fn module_run_repository(&self) -> Arc<dyn ModuleRunRepository> {
        Arc::new(SqliteModuleRunRepository::new(self.pool.clone()))
    }

    pub fn stats_repository(&self) -> Arc<dyn StatsRepository> {
        Arc::new(SqliteStatsRepository::new(self.pool.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_database_manager() {
        let db_manager = DatabaseManager::new("sqlite::memory:", 10).await.unwrap();
        assert!(db_manager.health_check().await.is_ok());

        db_manager.migrate().await.unwrap();
        // 迁移可重复执行
        db_manager.migrate().await.unwrap();

        let _config_repo = db_manager.module_config_repository();
        let _run_repo = db_manager.module_run_repository();
        let _stats_repo = db_manager.stats_repository();

        db_manager.close().await;
    }

    #[tokio::test]
    async fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("analytics.db").display());

        let db_manager = DatabaseManager::new(&url, 2).await.unwrap();
        db_manager.migrate().await.unwrap();
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'module_runs'",
        )
        .fetch_one(db_manager.pool())
        .await
        .unwrap();
        assert_eq!(count.0, 1);
        db_manager.close().await;
    }
}
