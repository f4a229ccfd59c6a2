use analytics_core::{
    models::{ModuleRunRecord, ModuleRunStatus},
    traits::ModuleRunRepository,
    AnalyticsError, AnalyticsResult,
};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

const SELECT_COLUMNS: &str = "SELECT id, module_id, status, started_at, completed_at, duration_seconds,
        used_cache, output, error_message, alert_count FROM module_runs";

pub struct SqliteModuleRunRepository {
    pool: SqlitePool,
}

impl SqliteModuleRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> AnalyticsResult<ModuleRunRecord> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<ModuleRunStatus>()
            .map_err(AnalyticsError::DatabaseOperation)?;

        Ok(ModuleRunRecord {
            id: row.try_get("id")?,
            module_id: row.try_get("module_id")?,
            status,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            duration_seconds: row.try_get("duration_seconds")?,
            used_cache: row.try_get("used_cache")?,
            output: row.try_get("output")?,
            error_message: row.try_get("error_message")?,
            alert_count: row.try_get("alert_count")?,
        })
    }
}

#[async_trait]
impl ModuleRunRepository for SqliteModuleRunRepository {
    #[instrument(skip(self, record), fields(
        module.id = %record.module_id,
        status = %record.status,
    ))]
    async fn create(&self, record: &ModuleRunRecord) -> AnalyticsResult<ModuleRunRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO module_runs (module_id, status, started_at, completed_at, duration_seconds,
                                     used_cache, output, error_message, alert_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.module_id)
        .bind(record.status.as_str())
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(record.duration_seconds)
        .bind(record.used_cache)
        .bind(&record.output)
        .bind(&record.error_message)
        .bind(record.alert_count)
        .execute(&self.pool)
        .await
        .map_err(AnalyticsError::Database)?;

        let created = ModuleRunRecord {
            id: result.last_insert_rowid(),
            ..record.clone()
        };
        debug!("创建{}成功", created.entity_description());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> AnalyticsResult<Option<ModuleRunRecord>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AnalyticsError::Database)?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn get_recent_runs(
        &self,
        module_id: &str,
        limit: i64,
    ) -> AnalyticsResult<Vec<ModuleRunRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE module_id = ? ORDER BY started_at DESC, id DESC LIMIT ?"
        ))
        .bind(module_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AnalyticsError::Database)?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn count_by_status(
        &self,
        module_id: &str,
        status: ModuleRunStatus,
    ) -> AnalyticsResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM module_runs WHERE module_id = ? AND status = ?",
        )
        .bind(module_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(AnalyticsError::Database)?;

        Ok(row.try_get("count")?)
    }
}
