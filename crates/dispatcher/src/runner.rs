use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{FixedOffset, Offset, Utc};
use tracing::{debug, instrument, warn};

use analytics_core::{
    models::{AnalysisOutput, ModuleConfig, ModuleRunRecord, ModuleRunResult},
    traits::{AlertSink, AnalysisContext, AnalysisModule, ModuleRunRepository, StatsRepository},
    AnalyticsError, AnalyticsResult, ConfigurationStore, ModuleRegistry, RunnerConfig,
    StructuredLogger,
};
use analytics_infrastructure::{MetricsCollector, ResultCache};

/// 模块执行器
///
/// 负责一次完整的模块运行：解析模块、加载配置、读缓存、在超时预算内执行
/// `analyze`、派生告警/建议/图表、写运行记录和缓存。模块自身的错误、超时和
/// panic 都转换为 [`ModuleRunResult`]；只有模块不存在、模块被禁用、
/// 配置存储不可用这类问题以 `Err` 返回给调用方。
pub struct ModuleRunner {
    registry: Arc<ModuleRegistry>,
    config_store: Arc<ConfigurationStore>,
    run_repository: Arc<dyn ModuleRunRepository>,
    stats: Arc<dyn StatsRepository>,
    alert_sink: Arc<dyn AlertSink>,
    cache: Arc<ResultCache>,
    metrics: MetricsCollector,
    settings: RunnerConfig,
    timezone: FixedOffset,
}

impl ModuleRunner {
    pub fn new(
        config_store: Arc<ConfigurationStore>,
        run_repository: Arc<dyn ModuleRunRepository>,
        stats: Arc<dyn StatsRepository>,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            registry: config_store.registry().clone(),
            config_store,
            run_repository,
            stats,
            alert_sink,
            cache: Arc::new(ResultCache::new()),
            metrics: MetricsCollector::disabled(),
            settings: RunnerConfig::default(),
            timezone: Utc.fix(),
        }
    }

    pub fn with_settings(mut self, settings: RunnerConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    /// 分析窗口按此时区的当前日期计算
    pub fn with_timezone(mut self, timezone: FixedOffset) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn config_store(&self) -> &Arc<ConfigurationStore> {
        &self.config_store
    }

    /// 通用入口：未给出配置时按调度路径处理（重新加载配置）
    pub async fn run_module(
        &self,
        module_id: &str,
        config: Option<ModuleConfig>,
        use_cache: bool,
    ) -> AnalyticsResult<ModuleRunResult> {
        match config {
            Some(config) => self.run_with_config(module_id, config, use_cache).await,
            None if use_cache => {
                let config = self.config_store.get_config(module_id).await?;
                self.run_with_config(module_id, config, true).await
            }
            None => self.run_scheduled(module_id).await,
        }
    }

    /// 调度路径：每次都重新读取配置，且不使用缓存
    pub async fn run_scheduled(&self, module_id: &str) -> AnalyticsResult<ModuleRunResult> {
        let module = self.resolve(module_id)?;
        let config = self.config_store.get_config(module_id).await?;
        self.execute(module_id, module, config, false, true).await
    }

    /// 使用调用方给出的配置运行
    pub async fn run_with_config(
        &self,
        module_id: &str,
        config: ModuleConfig,
        use_cache: bool,
    ) -> AnalyticsResult<ModuleRunResult> {
        let module = self.resolve(module_id)?;
        self.execute(module_id, module, config, use_cache, false).await
    }

    /// 最近的运行记录，`limit` 缺省时使用配置的历史条数
    pub async fn run_history(
        &self,
        module_id: &str,
        limit: Option<i64>,
    ) -> AnalyticsResult<Vec<ModuleRunRecord>> {
        if !self.registry.contains(module_id) {
            return Err(AnalyticsError::module_not_found(module_id));
        }
        let limit = limit.unwrap_or(self.settings.run_history_limit);
        self.run_repository.get_recent_runs(module_id, limit).await
    }

    fn resolve(&self, module_id: &str) -> AnalyticsResult<Arc<dyn AnalysisModule>> {
        self.registry
            .get(module_id)
            .ok_or_else(|| AnalyticsError::module_not_found(module_id))
    }

    #[instrument(skip(self, module, config), fields(module.id = %module_id))]
    async fn execute(
        &self,
        module_id: &str,
        module: Arc<dyn AnalysisModule>,
        config: ModuleConfig,
        use_cache: bool,
        scheduled: bool,
    ) -> AnalyticsResult<ModuleRunResult> {
        if !config.enabled {
            return Err(AnalyticsError::ModuleDisabled {
                id: module_id.to_string(),
            });
        }

        StructuredLogger::log_run_started(module_id, scheduled, use_cache);
        let started_at = Utc::now();

        if use_cache {
            if let Some(cached) = self
                .cache
                .get_fresh(module_id, config.cache_ttl_seconds, started_at)
                .await
            {
                StructuredLogger::log_cache_hit(module_id, cached.cached_at, config.cache_ttl_seconds);
                self.metrics.record_cache_hit(module_id);

                let mut result = ModuleRunResult::success(module_id, cached.data, started_at, 0.0);
                result.used_cache = true;
                self.derive(module_id, module.as_ref(), &mut result);
                return Ok(result);
            }
        }

        let timer = Instant::now();
        let timeout_seconds = config.timeout_seconds;
        let alerts_enabled = config.alerts_enabled;
        let today = started_at.with_timezone(&self.timezone).date_naive();
        let ctx = AnalysisContext::new(module_id, config, self.stats.clone(), today);

        let result = match self.analyze_with_timeout(module.clone(), ctx, timeout_seconds).await {
            AnalyzeOutcome::Completed(data) => {
                let mut result = ModuleRunResult::success(
                    module_id,
                    data,
                    started_at,
                    timer.elapsed().as_secs_f64(),
                );
                self.derive(module_id, module.as_ref(), &mut result);
                result
            }
            AnalyzeOutcome::Failed(message) => ModuleRunResult::failed(
                module_id,
                message,
                started_at,
                timer.elapsed().as_secs_f64(),
            ),
            AnalyzeOutcome::TimedOut => ModuleRunResult::timeout(
                module_id,
                timeout_seconds,
                started_at,
                timer.elapsed().as_secs_f64(),
            ),
        };

        self.persist(&result).await;
        if let Some(data) = &result.data {
            self.cache.put(module_id, data.clone(), Utc::now()).await;
        }
        self.notify(&result, alerts_enabled).await;

        StructuredLogger::log_run_finished(&result);
        self.metrics.record_run(&result);
        Ok(result)
    }

    /// 在独立任务中执行 `analyze`，超时后中止任务
    async fn analyze_with_timeout(
        &self,
        module: Arc<dyn AnalysisModule>,
        ctx: AnalysisContext,
        timeout_seconds: u64,
    ) -> AnalyzeOutcome {
        let mut handle = tokio::spawn(async move { module.analyze(&ctx).await });

        match tokio::time::timeout(Duration::from_secs(timeout_seconds), &mut handle).await {
            Ok(Ok(Ok(data))) => AnalyzeOutcome::Completed(data),
            Ok(Ok(Err(e))) => AnalyzeOutcome::Failed(e.to_string()),
            Ok(Err(join_error)) if join_error.is_panic() => {
                let message = panic_message(join_error.into_panic());
                AnalyzeOutcome::Failed(format!("分析过程中发生panic: {message}"))
            }
            Ok(Err(join_error)) => AnalyzeOutcome::Failed(format!("分析任务被取消: {join_error}")),
            Err(_) => {
                handle.abort();
                AnalyzeOutcome::TimedOut
            }
        }
    }

    /// 派生告警、建议和图表；单个步骤失败只记录日志，结果为空
    fn derive(&self, module_id: &str, module: &dyn AnalysisModule, result: &mut ModuleRunResult) {
        let Some(data) = result.data.as_ref() else {
            return;
        };

        result.alerts = derive_step(module_id, "generate_alerts", || module.generate_alerts(data));
        result.recommendations = derive_step(module_id, "generate_recommendations", || {
            module.generate_recommendations(data)
        });
        result.charts =
            derive_step(module_id, "prepare_chart_data", || module.prepare_chart_data(data));
    }

    async fn persist(&self, result: &ModuleRunResult) {
        let record = ModuleRunRecord::from_result(result, self.settings.max_output_chars);
        match self.run_repository.create(&record).await {
            Ok(created) => debug!("运行记录已保存: {}", created.entity_description()),
            Err(e) => StructuredLogger::log_system_error("runner", "persist_run_record", &e),
        }
    }

    async fn notify(&self, result: &ModuleRunResult, alerts_enabled: bool) {
        if result.is_success() {
            if alerts_enabled && !result.alerts.is_empty() {
                if let Err(e) = self.alert_sink.deliver(&result.module_id, &result.alerts).await {
                    warn!("模块 {} 的告警投递失败: {}", result.module_id, e);
                }
            }
        } else if let Err(e) = self.alert_sink.notify_run_failure(result).await {
            warn!("模块 {} 的运行失败通知发送失败: {}", result.module_id, e);
        }
    }
}

enum AnalyzeOutcome {
    Completed(AnalysisOutput),
    Failed(String),
    TimedOut,
}

fn derive_step<T, F>(module_id: &str, step: &str, f: F) -> Vec<T>
where
    F: FnOnce() -> AnalyticsResult<Vec<T>>,
{
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(items)) => items,
        Ok(Err(e)) => {
            StructuredLogger::log_derivation_failed(module_id, step, &e);
            Vec::new()
        }
        Err(panic) => {
            let message = panic_message(panic);
            StructuredLogger::log_derivation_failed(module_id, step, &message);
            Vec::new()
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
