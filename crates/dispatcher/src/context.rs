use std::sync::Arc;

use tracing::info;

use analytics_core::{
    models::{ModuleConfig, ModuleConfigPatch, ModuleRunResult},
    traits::{AlertSink, ModuleConfigRepository, ModuleRunRepository, StatsRepository},
    AnalyticsResult, ConfigurationStore, ModuleRegistry, RunnerConfig, SchedulerConfig,
};
use analytics_infrastructure::MetricsCollector;

use crate::cron_utils::CronScheduler;
use crate::runner::ModuleRunner;
use crate::scheduler::ModuleScheduler;

/// 应用上下文：启动时创建一次，显式传递给需要的组件
pub struct AnalyticsContext {
    pub registry: Arc<ModuleRegistry>,
    pub config_store: Arc<ConfigurationStore>,
    pub runner: Arc<ModuleRunner>,
    pub scheduler: Arc<ModuleScheduler>,
}

/// 构建上下文所需的存储和通知渠道
pub struct ContextDependencies {
    pub config_repository: Arc<dyn ModuleConfigRepository>,
    pub run_repository: Arc<dyn ModuleRunRepository>,
    pub stats_repository: Arc<dyn StatsRepository>,
    pub alert_sink: Arc<dyn AlertSink>,
}

impl AnalyticsContext {
    pub fn new(
        registry: ModuleRegistry,
        deps: ContextDependencies,
        scheduler_settings: SchedulerConfig,
        runner_settings: RunnerConfig,
        metrics: MetricsCollector,
    ) -> AnalyticsResult<Self> {
        let registry = Arc::new(registry);
        let timezone = scheduler_settings.timezone_offset()?;
        let config_store = Arc::new(ConfigurationStore::new(
            registry.clone(),
            deps.config_repository,
        ));

        let runner = Arc::new(
            ModuleRunner::new(
                config_store.clone(),
                deps.run_repository,
                deps.stats_repository,
                deps.alert_sink,
            )
            .with_settings(runner_settings)
            .with_timezone(timezone)
            .with_metrics(metrics.clone()),
        );
        let scheduler = Arc::new(ModuleScheduler::new(
            runner.clone(),
            scheduler_settings,
            metrics,
        )?);

        info!("分析上下文已初始化，共 {} 个模块", registry.count());
        Ok(Self {
            registry,
            config_store,
            runner,
            scheduler,
        })
    }

    /// 更新模块配置并同步调度任务
    ///
    /// 新的调度表达式先校验，无效时配置保持不变。
    pub async fn update_module_config(
        &self,
        module_id: &str,
        patch: ModuleConfigPatch,
    ) -> AnalyticsResult<ModuleConfig> {
        if let Some(schedule) = patch.schedule.as_deref() {
            if !schedule.trim().is_empty() {
                CronScheduler::validate_cron_expression(schedule)?;
            }
        }

        let config = self.config_store.update_config(module_id, patch).await?;
        self.runner.cache().invalidate(module_id).await;
        self.scheduler
            .update_module_job(module_id, config.enabled, &config.schedule)
            .await?;
        Ok(config)
    }

    /// 手动运行一次
    pub async fn run_now(&self, module_id: &str, use_cache: bool) -> AnalyticsResult<ModuleRunResult> {
        self.runner.run_module(module_id, None, use_cache).await
    }

    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
    }
}
