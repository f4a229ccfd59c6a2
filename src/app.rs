use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use analytics_core::{models::ModuleRunResult, AppConfig, ModuleRegistry};
use analytics_dispatcher::{AnalyticsContext, ContextDependencies};
use analytics_infrastructure::{DatabaseManager, LoggingAlertSink, MetricsCollector};
use analytics_modules::register_all_modules;

/// 主应用程序
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    context: AnalyticsContext,
}

impl Application {
    /// 创建新的应用实例：连接数据库、注册模块、组装上下文
    pub async fn new(config: AppConfig) -> Result<Self> {
        let database = DatabaseManager::from_config(&config.database)
            .await
            .context("连接数据库失败")?;
        database.migrate().await.context("数据库迁移失败")?;

        let mut registry = ModuleRegistry::new();
        register_all_modules(&mut registry).context("注册分析模块失败")?;

        let metrics = MetricsCollector::new(config.observability.metrics_enabled);
        let context = AnalyticsContext::new(
            registry,
            ContextDependencies {
                config_repository: database.module_config_repository(),
                run_repository: database.module_run_repository(),
                stats_repository: database.stats_repository(),
                alert_sink: Arc::new(LoggingAlertSink::new()),
            },
            config.scheduler.clone(),
            config.runner.clone(),
            metrics,
        )
        .context("创建分析上下文失败")?;

        Ok(Self {
            config,
            database,
            context,
        })
    }

    /// 运行调度器直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        if self.config.scheduler.enabled {
            let jobs = self.context.scheduler.setup_module_jobs().await?;
            self.context.scheduler.start().await?;
            info!("调度器已启动，共 {} 个定时任务", jobs);
        } else {
            warn!("调度器已在配置中禁用，只等待关闭信号");
        }

        if let Err(e) = shutdown_rx.recv().await {
            error!("关闭信号通道异常: {e}");
        }

        self.shutdown().await;
        Ok(())
    }

    /// 手动运行一次模块
    pub async fn run_once(&self, module_id: &str, use_cache: bool) -> Result<ModuleRunResult> {
        let result = self
            .context
            .run_now(module_id, use_cache)
            .await
            .with_context(|| format!("运行模块 {module_id} 失败"))?;
        Ok(result)
    }

    /// 所有模块的元数据、合并配置和下次触发时间
    pub async fn describe_modules(&self) -> Result<serde_json::Value> {
        self.context.scheduler.setup_module_jobs().await?;

        let mut modules = Vec::new();
        for metadata in self.context.registry.list_metadata() {
            let config = self.context.config_store.get_config(&metadata.id).await?;
            let job = self.context.scheduler.get_job(&metadata.id).await;
            modules.push(json!({
                "metadata": metadata,
                "config": config,
                "next_run_time": job.and_then(|job| job.next_run_time),
            }));
        }
        Ok(json!(modules))
    }

    pub async fn shutdown(&self) {
        self.context.shutdown().await;
        self.database.close().await;
        info!("应用已关闭");
    }
}
