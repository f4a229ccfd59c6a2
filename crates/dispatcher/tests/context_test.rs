#[cfg(test)]
mod context_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use analytics_core::{
        models::{ModuleConfig, ModuleConfigPatch, ModuleRunStatus, Severity},
        traits::AnalysisModule,
        AnalyticsError, ModuleRegistry, RunnerConfig, SchedulerConfig,
    };
    use analytics_dispatcher::{job_id, AnalyticsContext, ContextDependencies, MAX_INSTANCES};
    use analytics_infrastructure::{InMemoryStatsRepository, MetricsCollector};
    use analytics_modules::{register_all_modules, roi_monitor, squeezed_offer, zero_approval_alert};
    use analytics_testing_utils::{
        days_before, CampaignStatBuilder, SlowModule, TestEnv, TestStores,
    };

    fn context_with(stores: &TestStores) -> AnalyticsContext {
        let mut registry = ModuleRegistry::new();
        register_all_modules(&mut registry).unwrap();
        context_for(stores, registry)
    }

    fn context_for(stores: &TestStores, registry: ModuleRegistry) -> AnalyticsContext {
        TestEnv::init_logging();
        AnalyticsContext::new(
            registry,
            ContextDependencies {
                config_repository: stores.configs.clone(),
                run_repository: stores.runs.clone(),
                stats_repository: stores.stats.clone(),
                alert_sink: stores.alerts.clone(),
            },
            SchedulerConfig::default(),
            RunnerConfig::default(),
            MetricsCollector::disabled(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unscheduled_module_runs_manually() {
        let stores = TestStores::new();
        let ctx = context_with(&stores);

        ctx.scheduler.setup_module_jobs().await.unwrap();
        assert!(ctx.scheduler.get_job(zero_approval_alert::MODULE_ID).await.is_none());

        let result = ctx
            .runner
            .run_module(zero_approval_alert::MODULE_ID, None, false)
            .await
            .unwrap();
        assert_eq!(result.status, ModuleRunStatus::Success);
        assert_eq!(result.data.unwrap()["summary"]["total_found"], 0);
        assert!(result.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_module_gets_single_instance_job() {
        let stores = TestStores::new();
        let ctx = context_with(&stores);

        assert_eq!(ctx.scheduler.setup_module_jobs().await.unwrap(), 2);

        let jobs = ctx.scheduler.get_jobs().await;
        let squeezed: Vec<_> = jobs
            .iter()
            .filter(|job| job.id == "module_squeezed_offer")
            .collect();
        assert_eq!(squeezed.len(), 1);
        assert_eq!(squeezed[0].max_instances, MAX_INSTANCES);
        assert_eq!(MAX_INSTANCES, 1);
        assert!(jobs.iter().any(|job| job.id == job_id(roi_monitor::MODULE_ID)));
    }

    #[tokio::test]
    async fn test_disabling_job_removes_it() {
        let stores = TestStores::new();
        let ctx = context_with(&stores);
        ctx.scheduler.setup_module_jobs().await.unwrap();

        ctx.scheduler
            .update_module_job(squeezed_offer::MODULE_ID, false, "0 9 * * *")
            .await
            .unwrap();

        let jobs = ctx.scheduler.get_jobs().await;
        assert!(jobs.iter().all(|job| job.id != "module_squeezed_offer"));
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_config_syncs_scheduler() {
        let stores = TestStores::new();
        let ctx = context_with(&stores);
        ctx.scheduler.setup_module_jobs().await.unwrap();

        let config = ctx
            .update_module_config(
                zero_approval_alert::MODULE_ID,
                ModuleConfigPatch::schedule("*/15 * * * *"),
            )
            .await
            .unwrap();
        assert_eq!(config.schedule, "*/15 * * * *");
        assert!(ctx.scheduler.get_job(zero_approval_alert::MODULE_ID).await.is_some());
        assert!(ctx.scheduler.is_running().await);

        ctx.update_module_config(zero_approval_alert::MODULE_ID, ModuleConfigPatch::enabled(false))
            .await
            .unwrap();
        assert!(ctx.scheduler.get_job(zero_approval_alert::MODULE_ID).await.is_none());

        let refused = ctx.run_now(zero_approval_alert::MODULE_ID, false).await;
        assert!(matches!(refused, Err(AnalyticsError::ModuleDisabled { .. })));

        ctx.shutdown().await;
        assert!(!ctx.scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_invalid_updates_leave_config_unchanged() {
        let stores = TestStores::new();
        let ctx = context_with(&stores);

        let bad_cron = ctx
            .update_module_config(
                squeezed_offer::MODULE_ID,
                ModuleConfigPatch::schedule("every morning"),
            )
            .await;
        assert!(matches!(bad_cron, Err(AnalyticsError::InvalidCron { .. })));

        let bad_param = ctx
            .update_module_config(
                squeezed_offer::MODULE_ID,
                ModuleConfigPatch::default().with_param("days", 365),
            )
            .await;
        assert!(matches!(bad_param, Err(AnalyticsError::InvalidParameter { .. })));

        let config = ctx.config_store.get_config(squeezed_offer::MODULE_ID).await.unwrap();
        assert_eq!(config.schedule, "0 9 * * *");
        assert_eq!(config.param_i64("days"), Some(7));
    }

    #[tokio::test]
    async fn test_config_update_invalidates_cache() {
        let stores = TestStores::new();
        let ctx = context_with(&stores);

        let first = ctx.run_now(zero_approval_alert::MODULE_ID, true).await.unwrap();
        let cached = ctx.run_now(zero_approval_alert::MODULE_ID, true).await.unwrap();
        assert!(!first.used_cache);
        assert!(cached.used_cache);

        ctx.update_module_config(
            zero_approval_alert::MODULE_ID,
            ModuleConfigPatch::default().with_param("min_leads", 5),
        )
        .await
        .unwrap();

        let fresh = ctx.run_now(zero_approval_alert::MODULE_ID, true).await.unwrap();
        assert!(!fresh.used_cache);
        assert_eq!(fresh.data.unwrap()["summary"]["min_leads"], 5);
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_param_update_during_run_keeps_single_instance() {
        let stores = TestStores::new();
        let slow = Arc::new(
            SlowModule::new("slow", Duration::from_millis(3000))
                .with_config(ModuleConfig::default().with_schedule("* * * * * *")),
        );
        let mut registry = ModuleRegistry::new();
        registry
            .register_instance(slow.clone() as Arc<dyn AnalysisModule>)
            .unwrap();
        let ctx = context_for(&stores, registry);

        assert_eq!(ctx.scheduler.setup_module_jobs().await.unwrap(), 1);
        ctx.scheduler.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        // 只改参数，调度表达式不变，任务仍会被重建
        ctx.update_module_config("slow", ModuleConfigPatch::default().with_param("note", 1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(3000)).await;
        ctx.shutdown().await;

        assert!(slow.calls() >= 1);
        assert_eq!(slow.max_active(), 1);
    }

    #[tokio::test]
    async fn test_zero_approval_alerts_reach_sink() {
        let today = Utc::now().date_naive();
        let stores = TestStores::with_stats(InMemoryStatsRepository::with_stats(
            vec![
                CampaignStatBuilder::new(7, today)
                    .with_name("Night Traffic")
                    .with_leads(20, 0)
                    .with_money(80.0, 0.0)
                    .build(),
                CampaignStatBuilder::new(7, days_before(today, 1))
                    .with_name("Night Traffic")
                    .with_leads(15, 0)
                    .with_money(60.0, 0.0)
                    .build(),
            ],
            Vec::new(),
        ));
        let ctx = context_with(&stores);

        let result = ctx.run_now(zero_approval_alert::MODULE_ID, false).await.unwrap();

        assert_eq!(result.status, ModuleRunStatus::Success);
        assert_eq!(result.alerts.len(), 1);
        assert_eq!(result.alerts[0].severity, Severity::Critical);
        assert_eq!(result.charts.len(), 1);

        let delivered = stores.alerts.delivered_alerts();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].entity.as_deref(), Some("campaign:7"));

        let history = ctx
            .runner
            .run_history(zero_approval_alert::MODULE_ID, None)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].alert_count, 1);
    }
}
