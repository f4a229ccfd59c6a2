use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    models::{ModuleConfig, ModuleConfigPatch},
    module_registry::ModuleRegistry,
    traits::{AnalysisModule, ModuleConfigRepository},
    AnalyticsError, AnalyticsResult,
};

/// 模块配置存储
///
/// 读取时将持久化配置合并到模块默认配置之上；
/// 写入统一经过一把异步互斥锁，保证读-改-写不会互相覆盖。
pub struct ConfigurationStore {
    registry: Arc<ModuleRegistry>,
    repository: Arc<dyn ModuleConfigRepository>,
    write_lock: Mutex<()>,
}

impl ConfigurationStore {
    pub fn new(registry: Arc<ModuleRegistry>, repository: Arc<dyn ModuleConfigRepository>) -> Self {
        Self {
            registry,
            repository,
            write_lock: Mutex::new(()),
        }
    }

    fn module(&self, module_id: &str) -> AnalyticsResult<Arc<dyn AnalysisModule>> {
        self.registry
            .get(module_id)
            .ok_or_else(|| AnalyticsError::module_not_found(module_id))
    }

    /// 获取合并后的配置；首次读取时把默认配置写回存储
    pub async fn get_config(&self, module_id: &str) -> AnalyticsResult<ModuleConfig> {
        let defaults = self.module(module_id)?.default_config();

        if let Some(stored) = self.repository.get(module_id).await? {
            return Ok(stored.merged_over(&defaults));
        }

        debug!("模块 {} 没有持久化配置，使用默认配置", module_id);
        // 只在仍然没有记录时写入默认值，不能覆盖并发保存的配置
        match self.repository.insert_if_absent(module_id, &defaults).await {
            Ok(true) => Ok(defaults),
            Ok(false) => match self.repository.get(module_id).await? {
                Some(stored) => Ok(stored.merged_over(&defaults)),
                None => Ok(defaults),
            },
            Err(e) => {
                warn!("持久化模块 {} 的默认配置失败: {}", module_id, e);
                Ok(defaults)
            }
        }
    }

    /// 校验并保存完整配置
    pub async fn save_config(&self, module_id: &str, config: &ModuleConfig) -> AnalyticsResult<()> {
        let module = self.module(module_id)?;
        validate_config(module_id, module.as_ref(), config)?;

        let _guard = self.write_lock.lock().await;
        self.repository.upsert(module_id, config).await?;
        info!("模块 {} 的配置已保存", module_id);
        Ok(())
    }

    /// 部分更新配置，返回更新后的完整配置
    pub async fn update_config(
        &self,
        module_id: &str,
        patch: ModuleConfigPatch,
    ) -> AnalyticsResult<ModuleConfig> {
        let module = self.module(module_id)?;

        let _guard = self.write_lock.lock().await;
        let mut config = self.get_config(module_id).await?;
        config.apply_patch(patch);
        validate_config(module_id, module.as_ref(), &config)?;
        self.repository.upsert(module_id, &config).await?;

        info!(
            "模块 {} 的配置已更新: enabled={}, schedule='{}'",
            module_id, config.enabled, config.schedule
        );
        Ok(config)
    }

    /// 所有已注册模块的合并配置
    pub async fn list_configs(&self) -> AnalyticsResult<Vec<(String, ModuleConfig)>> {
        let mut configs = Vec::with_capacity(self.registry.count());
        for module_id in self.registry.module_ids() {
            let config = self.get_config(&module_id).await?;
            configs.push((module_id, config));
        }
        Ok(configs)
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }
}

/// 按模块的参数描述校验配置；未声明的参数不做限制
pub fn validate_config(
    module_id: &str,
    module: &dyn AnalysisModule,
    config: &ModuleConfig,
) -> AnalyticsResult<()> {
    if config.timeout_seconds == 0 {
        return Err(AnalyticsError::Configuration(format!(
            "模块 {module_id} 的 timeout_seconds 必须大于0"
        )));
    }

    for (param, meta) in module.param_metadata() {
        if let Some(value) = config.params.get(&param) {
            meta.validate(value)
                .map_err(|message| AnalyticsError::InvalidParameter {
                    module_id: module_id.to_string(),
                    param: param.clone(),
                    message,
                })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertRecord, AnalysisOutput, ModuleMetadata};
    use crate::traits::{AnalysisContext, ParamMetadata};
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;

    mock! {
        pub ConfigRepo {}

        #[async_trait]
        impl ModuleConfigRepository for ConfigRepo {
            async fn get(&self, module_id: &str) -> AnalyticsResult<Option<ModuleConfig>>;
            async fn upsert(&self, module_id: &str, config: &ModuleConfig) -> AnalyticsResult<()>;
            async fn insert_if_absent(
                &self,
                module_id: &str,
                config: &ModuleConfig,
            ) -> AnalyticsResult<bool>;
            async fn list(&self) -> AnalyticsResult<Vec<(String, ModuleConfig)>>;
            async fn delete(&self, module_id: &str) -> AnalyticsResult<bool>;
        }
    }

    /// 读取先取快照、再等待一段时间返回的配置存储
    #[derive(Default)]
    struct SlowReadRepo {
        configs: std::sync::Mutex<HashMap<String, ModuleConfig>>,
    }

    #[async_trait]
    impl ModuleConfigRepository for SlowReadRepo {
        async fn get(&self, module_id: &str) -> AnalyticsResult<Option<ModuleConfig>> {
            let snapshot = self.configs.lock().unwrap().get(module_id).cloned();
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(snapshot)
        }

        async fn upsert(&self, module_id: &str, config: &ModuleConfig) -> AnalyticsResult<()> {
            self.configs
                .lock()
                .unwrap()
                .insert(module_id.to_string(), config.clone());
            Ok(())
        }

        async fn insert_if_absent(
            &self,
            module_id: &str,
            config: &ModuleConfig,
        ) -> AnalyticsResult<bool> {
            let mut configs = self.configs.lock().unwrap();
            if configs.contains_key(module_id) {
                return Ok(false);
            }
            configs.insert(module_id.to_string(), config.clone());
            Ok(true)
        }

        async fn list(&self) -> AnalyticsResult<Vec<(String, ModuleConfig)>> {
            Ok(self
                .configs
                .lock()
                .unwrap()
                .iter()
                .map(|(id, config)| (id.clone(), config.clone()))
                .collect())
        }

        async fn delete(&self, module_id: &str) -> AnalyticsResult<bool> {
            Ok(self.configs.lock().unwrap().remove(module_id).is_some())
        }
    }

    struct Windowed;

    #[async_trait]
    impl AnalysisModule for Windowed {
        fn metadata(&self) -> ModuleMetadata {
            ModuleMetadata::new("windowed", "Windowed", "test")
        }
        fn default_config(&self) -> ModuleConfig {
            ModuleConfig::default()
                .with_param("days", 7)
                .with_param("threshold", 20.0)
        }
        fn param_metadata(&self) -> BTreeMap<String, ParamMetadata> {
            BTreeMap::from([(
                "days".to_string(),
                ParamMetadata::int("Days", "Lookback").range(1.0, 30.0),
            )])
        }
        async fn analyze(&self, _ctx: &AnalysisContext) -> AnalyticsResult<AnalysisOutput> {
            Ok(json!({}))
        }
        fn generate_alerts(&self, _raw: &AnalysisOutput) -> AnalyticsResult<Vec<AlertRecord>> {
            Ok(Vec::new())
        }
    }

    fn windowed() -> Arc<dyn AnalysisModule> {
        Arc::new(Windowed)
    }

    fn registry() -> Arc<ModuleRegistry> {
        let mut registry = ModuleRegistry::new();
        registry.register(windowed).unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_defaults_are_persisted_lazily() {
        let mut repo = MockConfigRepo::new();
        repo.expect_get().times(1).returning(|_| Ok(None));
        repo.expect_insert_if_absent()
            .withf(|id, config| id == "windowed" && config.param_i64("days") == Some(7))
            .times(1)
            .returning(|_, _| Ok(true));
        repo.expect_upsert().never();

        let store = ConfigurationStore::new(registry(), Arc::new(repo));
        let config = store.get_config("windowed").await.unwrap();
        assert_eq!(config, Windowed.default_config());
    }

    #[tokio::test]
    async fn test_first_read_does_not_overwrite_concurrent_save() {
        let store = Arc::new(ConfigurationStore::new(
            registry(),
            Arc::new(SlowReadRepo::default()),
        ));

        // 首次读取在存储中看到“没有记录”，之后才写默认值
        let reader = {
            let store = store.clone();
            tokio::spawn(async move { store.get_config("windowed").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let saved = Windowed
            .default_config()
            .with_enabled(false)
            .with_schedule("0 9 * * *");
        store.save_config("windowed", &saved).await.unwrap();

        let seen_by_reader = reader.await.unwrap().unwrap();
        assert_eq!(seen_by_reader, saved);

        let config = store.get_config("windowed").await.unwrap();
        assert!(!config.enabled);
        assert_eq!(config.schedule, "0 9 * * *");
    }

    #[tokio::test]
    async fn test_stored_values_win_per_key() {
        let mut repo = MockConfigRepo::new();
        repo.expect_get().returning(|_| {
            Ok(Some(
                ModuleConfig::default()
                    .with_schedule("0 9 * * *")
                    .with_param("days", 14),
            ))
        });

        let store = ConfigurationStore::new(registry(), Arc::new(repo));
        let config = store.get_config("windowed").await.unwrap();
        assert_eq!(config.schedule, "0 9 * * *");
        assert_eq!(config.param_i64("days"), Some(14));
        assert_eq!(config.param_f64("threshold"), Some(20.0));
    }

    #[tokio::test]
    async fn test_unknown_module() {
        let repo = MockConfigRepo::new();
        let store = ConfigurationStore::new(registry(), Arc::new(repo));
        let err = store.get_config("nope").await.unwrap_err();
        assert!(matches!(err, AnalyticsError::ModuleNotFound { .. }));
    }

    #[tokio::test]
    async fn test_save_rejects_out_of_range_param() {
        let mut repo = MockConfigRepo::new();
        repo.expect_upsert().never();

        let store = ConfigurationStore::new(registry(), Arc::new(repo));
        let config = Windowed.default_config().with_param("days", 365);
        let err = store.save_config("windowed", &config).await.unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::InvalidParameter { ref param, .. } if param == "days"
        ));
    }

    #[tokio::test]
    async fn test_update_applies_patch() {
        let mut repo = MockConfigRepo::new();
        repo.expect_get()
            .returning(|_| Ok(Some(ModuleConfig::default().with_schedule("0 9 * * *"))));
        repo.expect_upsert()
            .withf(|_, config| !config.enabled && config.schedule == "0 9 * * *")
            .times(1)
            .returning(|_, _| Ok(()));

        let store = ConfigurationStore::new(registry(), Arc::new(repo));
        let updated = store
            .update_config("windowed", ModuleConfigPatch::enabled(false))
            .await
            .unwrap();
        assert!(!updated.enabled);
        assert_eq!(updated.param_i64("days"), Some(7));
    }

    #[tokio::test]
    async fn test_zero_timeout_is_rejected() {
        let repo = MockConfigRepo::new();
        let store = ConfigurationStore::new(registry(), Arc::new(repo));
        let config = Windowed.default_config().with_timeout(0);
        assert!(store.save_config("windowed", &config).await.is_err());
    }
}
