use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::{
    logging::StructuredLogger,
    models::ModuleMetadata,
    traits::{AnalysisModule, ModuleFactory},
    AnalyticsError, AnalyticsResult,
};

type SharedFactory = Arc<dyn Fn() -> Arc<dyn AnalysisModule> + Send + Sync>;

struct RegisteredModule {
    metadata: ModuleMetadata,
    factory: SharedFactory,
}

/// 模块注册表：模块id到模块工厂的映射
///
/// 启动时一次性构建，之后包在 `Arc` 中只读共享，因此无需加锁。
#[derive(Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, RegisteredModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个模块，id 重复时失败
    pub fn register(&mut self, factory: ModuleFactory) -> AnalyticsResult<ModuleMetadata> {
        self.insert(factory().metadata(), Arc::new(factory))
    }

    /// 注册一个共享实例，每次 `get` 都返回同一个实例
    pub fn register_instance(
        &mut self,
        module: Arc<dyn AnalysisModule>,
    ) -> AnalyticsResult<ModuleMetadata> {
        let metadata = module.metadata();
        self.insert(metadata, Arc::new(move || module.clone()))
    }

    fn insert(
        &mut self,
        metadata: ModuleMetadata,
        factory: SharedFactory,
    ) -> AnalyticsResult<ModuleMetadata> {
        if metadata.id.trim().is_empty() {
            return Err(AnalyticsError::Configuration(format!(
                "模块 '{}' 的id为空",
                metadata.name
            )));
        }
        if self.modules.contains_key(&metadata.id) {
            return Err(AnalyticsError::DuplicateModule {
                id: metadata.id.clone(),
            });
        }

        StructuredLogger::log_module_registered(&metadata);
        self.modules.insert(
            metadata.id.clone(),
            RegisteredModule {
                metadata: metadata.clone(),
                factory,
            },
        );
        Ok(metadata)
    }

    pub fn register_batch(&mut self, factories: &[ModuleFactory]) -> AnalyticsResult<()> {
        for factory in factories {
            self.register(*factory)?;
        }
        Ok(())
    }

    /// 创建模块实例
    pub fn get(&self, module_id: &str) -> Option<Arc<dyn AnalysisModule>> {
        self.modules.get(module_id).map(|entry| (entry.factory)())
    }

    pub fn get_metadata(&self, module_id: &str) -> Option<&ModuleMetadata> {
        self.modules.get(module_id).map(|entry| &entry.metadata)
    }

    pub fn contains(&self, module_id: &str) -> bool {
        self.modules.contains_key(module_id)
    }

    pub fn list_by_category(&self, category: &str) -> Vec<Arc<dyn AnalysisModule>> {
        self.modules
            .values()
            .filter(|entry| entry.metadata.category == category)
            .map(|entry| (entry.factory)())
            .collect()
    }

    /// 按优先级、id 排序的全部元数据
    pub fn list_metadata(&self) -> Vec<&ModuleMetadata> {
        let mut list: Vec<&ModuleMetadata> =
            self.modules.values().map(|entry| &entry.metadata).collect();
        list.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        list
    }

    pub fn module_ids(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.modules.len()
    }

    pub fn categories(&self) -> BTreeSet<String> {
        self.modules
            .values()
            .map(|entry| entry.metadata.category.clone())
            .collect()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}
