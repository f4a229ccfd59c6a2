//! 内置分析模块
//!
//! 所有模块都列在 [`MANIFEST`] 中，启动时由 [`register_all_modules`] 一次性注册。

mod common;
pub mod roi_monitor;
pub mod squeezed_offer;
pub mod zero_approval_alert;

use analytics_core::{traits::ModuleFactory, AnalyticsResult, ModuleRegistry};

pub use roi_monitor::RoiMonitor;
pub use squeezed_offer::SqueezedOffer;
pub use zero_approval_alert::ZeroApprovalAlert;

/// 静态模块清单
pub const MANIFEST: &[ModuleFactory] = &[
    zero_approval_alert::create,
    squeezed_offer::create,
    roi_monitor::create,
];

pub fn register_all_modules(registry: &mut ModuleRegistry) -> AnalyticsResult<()> {
    registry.register_batch(MANIFEST)?;
    tracing::info!("已注册 {} 个内置模块", MANIFEST.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_core::{validate_config, AnalyticsError};
    use serde_json::json;

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        register_all_modules(&mut registry).unwrap();
        registry
    }

    #[test]
    fn test_manifest_registers_every_module() {
        let registry = registry();
        assert_eq!(registry.count(), MANIFEST.len());
        assert!(registry.contains(zero_approval_alert::MODULE_ID));
        assert!(registry.contains(squeezed_offer::MODULE_ID));
        assert!(registry.contains(roi_monitor::MODULE_ID));
    }

    #[test]
    fn test_registering_twice_fails() {
        let mut registry = registry();
        let err = register_all_modules(&mut registry).unwrap_err();
        assert!(matches!(err, AnalyticsError::DuplicateModule { .. }));
    }

    #[test]
    fn test_default_configs_are_valid() {
        let registry = registry();
        for id in registry.module_ids() {
            let module = registry.get(&id).unwrap();
            let defaults = module.default_config();
            validate_config(&id, module.as_ref(), &defaults).unwrap();
            assert!(defaults.timeout_seconds > 0);
            for param in module.param_metadata().keys() {
                assert!(defaults.params.contains_key(param), "{id} 缺少默认参数 {param}");
            }
        }
    }

    #[test]
    fn test_derivations_tolerate_empty_output() {
        let registry = registry();
        let empty = json!({"campaigns": [], "offers": [], "summary": {"total_found": 0}});
        for id in registry.module_ids() {
            let module = registry.get(&id).unwrap();
            assert!(module.generate_alerts(&empty).unwrap().is_empty());
            assert!(module.generate_recommendations(&empty).unwrap().is_empty());
            assert!(module.prepare_chart_data(&empty).unwrap().is_empty());
        }
    }
}
