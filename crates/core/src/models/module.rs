use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// 模块参数包，键为参数名
pub type ModuleParams = BTreeMap<String, serde_json::Value>;

/// 模块优先级，仅用于界面排序，不影响调度顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModulePriority {
    Critical,
    High,
    Medium,
    Low,
}

impl ModulePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModulePriority::Critical => "critical",
            ModulePriority::High => "high",
            ModulePriority::Medium => "medium",
            ModulePriority::Low => "low",
        }
    }
}

/// 模块元数据，注册时读取一次，之后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub detailed_description: String,
    pub version: String,
    pub author: String,
    pub priority: ModulePriority,
    pub tags: BTreeSet<String>,
}

impl ModuleMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            description: String::new(),
            detailed_description: String::new(),
            version: "1.0.0".to_string(),
            author: "Analytics Team".to_string(),
            priority: ModulePriority::Medium,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_detailed_description(mut self, detailed: impl Into<String>) -> Self {
        self.detailed_description = detailed.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_priority(mut self, priority: ModulePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// 模块运行配置
///
/// 每个模块id在逻辑上只有一份配置。默认值由模块自身提供，
/// 持久化的覆盖值按键合并在默认值之上（浅合并）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// 是否允许运行（包括手动和定时）
    pub enabled: bool,
    /// CRON表达式，空字符串表示不自动运行
    pub schedule: String,
    /// 告警是否推送到通知渠道
    pub alerts_enabled: bool,
    /// 单次运行的时间预算（秒）
    pub timeout_seconds: u64,
    /// 缓存结果的有效期（秒）
    pub cache_ttl_seconds: u64,
    /// 模块自定义参数
    #[serde(default)]
    pub params: ModuleParams,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: String::new(),
            alerts_enabled: true,
            timeout_seconds: 300,
            cache_ttl_seconds: 3600,
            params: ModuleParams::new(),
        }
    }
}

impl ModuleConfig {
    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = schedule.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_cache_ttl(mut self, cache_ttl_seconds: u64) -> Self {
        self.cache_ttl_seconds = cache_ttl_seconds;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn has_schedule(&self) -> bool {
        !self.schedule.trim().is_empty()
    }

    /// 已启用且配置了CRON表达式
    pub fn is_schedulable(&self) -> bool {
        self.enabled && self.has_schedule()
    }

    /// 以 `self` 作为持久化值合并到模块默认配置之上
    ///
    /// 顶层字段以持久化值为准；参数按键覆盖，缺失的键回退到默认值。
    pub fn merged_over(self, defaults: &ModuleConfig) -> ModuleConfig {
        let mut params = defaults.params.clone();
        params.extend(self.params);
        ModuleConfig { params, ..self }
    }

    pub fn apply_patch(&mut self, patch: ModuleConfigPatch) {
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(schedule) = patch.schedule {
            self.schedule = schedule;
        }
        if let Some(alerts_enabled) = patch.alerts_enabled {
            self.alerts_enabled = alerts_enabled;
        }
        if let Some(timeout_seconds) = patch.timeout_seconds {
            self.timeout_seconds = timeout_seconds;
        }
        if let Some(cache_ttl_seconds) = patch.cache_ttl_seconds {
            self.cache_ttl_seconds = cache_ttl_seconds;
        }
        if let Some(params) = patch.params {
            self.params.extend(params);
        }
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(|v| v.as_f64())
    }

    pub fn param_i64(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_f64().map(|f| f.round() as i64))
        })
    }

    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(|v| v.as_bool())
    }
}

/// 配置的部分更新
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfigPatch {
    pub enabled: Option<bool>,
    pub schedule: Option<String>,
    pub alerts_enabled: Option<bool>,
    pub timeout_seconds: Option<u64>,
    pub cache_ttl_seconds: Option<u64>,
    pub params: Option<ModuleParams>,
}

impl ModuleConfigPatch {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Default::default()
        }
    }

    pub fn schedule(schedule: impl Into<String>) -> Self {
        Self {
            schedule: Some(schedule.into()),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params
            .get_or_insert_with(ModuleParams::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> ModuleConfig {
        ModuleConfig::default()
            .with_param("days", 7)
            .with_param("min_leads", 10)
    }

    #[test]
    fn test_merge_keeps_default_keys() {
        let stored = ModuleConfig::default().with_param("days", 14);
        let merged = stored.merged_over(&defaults());

        assert_eq!(merged.params.get("days"), Some(&json!(14)));
        assert_eq!(merged.params.get("min_leads"), Some(&json!(10)));
    }

    #[test]
    fn test_merge_is_shallow() {
        let defaults = ModuleConfig::default().with_param("window", json!({"recent": 3, "previous": 7}));
        let stored = ModuleConfig::default().with_param("window", json!({"recent": 5}));
        let merged = stored.merged_over(&defaults);

        assert_eq!(merged.params.get("window"), Some(&json!({"recent": 5})));
    }

    #[test]
    fn test_merge_top_level_from_stored() {
        let stored = ModuleConfig::default()
            .with_enabled(false)
            .with_schedule("0 9 * * *");
        let merged = stored.merged_over(&defaults());
        assert!(!merged.enabled);
        assert_eq!(merged.schedule, "0 9 * * *");
        assert!(!merged.is_schedulable());
    }

    #[test]
    fn test_apply_patch() {
        let mut config = defaults();
        config.apply_patch(ModuleConfigPatch::enabled(false).with_param("days", 30));

        assert!(!config.enabled);
        assert_eq!(config.param_i64("days"), Some(30));
        assert_eq!(config.param_i64("min_leads"), Some(10));
        assert_eq!(config.timeout_seconds, 300);
    }

    #[test]
    fn test_schedulable() {
        assert!(!ModuleConfig::default().is_schedulable());
        assert!(!ModuleConfig::default().with_schedule("   ").is_schedulable());
        assert!(ModuleConfig::default().with_schedule("0 9 * * *").is_schedulable());
    }

    #[test]
    fn test_param_accessors() {
        let config = ModuleConfig::default()
            .with_param("threshold", 12.5)
            .with_param("count", 3.0)
            .with_param("flag", true);
        assert_eq!(config.param_f64("threshold"), Some(12.5));
        assert_eq!(config.param_i64("count"), Some(3));
        assert_eq!(config.param_bool("flag"), Some(true));
        assert_eq!(config.param_bool("missing"), None);
    }
}
