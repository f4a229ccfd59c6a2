use std::collections::HashMap;

use analytics_core::models::AnalysisOutput;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

/// 缓存的原始分析结果
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult {
    pub data: AnalysisOutput,
    pub cached_at: DateTime<Utc>,
}

impl CachedResult {
    /// `ttl_seconds` 为0表示不使用缓存
    pub fn is_fresh(&self, ttl_seconds: u64, now: DateTime<Utc>) -> bool {
        if ttl_seconds == 0 {
            return false;
        }
        let ttl = Duration::seconds(ttl_seconds.min(i64::MAX as u64) as i64);
        now - self.cached_at < ttl
    }
}

/// 按模块缓存分析结果
///
/// 只缓存 `analyze` 的原始输出，告警、建议和图表在命中后重新派生。
/// TTL 在读取时按模块当前配置判断，配置修改后立即生效。
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, CachedResult>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_fresh(
        &self,
        module_id: &str,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> Option<CachedResult> {
        let entries = self.entries.read().await;
        let entry = entries.get(module_id)?;
        if entry.is_fresh(ttl_seconds, now) {
            Some(entry.clone())
        } else {
            debug!("模块 {} 的缓存已过期", module_id);
            None
        }
    }

    pub async fn put(&self, module_id: &str, data: AnalysisOutput, cached_at: DateTime<Utc>) {
        self.entries
            .write()
            .await
            .insert(module_id.to_string(), CachedResult { data, cached_at });
    }

    pub async fn invalidate(&self, module_id: &str) -> bool {
        self.entries.write().await.remove(module_id).is_some()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fresh_within_ttl() {
        let cache = ResultCache::new();
        let now = Utc::now();
        cache.put("m", json!({"summary": {}}), now).await;

        assert!(cache.get_fresh("m", 60, now + Duration::seconds(59)).await.is_some());
        assert!(cache.get_fresh("m", 60, now + Duration::seconds(60)).await.is_none());
        assert!(cache.get_fresh("other", 60, now).await.is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let cache = ResultCache::new();
        let now = Utc::now();
        cache.put("m", json!(1), now).await;
        assert!(cache.get_fresh("m", 0, now).await.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_and_invalidate() {
        let cache = ResultCache::new();
        let now = Utc::now();
        cache.put("m", json!(1), now).await;
        cache.put("m", json!(2), now).await;
        assert_eq!(cache.get_fresh("m", 10, now).await.unwrap().data, json!(2));
        assert_eq!(cache.len().await, 1);

        assert!(cache.invalidate("m").await);
        assert!(!cache.invalidate("m").await);
        assert!(cache.is_empty().await);
    }
}
