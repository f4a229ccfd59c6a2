//! Test helper utilities and common testing patterns

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use analytics_infrastructure::{
    InMemoryModuleConfigRepository, InMemoryModuleRunRepository, InMemoryStatsRepository,
};

use crate::mocks::CollectingAlertSink;

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(50)).await;
        }

        false
    }

    /// Set up logging for tests (safe to call more than once)
    pub fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init();
    }
}

/// 一组内存存储，供组装执行器和调度器使用
#[derive(Clone)]
pub struct TestStores {
    pub configs: Arc<InMemoryModuleConfigRepository>,
    pub runs: Arc<InMemoryModuleRunRepository>,
    pub stats: Arc<InMemoryStatsRepository>,
    pub alerts: Arc<CollectingAlertSink>,
}

impl TestStores {
    pub fn new() -> Self {
        Self::with_stats(InMemoryStatsRepository::new())
    }

    pub fn with_stats(stats: InMemoryStatsRepository) -> Self {
        Self {
            configs: Arc::new(InMemoryModuleConfigRepository::new()),
            runs: Arc::new(InMemoryModuleRunRepository::new()),
            stats: Arc::new(stats),
            alerts: Arc::new(CollectingAlertSink::new()),
        }
    }
}

impl Default for TestStores {
    fn default() -> Self {
        Self::new()
    }
}
