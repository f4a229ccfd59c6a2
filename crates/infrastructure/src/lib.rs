//! 分析框架基础设施
//!
//! SQLite 存储与迁移、内存仓储、分析结果缓存、通知渠道和指标记录。

pub mod alert_sink;
pub mod database;
pub mod in_memory;
pub mod observability;
pub mod result_cache;

pub use alert_sink::LoggingAlertSink;
pub use database::*;
pub use in_memory::{InMemoryModuleConfigRepository, InMemoryModuleRunRepository, InMemoryStatsRepository};
pub use observability::MetricsCollector;
pub use result_cache::{CachedResult, ResultCache};
