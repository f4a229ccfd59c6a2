//! Observability module
//!
//! 运行和调度指标的记录。

pub mod metrics_collector;

pub use metrics_collector::MetricsCollector;
