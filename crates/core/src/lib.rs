//! 分析模块框架核心
//!
//! 模块接口、数据模型、注册表、配置存储以及仓储接口。

pub mod config;
pub mod config_store;
pub mod errors;
pub mod logging;
pub mod models;
pub mod module_registry;
pub mod traits;

pub use config::{AppConfig, DatabaseConfig, ObservabilityConfig, RunnerConfig, SchedulerConfig};
pub use config_store::{validate_config, ConfigurationStore};
pub use errors::*;
pub use logging::StructuredLogger;
pub use module_registry::ModuleRegistry;
pub use traits::{
    AlertSink, AnalysisContext, AnalysisModule, ModuleConfigRepository, ModuleFactory,
    ModuleRunRepository, ParamMetadata, ParamType, SeverityMetadata, SeverityThreshold,
    StatsRepository,
};
