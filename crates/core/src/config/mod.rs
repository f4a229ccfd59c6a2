pub mod models;

pub use models::{
    parse_timezone, AppConfig, DatabaseConfig, ObservabilityConfig, RunnerConfig, SchedulerConfig,
};
