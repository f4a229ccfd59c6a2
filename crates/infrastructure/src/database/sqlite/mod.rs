pub mod sqlite_module_config_repository;
pub mod sqlite_module_run_repository;
pub mod sqlite_stats_repository;

pub use sqlite_module_config_repository::SqliteModuleConfigRepository;
pub use sqlite_module_run_repository::SqliteModuleRunRepository;
pub use sqlite_stats_repository::SqliteStatsRepository;
