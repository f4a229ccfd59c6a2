//! 模块执行与调度
//!
//! - [`runner::ModuleRunner`]：执行单次模块运行，处理超时、缓存和失败隔离
//! - [`scheduler::ModuleScheduler`]：按 cron 表达式定时触发模块运行
//! - [`context::AnalyticsContext`]：组装以上组件的应用上下文

pub mod context;
pub mod cron_utils;
pub mod runner;
pub mod scheduler;

pub use context::{AnalyticsContext, ContextDependencies};
pub use cron_utils::CronScheduler;
pub use runner::ModuleRunner;
pub use scheduler::{job_id, JobInfo, ModuleScheduler, MAX_INSTANCES};
