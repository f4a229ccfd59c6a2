//! # Analytics Testing Utils
//!
//! 工作区内共享的测试工具：
//!
//! - **Test doubles**: 计数、失败、慢速、panic 的分析模块，收集告警的通知渠道
//! - **In-memory stores**: 一次性构建全部内存仓储
//! - **Builders**: 统计数据构建器
//! - **Helpers**: 等待条件成立、初始化测试日志
//!
//! ```toml
//! [dev-dependencies]
//! analytics-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
