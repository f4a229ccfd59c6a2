use thiserror::Error;

/// 分析框架错误类型定义
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("分析模块未找到: {id}")]
    ModuleNotFound { id: String },

    #[error("分析模块重复注册: {id}")]
    DuplicateModule { id: String },

    #[error("分析模块已禁用: {id}")]
    ModuleDisabled { id: String },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("模块 {module_id} 的参数 {param} 无效: {message}")]
    InvalidParameter {
        module_id: String,
        param: String,
        message: String,
    },

    #[error("分析执行失败: {0}")]
    Analysis(String),

    #[error("分析执行超时 ({seconds}秒)")]
    ExecutionTimeout { seconds: u64 },

    #[error("结果派生失败: {0}")]
    Derivation(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("调度器错误: {0}")]
    Scheduler(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl AnalyticsError {
    pub fn module_not_found(id: impl Into<String>) -> Self {
        Self::ModuleNotFound { id: id.into() }
    }

    pub fn analysis(message: impl Into<String>) -> Self {
        Self::Analysis(message.into())
    }

    /// 是否属于需要运维人员处理的基础设施/配置错误
    ///
    /// 这类错误会从 Runner 中直接向上传播，而不是被记录为一次失败的运行。
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::DatabaseOperation(_)
                | Self::ModuleNotFound { .. }
                | Self::ModuleDisabled { .. }
                | Self::Configuration(_)
                | Self::InvalidParameter { .. }
        )
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type AnalyticsResult<T> = std::result::Result<T, AnalyticsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnalyticsError::module_not_found("roi_monitor");
        assert_eq!(err.to_string(), "分析模块未找到: roi_monitor");

        let err = AnalyticsError::ExecutionTimeout { seconds: 30 };
        assert_eq!(err.to_string(), "分析执行超时 (30秒)");
    }

    #[test]
    fn test_infrastructure_classification() {
        assert!(AnalyticsError::module_not_found("x").is_infrastructure());
        assert!(AnalyticsError::Configuration("bad".into()).is_infrastructure());
        assert!(!AnalyticsError::analysis("boom").is_infrastructure());
        assert!(!AnalyticsError::ExecutionTimeout { seconds: 1 }.is_infrastructure());
    }

    #[test]
    fn test_from_serde_error() {
        let err: AnalyticsError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, AnalyticsError::Serialization(_)));
    }
}
