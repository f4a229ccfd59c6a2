use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    database::DatabaseConfig,
    observability::ObservabilityConfig,
    scheduler_runner::{RunnerConfig, SchedulerConfig},
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: ANALYTICS_, nested with `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = toml::to_string(&AppConfig::default()).context("序列化默认配置失败")?;
        let mut builder =
            ConfigBuilder::builder().add_source(File::from_str(&defaults, FileFormat::Toml));

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/analytics.toml", "analytics.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("ANALYTICS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.scheduler.validate().context("调度器配置验证失败")?;
        self.runner.validate().context("执行器配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.max_workers, 5);
        assert_eq!(config.scheduler.misfire_grace_seconds, 300);
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
            [scheduler]
            enabled = true
            timezone = "+03:00"
            max_workers = 2
            misfire_grace_seconds = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.max_workers, 2);
        assert_eq!(config.scheduler.timezone_offset().unwrap().local_minus_utc(), 10800);
        assert_eq!(config.runner.max_output_chars, 10_000);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.database.url, config.database.url);
    }

    #[test]
    fn test_invalid_database_url() {
        let result = AppConfig::from_toml(
            r#"
            [database]
            url = "postgresql://localhost/analytics"
            max_connections = 5
            min_connections = 1
            connection_timeout_seconds = 30
            idle_timeout_seconds = 600
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[observability]\nlog_level = \"debug\"\nlog_format = \"json\"\nmetrics_enabled = false"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert!(!config.observability.metrics_enabled);
        assert_eq!(config.scheduler.max_workers, 5);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(AppConfig::load(Some("/definitely/not/here.toml")).is_err());
    }
}
