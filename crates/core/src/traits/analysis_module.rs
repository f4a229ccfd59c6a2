//! 分析模块接口定义
//!
//! 每个分析单元都实现 [`AnalysisModule`]，框架只通过这个接口与模块交互：
//! - 元数据与默认配置（纯函数，无 I/O）
//! - 参数与严重级别描述（仅用于配置界面和保存时校验）
//! - `analyze`：唯一允许访问数据存储的操作
//! - 告警、建议、图表：只基于 `analyze` 的返回值派生，不再查询外部状态，
//!   因此缓存的分析结果可以直接用于重新生成告警和图表

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::repository::StatsRepository;
use crate::{
    models::{AlertRecord, AnalysisOutput, ChartSpec, ModuleConfig, ModuleMetadata, Severity},
    AnalyticsError, AnalyticsResult,
};

/// 单次分析的执行上下文
#[derive(Clone)]
pub struct AnalysisContext {
    pub module_id: String,
    pub config: ModuleConfig,
    /// 只读数据存储
    pub store: Arc<dyn StatsRepository>,
    /// 按应用时区计算的当前日期，窗口计算以此为准
    pub today: NaiveDate,
}

impl AnalysisContext {
    pub fn new(
        module_id: impl Into<String>,
        config: ModuleConfig,
        store: Arc<dyn StatsRepository>,
        today: NaiveDate,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            config,
            store,
            today,
        }
    }

    /// 读取整数参数，缺失时使用给定默认值
    pub fn int_param(&self, key: &str, default: i64) -> i64 {
        self.config.param_i64(key).unwrap_or(default)
    }

    pub fn float_param(&self, key: &str, default: f64) -> f64 {
        self.config.param_f64(key).unwrap_or(default)
    }

    /// 以 `today` 为结束日（含）的 `days` 天窗口
    ///
    /// 天数超出日期范围时返回 `Analysis` 错误。
    pub fn window(&self, days: i64) -> AnalyticsResult<(NaiveDate, NaiveDate)> {
        let days = days.max(1);
        let start = chrono::Duration::try_days(days - 1)
            .and_then(|span| self.today.checked_sub_signed(span))
            .ok_or_else(|| {
                AnalyticsError::analysis(format!("模块 {} 的窗口天数超出范围: {days}", self.module_id))
            })?;
        Ok((start, self.today))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Float,
    Bool,
}

/// 参数描述，用于渲染配置界面并在保存配置时校验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamMetadata {
    pub label: String,
    pub description: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
}

impl ParamMetadata {
    fn new(param_type: ParamType, label: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: description.into(),
            param_type,
            min: None,
            max: None,
            step: None,
        }
    }

    pub fn int(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(ParamType::Int, label, description)
    }

    pub fn float(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(ParamType::Float, label, description)
    }

    pub fn bool(label: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(ParamType::Bool, label, description)
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    /// 检查取值的类型和范围
    pub fn validate(&self, value: &serde_json::Value) -> Result<(), String> {
        let number = match self.param_type {
            ParamType::Bool => {
                return value
                    .is_boolean()
                    .then_some(())
                    .ok_or_else(|| format!("期望布尔值，实际为 {value}"));
            }
            ParamType::Int => match value.as_f64() {
                Some(n) if n.fract() == 0.0 => n,
                _ => return Err(format!("期望整数，实际为 {value}")),
            },
            ParamType::Float => value
                .as_f64()
                .ok_or_else(|| format!("期望数值，实际为 {value}"))?,
        };

        if let Some(min) = self.min {
            if number < min {
                return Err(format!("{number} 小于最小值 {min}"));
            }
        }
        if let Some(max) = self.max {
            if number > max {
                return Err(format!("{number} 大于最大值 {max}"));
            }
        }
        Ok(())
    }
}

/// 某个严重级别对应的阈值参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityThreshold {
    /// 控制该级别的参数名
    pub param: String,
    pub label: String,
    pub description: String,
}

impl SeverityThreshold {
    pub fn new(
        param: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            param: param.into(),
            label: label.into(),
            description: description.into(),
        }
    }
}

pub type SeverityMetadata = BTreeMap<Severity, SeverityThreshold>;

/// 分析模块核心接口
///
/// 实现必须是无状态的：注册表每次按需通过工厂创建实例，
/// 框架不保留任何跨运行的实例状态。
#[async_trait]
pub trait AnalysisModule: Send + Sync {
    fn metadata(&self) -> ModuleMetadata;

    /// 模块自身的默认配置，包括完整的参数包
    fn default_config(&self) -> ModuleConfig;

    fn param_metadata(&self) -> BTreeMap<String, ParamMetadata> {
        BTreeMap::new()
    }

    /// 并非所有模块都有可调的严重级别阈值
    fn severity_metadata(&self) -> Option<SeverityMetadata> {
        None
    }

    /// 执行分析。失败必须返回错误，不允许返回部分结果。
    async fn analyze(&self, ctx: &AnalysisContext) -> AnalyticsResult<AnalysisOutput>;

    /// 空结果必须返回空列表
    fn generate_alerts(&self, raw: &AnalysisOutput) -> AnalyticsResult<Vec<AlertRecord>>;

    fn generate_recommendations(&self, _raw: &AnalysisOutput) -> AnalyticsResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn prepare_chart_data(&self, _raw: &AnalysisOutput) -> AnalyticsResult<Vec<ChartSpec>> {
        Ok(Vec::new())
    }
}

/// 模块工厂，用于静态模块清单
pub type ModuleFactory = fn() -> Arc<dyn AnalysisModule>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CampaignDailyStat, OfferDailyStat};
    use serde_json::json;

    struct NoStats;

    #[async_trait]
    impl StatsRepository for NoStats {
        async fn get_campaign_stats(
            &self,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> AnalyticsResult<Vec<CampaignDailyStat>> {
            Ok(Vec::new())
        }

        async fn get_offer_stats(
            &self,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> AnalyticsResult<Vec<OfferDailyStat>> {
            Ok(Vec::new())
        }
    }

    fn context(today: NaiveDate) -> AnalysisContext {
        AnalysisContext::new("windowed", ModuleConfig::default(), Arc::new(NoStats), today)
    }

    #[test]
    fn test_window_includes_today() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let ctx = context(today);

        assert_eq!(
            ctx.window(7).unwrap(),
            (NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(), today)
        );
        assert_eq!(ctx.window(0).unwrap(), (today, today));
    }

    #[test]
    fn test_window_out_of_range_is_an_error() {
        let ctx = context(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());

        for days in [i64::MAX, 10_000_000_000] {
            assert!(matches!(ctx.window(days), Err(AnalyticsError::Analysis(_))));
        }
    }

    #[test]
    fn test_int_param_validation() {
        let meta = ParamMetadata::int("Days", "Lookback window").range(1.0, 90.0);
        assert!(meta.validate(&json!(7)).is_ok());
        assert!(meta.validate(&json!(7.0)).is_ok());
        assert!(meta.validate(&json!(7.5)).is_err());
        assert!(meta.validate(&json!(0)).is_err());
        assert!(meta.validate(&json!(91)).is_err());
        assert!(meta.validate(&json!("7")).is_err());
    }

    #[test]
    fn test_float_and_bool_validation() {
        let meta = ParamMetadata::float("Threshold", "").range(-100.0, 100.0).step(0.5);
        assert!(meta.validate(&json!(-12.5)).is_ok());
        assert!(meta.validate(&json!(true)).is_err());

        let flag = ParamMetadata::bool("Flag", "");
        assert!(flag.validate(&json!(false)).is_ok());
        assert!(flag.validate(&json!(1)).is_err());
    }

    #[test]
    fn test_param_metadata_serializes_type_key() {
        let meta = ParamMetadata::int("Days", "").range(1.0, 30.0).step(1.0);
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["type"], json!("int"));
        assert_eq!(value["max"], json!(30.0));
    }
}
