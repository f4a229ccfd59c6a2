use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alert::{AlertRecord, ChartSpec};

/// `analyze` 的原始输出，按约定为包含 `summary` 的对象
pub type AnalysisOutput = serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModuleRunStatus {
    Success,
    Failed,
    Timeout,
}

impl ModuleRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleRunStatus::Success => "success",
            ModuleRunStatus::Failed => "failed",
            ModuleRunStatus::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ModuleRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ModuleRunStatus::Success),
            "failed" => Ok(ModuleRunStatus::Failed),
            "timeout" => Ok(ModuleRunStatus::Timeout),
            _ => Err(format!("Invalid module run status: {s}")),
        }
    }
}

/// 一次模块运行的结果，返回后不再修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRunResult {
    pub module_id: String,
    pub status: ModuleRunStatus,
    /// 仅在成功时存在
    pub data: Option<AnalysisOutput>,
    /// 仅在失败或超时时存在
    pub error: Option<String>,
    pub duration_seconds: f64,
    pub started_at: DateTime<Utc>,
    pub used_cache: bool,
    #[serde(default)]
    pub alerts: Vec<AlertRecord>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub charts: Vec<ChartSpec>,
}

impl ModuleRunResult {
    pub fn success(
        module_id: impl Into<String>,
        data: AnalysisOutput,
        started_at: DateTime<Utc>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            status: ModuleRunStatus::Success,
            data: Some(data),
            error: None,
            duration_seconds,
            started_at,
            used_cache: false,
            alerts: Vec::new(),
            recommendations: Vec::new(),
            charts: Vec::new(),
        }
    }

    pub fn failed(
        module_id: impl Into<String>,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            status: ModuleRunStatus::Failed,
            data: None,
            error: Some(error.into()),
            duration_seconds,
            started_at,
            used_cache: false,
            alerts: Vec::new(),
            recommendations: Vec::new(),
            charts: Vec::new(),
        }
    }

    pub fn timeout(
        module_id: impl Into<String>,
        timeout_seconds: u64,
        started_at: DateTime<Utc>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            status: ModuleRunStatus::Timeout,
            ..Self::failed(
                module_id,
                format!("分析执行超时 ({timeout_seconds}秒)"),
                started_at,
                duration_seconds,
            )
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ModuleRunStatus::Success
    }
}

/// 持久化的运行记录，只追加不修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRunRecord {
    pub id: i64,
    pub module_id: String,
    pub status: ModuleRunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub used_cache: bool,
    /// 截断后的输出摘要
    pub output: Option<String>,
    pub error_message: Option<String>,
    pub alert_count: i64,
}

impl ModuleRunRecord {
    /// 由运行结果构造待写入的记录
    ///
    /// 输出优先取 `summary` 子对象，序列化后截断到 `max_output_chars` 个字符。
    pub fn from_result(result: &ModuleRunResult, max_output_chars: usize) -> Self {
        let output = result.data.as_ref().map(|data| {
            let summary = data.get("summary").unwrap_or(data);
            truncate_chars(&summary.to_string(), max_output_chars)
        });
        let duration_ms = (result.duration_seconds * 1000.0) as i64;

        Self {
            id: 0,
            module_id: result.module_id.clone(),
            status: result.status,
            started_at: result.started_at,
            completed_at: result.started_at + chrono::Duration::milliseconds(duration_ms),
            duration_seconds: result.duration_seconds,
            used_cache: result.used_cache,
            output,
            error_message: result.error.clone(),
            alert_count: result.alerts.len() as i64,
        }
    }

    pub fn entity_description(&self) -> String {
        format!("模块运行记录 (ID: {}, 模块: {})", self.id, self.module_id)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
