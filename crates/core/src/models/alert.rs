use serde::{Deserialize, Serialize};

/// 告警严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 模块根据分析结果生成的业务告警
///
/// 只包含来自分析结果的数据，不带生成时间，以保证同一结果派生出相同的告警。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub module_id: String,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    /// 告警关联的实体（活动、offer 等）
    pub entity: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl AlertRecord {
    pub fn new(
        module_id: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            severity,
            title: title.into(),
            message: message.into(),
            entity: None,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Pie,
    Table,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub values: Vec<f64>,
}

/// 与渲染器无关的图表描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart_id: String,
    pub chart_type: ChartType,
    pub title: String,
    pub labels: Vec<String>,
    pub series: Vec<ChartSeries>,
}

impl ChartSpec {
    pub fn new(chart_id: impl Into<String>, chart_type: ChartType, title: impl Into<String>) -> Self {
        Self {
            chart_id: chart_id.into(),
            chart_type,
            title: title.into(),
            labels: Vec::new(),
            series: Vec::new(),
        }
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_series(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.series.push(ChartSeries {
            name: name.into(),
            values,
        });
        self
    }
}
