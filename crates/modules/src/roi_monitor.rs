//! ROI 监控
//!
//! 统计窗口期内花费达到下限的活动的 ROI，低于告警线的活动按严重程度分级。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use analytics_core::{
    models::{
        AlertRecord, AnalysisOutput, ChartSpec, ChartType, ModuleConfig, ModuleMetadata,
        ModulePriority, Severity, StatTotals,
    },
    traits::{AnalysisContext, AnalysisModule, ParamMetadata, SeverityMetadata, SeverityThreshold},
    AnalyticsResult,
};

use crate::common::{aggregate_campaigns, round2};

pub const MODULE_ID: &str = "roi_monitor";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RoiLevel {
    Critical,
    #[default]
    Warning,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RoiCampaign {
    campaign_id: i64,
    campaign_name: String,
    cost: f64,
    revenue: f64,
    roi: f64,
    level: RoiLevel,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RoiSummary {
    total_found: usize,
    critical_count: usize,
    campaigns_checked: usize,
    total_cost: f64,
    total_revenue: f64,
    overall_roi: Option<f64>,
    days: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RoiOutput {
    campaigns: Vec<RoiCampaign>,
    summary: RoiSummary,
}

impl RoiOutput {
    fn parse(raw: &AnalysisOutput) -> AnalyticsResult<Self> {
        Ok(serde_json::from_value(raw.clone())?)
    }
}

#[derive(Debug, Default)]
pub struct RoiMonitor;

pub fn create() -> Arc<dyn AnalysisModule> {
    Arc::new(RoiMonitor)
}

#[async_trait]
impl AnalysisModule for RoiMonitor {
    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata::new(MODULE_ID, "ROI Monitor", "profitability")
            .with_description("ROI 低于告警线的活动")
            .with_priority(ModulePriority::High)
            .with_tags(["roi", "cost"])
    }

    fn default_config(&self) -> ModuleConfig {
        ModuleConfig::default()
            .with_schedule("0 */4 * * *")
            .with_cache_ttl(900)
            .with_param("days", 7)
            .with_param("min_spend", 50.0)
            .with_param("critical_roi", -50.0)
            .with_param("warning_roi", -20.0)
    }

    fn param_metadata(&self) -> BTreeMap<String, ParamMetadata> {
        BTreeMap::from([
            (
                "days".to_string(),
                ParamMetadata::int("分析天数", "统计窗口的天数（含今天）")
                    .range(1.0, 90.0)
                    .step(1.0),
            ),
            (
                "min_spend".to_string(),
                ParamMetadata::float("最低花费", "花费低于该值的活动不参与判断")
                    .range(0.0, 1_000_000.0)
                    .step(10.0),
            ),
            (
                "critical_roi".to_string(),
                ParamMetadata::float("严重 ROI (%)", "ROI 不高于该值时为严重")
                    .range(-100.0, 0.0)
                    .step(5.0),
            ),
            (
                "warning_roi".to_string(),
                ParamMetadata::float("警告 ROI (%)", "ROI 不高于该值时为警告")
                    .range(-100.0, 100.0)
                    .step(5.0),
            ),
        ])
    }

    fn severity_metadata(&self) -> Option<SeverityMetadata> {
        Some(BTreeMap::from([
            (
                Severity::Critical,
                SeverityThreshold::new("critical_roi", "严重", "ROI 不高于 critical_roi"),
            ),
            (
                Severity::High,
                SeverityThreshold::new("warning_roi", "警告", "ROI 不高于 warning_roi"),
            ),
        ]))
    }

    async fn analyze(&self, ctx: &AnalysisContext) -> AnalyticsResult<AnalysisOutput> {
        let days = ctx.int_param("days", 7);
        let min_spend = ctx.float_param("min_spend", 50.0);
        let critical_roi = ctx.float_param("critical_roi", -50.0);
        let warning_roi = ctx.float_param("warning_roi", -20.0);
        let (from, to) = ctx.window(days)?;

        let stats = ctx.store.get_campaign_stats(from, to).await?;
        debug!("{}: 读取 {} 行活动统计", MODULE_ID, stats.len());

        let mut overall = StatTotals::default();
        let mut campaigns_checked = 0;
        let mut campaigns = Vec::new();
        for (campaign_id, (campaign_name, totals)) in aggregate_campaigns(&stats) {
            if totals.cost < min_spend {
                continue;
            }
            let Some(roi) = totals.roi() else {
                continue;
            };
            campaigns_checked += 1;
            overall.cost += totals.cost;
            overall.revenue += totals.revenue;

            let level = if roi <= critical_roi {
                RoiLevel::Critical
            } else if roi <= warning_roi {
                RoiLevel::Warning
            } else {
                continue;
            };
            campaigns.push(RoiCampaign {
                campaign_id,
                campaign_name,
                cost: round2(totals.cost),
                revenue: round2(totals.revenue),
                roi: round2(roi),
                level,
            });
        }
        campaigns.sort_by(|a, b| a.roi.total_cmp(&b.roi));

        let output = RoiOutput {
            summary: RoiSummary {
                total_found: campaigns.len(),
                critical_count: campaigns
                    .iter()
                    .filter(|c| c.level == RoiLevel::Critical)
                    .count(),
                campaigns_checked,
                total_cost: round2(overall.cost),
                total_revenue: round2(overall.revenue),
                overall_roi: overall.roi().map(round2),
                days,
            },
            campaigns,
        };
        Ok(serde_json::to_value(output)?)
    }

    fn generate_alerts(&self, raw: &AnalysisOutput) -> AnalyticsResult<Vec<AlertRecord>> {
        let output = RoiOutput::parse(raw)?;

        Ok(output
            .campaigns
            .iter()
            .map(|campaign| {
                let severity = match campaign.level {
                    RoiLevel::Critical => Severity::Critical,
                    RoiLevel::Warning => Severity::High,
                };
                AlertRecord::new(
                    MODULE_ID,
                    severity,
                    "ROI 过低",
                    format!(
                        "活动 {} 的 ROI 为 {:.1}%（花费 {:.2}，收入 {:.2}）",
                        campaign.campaign_name, campaign.roi, campaign.cost, campaign.revenue
                    ),
                )
                .with_entity(format!("campaign:{}", campaign.campaign_id))
                .with_data(json!({"roi": campaign.roi, "cost": campaign.cost}))
            })
            .collect())
    }

    fn generate_recommendations(&self, raw: &AnalysisOutput) -> AnalyticsResult<Vec<String>> {
        let output = RoiOutput::parse(raw)?;
        let mut recommendations = Vec::new();
        if output.summary.critical_count > 0 {
            recommendations.push(format!(
                "暂停或降低 {} 个严重亏损活动的预算",
                output.summary.critical_count
            ));
        }
        if output.summary.total_found > output.summary.critical_count {
            recommendations.push("复查警告活动的定向和出价".to_string());
        }
        Ok(recommendations)
    }

    fn prepare_chart_data(&self, raw: &AnalysisOutput) -> AnalyticsResult<Vec<ChartSpec>> {
        let output = RoiOutput::parse(raw)?;
        if output.campaigns.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![ChartSpec::new("roi_by_campaign", ChartType::Bar, "活动 ROI (%)")
            .with_labels(
                output
                    .campaigns
                    .iter()
                    .map(|c| c.campaign_name.clone())
                    .collect(),
            )
            .with_series("roi", output.campaigns.iter().map(|c| c.roi).collect())])
    }
}
