//! 零批准告警
//!
//! 找出窗口期内线索数达到阈值、但一个批准都没有的活动。
//! 通常意味着 offer 被暂停、postback 配置错误或流量被判为作弊。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use analytics_core::{
    models::{
        AlertRecord, AnalysisOutput, ChartSpec, ChartType, ModuleConfig, ModuleMetadata,
        ModulePriority, Severity,
    },
    traits::{AnalysisContext, AnalysisModule, ParamMetadata},
    AnalyticsResult,
};

use crate::common::{aggregate_campaigns, round2};

pub const MODULE_ID: &str = "zero_approval_alert";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ZeroApprovalCampaign {
    campaign_id: i64,
    campaign_name: String,
    clicks: i64,
    leads: i64,
    cost: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ZeroApprovalSummary {
    total_found: usize,
    total_leads: i64,
    total_cost: f64,
    days: i64,
    min_leads: i64,
    period_start: String,
    period_end: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ZeroApprovalOutput {
    campaigns: Vec<ZeroApprovalCampaign>,
    summary: ZeroApprovalSummary,
}

impl ZeroApprovalOutput {
    fn parse(raw: &AnalysisOutput) -> AnalyticsResult<Self> {
        Ok(serde_json::from_value(raw.clone())?)
    }
}

#[derive(Debug, Default)]
pub struct ZeroApprovalAlert;

pub fn create() -> Arc<dyn AnalysisModule> {
    Arc::new(ZeroApprovalAlert)
}

#[async_trait]
impl AnalysisModule for ZeroApprovalAlert {
    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata::new(MODULE_ID, "Zero Approval Alert", "conversion")
            .with_description("有线索但没有批准的活动")
            .with_detailed_description(
                "统计窗口期内每个活动的线索和批准数。线索数不少于 min_leads 且批准数为0的活动\
                 会被列出，线索越多严重级别越高。",
            )
            .with_priority(ModulePriority::High)
            .with_tags(["leads", "approval"])
    }

    fn default_config(&self) -> ModuleConfig {
        ModuleConfig::default()
            .with_cache_ttl(1800)
            .with_param("min_leads", 10)
            .with_param("days", 3)
    }

    fn param_metadata(&self) -> BTreeMap<String, ParamMetadata> {
        BTreeMap::from([
            (
                "min_leads".to_string(),
                ParamMetadata::int("最少线索数", "线索数达到该值才检查批准情况")
                    .range(1.0, 1000.0)
                    .step(1.0),
            ),
            (
                "days".to_string(),
                ParamMetadata::int("分析天数", "统计窗口的天数（含今天）")
                    .range(1.0, 30.0)
                    .step(1.0),
            ),
        ])
    }

    async fn analyze(&self, ctx: &AnalysisContext) -> AnalyticsResult<AnalysisOutput> {
        let min_leads = ctx.int_param("min_leads", 10);
        let days = ctx.int_param("days", 3);
        let (from, to) = ctx.window(days)?;

        let stats = ctx.store.get_campaign_stats(from, to).await?;
        debug!("{}: 读取 {} 行活动统计", MODULE_ID, stats.len());

        let campaigns: Vec<ZeroApprovalCampaign> = aggregate_campaigns(&stats)
            .into_iter()
            .filter(|(_, (_, totals))| totals.leads >= min_leads && totals.approved_leads == 0)
            .map(|(campaign_id, (campaign_name, totals))| ZeroApprovalCampaign {
                campaign_id,
                campaign_name,
                clicks: totals.clicks,
                leads: totals.leads,
                cost: round2(totals.cost),
            })
            .collect();

        let output = ZeroApprovalOutput {
            summary: ZeroApprovalSummary {
                total_found: campaigns.len(),
                total_leads: campaigns.iter().map(|c| c.leads).sum(),
                total_cost: round2(campaigns.iter().map(|c| c.cost).sum()),
                days,
                min_leads,
                period_start: from.to_string(),
                period_end: to.to_string(),
            },
            campaigns,
        };
        Ok(serde_json::to_value(output)?)
    }

    fn generate_alerts(&self, raw: &AnalysisOutput) -> AnalyticsResult<Vec<AlertRecord>> {
        let output = ZeroApprovalOutput::parse(raw)?;
        let min_leads = output.summary.min_leads.max(1);

        Ok(output
            .campaigns
            .iter()
            .map(|campaign| {
                let severity = if campaign.leads >= min_leads * 3 {
                    Severity::Critical
                } else {
                    Severity::High
                };
                AlertRecord::new(
                    MODULE_ID,
                    severity,
                    "线索没有批准",
                    format!(
                        "活动 {} 在 {} 天内产生 {} 个线索，批准数为0，花费 {:.2}",
                        campaign.campaign_name,
                        output.summary.days,
                        campaign.leads,
                        campaign.cost
                    ),
                )
                .with_entity(format!("campaign:{}", campaign.campaign_id))
                .with_data(json!({"leads": campaign.leads, "cost": campaign.cost}))
            })
            .collect())
    }

    fn generate_recommendations(&self, raw: &AnalysisOutput) -> AnalyticsResult<Vec<String>> {
        let output = ZeroApprovalOutput::parse(raw)?;
        if output.campaigns.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![
            "检查相关 offer 是否被暂停以及 postback 是否正常".to_string(),
            format!(
                "与广告主确认 {} 个活动的线索状态",
                output.summary.total_found
            ),
        ])
    }

    fn prepare_chart_data(&self, raw: &AnalysisOutput) -> AnalyticsResult<Vec<ChartSpec>> {
        let output = ZeroApprovalOutput::parse(raw)?;
        if output.campaigns.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![ChartSpec::new(
            "zero_approval_leads",
            ChartType::Bar,
            "无批准活动的线索数",
        )
        .with_labels(
            output
                .campaigns
                .iter()
                .map(|c| c.campaign_name.clone())
                .collect(),
        )
        .with_series("leads", output.campaigns.iter().map(|c| c.leads as f64).collect())])
    }
}
