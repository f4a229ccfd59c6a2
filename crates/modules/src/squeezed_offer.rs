//! 被压量的 offer
//!
//! 比较最近窗口与前一个等长窗口的转化率，转化率下降超过阈值的 offer 视为被广告主压量。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use analytics_core::{
    models::{
        AlertRecord, AnalysisOutput, ChartSpec, ChartType, ModuleConfig, ModuleMetadata,
        ModulePriority, Severity,
    },
    traits::{AnalysisContext, AnalysisModule, ParamMetadata},
    AnalyticsResult,
};

use crate::common::{aggregate_offers, round2};

pub const MODULE_ID: &str = "squeezed_offer";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SqueezedOfferRow {
    offer_id: i64,
    offer_name: String,
    previous_cr: f64,
    recent_cr: f64,
    drop_percent: f64,
    recent_clicks: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SqueezedOfferSummary {
    total_found: usize,
    offers_checked: usize,
    days: i64,
    drop_threshold: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SqueezedOfferOutput {
    offers: Vec<SqueezedOfferRow>,
    summary: SqueezedOfferSummary,
}

impl SqueezedOfferOutput {
    fn parse(raw: &AnalysisOutput) -> AnalyticsResult<Self> {
        Ok(serde_json::from_value(raw.clone())?)
    }
}

#[derive(Debug, Default)]
pub struct SqueezedOffer;

pub fn create() -> Arc<dyn AnalysisModule> {
    Arc::new(SqueezedOffer)
}

#[async_trait]
impl AnalysisModule for SqueezedOffer {
    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata::new(MODULE_ID, "Squeezed Offer", "offers")
            .with_description("转化率明显下降的 offer")
            .with_priority(ModulePriority::Medium)
            .with_tags(["offers", "cr"])
    }

    fn default_config(&self) -> ModuleConfig {
        ModuleConfig::default()
            .with_schedule("0 9 * * *")
            .with_param("days", 7)
            .with_param("drop_threshold", 30.0)
            .with_param("min_clicks", 100)
    }

    fn param_metadata(&self) -> BTreeMap<String, ParamMetadata> {
        BTreeMap::from([
            (
                "days".to_string(),
                ParamMetadata::int("窗口天数", "最近窗口和对比窗口的长度")
                    .range(1.0, 30.0)
                    .step(1.0),
            ),
            (
                "drop_threshold".to_string(),
                ParamMetadata::float("下降阈值 (%)", "转化率相对下降超过该百分比时报告")
                    .range(1.0, 100.0)
                    .step(1.0),
            ),
            (
                "min_clicks".to_string(),
                ParamMetadata::int("最少点击", "两个窗口的点击数都达到该值才比较")
                    .range(0.0, 100_000.0)
                    .step(10.0),
            ),
        ])
    }

    async fn analyze(&self, ctx: &AnalysisContext) -> AnalyticsResult<AnalysisOutput> {
        let days = ctx.int_param("days", 7).max(1);
        let drop_threshold = ctx.float_param("drop_threshold", 30.0);
        let min_clicks = ctx.int_param("min_clicks", 100);

        let (recent_start, today) = ctx.window(days)?;
        let (previous_start, _) = ctx.window(days.saturating_mul(2))?;
        let stats = ctx.store.get_offer_stats(previous_start, today).await?;

        let previous = aggregate_offers(stats.iter().filter(|s| s.date < recent_start));
        let recent = aggregate_offers(stats.iter().filter(|s| s.date >= recent_start));

        let mut offers_checked = 0;
        let mut offers: Vec<SqueezedOfferRow> = Vec::new();
        for (offer_id, (offer_name, recent_totals)) in &recent {
            let Some((_, previous_totals)) = previous.get(offer_id) else {
                continue;
            };
            if recent_totals.clicks < min_clicks || previous_totals.clicks < min_clicks {
                continue;
            }
            let (Some(previous_cr), Some(recent_cr)) = (previous_totals.cr(), recent_totals.cr())
            else {
                continue;
            };
            offers_checked += 1;
            if previous_cr <= 0.0 {
                continue;
            }

            let drop_percent = (previous_cr - recent_cr) / previous_cr * 100.0;
            if drop_percent >= drop_threshold {
                offers.push(SqueezedOfferRow {
                    offer_id: *offer_id,
                    offer_name: offer_name.clone(),
                    previous_cr: round2(previous_cr),
                    recent_cr: round2(recent_cr),
                    drop_percent: round2(drop_percent),
                    recent_clicks: recent_totals.clicks,
                });
            }
        }
        offers.sort_by(|a, b| b.drop_percent.total_cmp(&a.drop_percent));

        let output = SqueezedOfferOutput {
            summary: SqueezedOfferSummary {
                total_found: offers.len(),
                offers_checked,
                days,
                drop_threshold,
            },
            offers,
        };
        Ok(serde_json::to_value(output)?)
    }

    fn generate_alerts(&self, raw: &AnalysisOutput) -> AnalyticsResult<Vec<AlertRecord>> {
        let output = SqueezedOfferOutput::parse(raw)?;
        let threshold = output.summary.drop_threshold;

        Ok(output
            .offers
            .iter()
            .map(|offer| {
                let severity = if threshold > 0.0 && offer.drop_percent >= threshold * 2.0 {
                    Severity::Critical
                } else {
                    Severity::High
                };
                AlertRecord::new(
                    MODULE_ID,
                    severity,
                    "Offer 转化率下降",
                    format!(
                        "{} 的转化率从 {:.2}% 降到 {:.2}%（下降 {:.1}%）",
                        offer.offer_name, offer.previous_cr, offer.recent_cr, offer.drop_percent
                    ),
                )
                .with_entity(format!("offer:{}", offer.offer_id))
                .with_data(json!({
                    "previous_cr": offer.previous_cr,
                    "recent_cr": offer.recent_cr,
                    "drop_percent": offer.drop_percent,
                }))
            })
            .collect())
    }

    fn generate_recommendations(&self, raw: &AnalysisOutput) -> AnalyticsResult<Vec<String>> {
        let output = SqueezedOfferOutput::parse(raw)?;
        Ok(output
            .offers
            .iter()
            .take(3)
            .map(|offer| format!("考虑把 {} 的流量切换到备用 offer", offer.offer_name))
            .collect())
    }

    fn prepare_chart_data(&self, raw: &AnalysisOutput) -> AnalyticsResult<Vec<ChartSpec>> {
        let output = SqueezedOfferOutput::parse(raw)?;
        if output.offers.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![ChartSpec::new("squeezed_offer_cr", ChartType::Bar, "转化率对比")
            .with_labels(output.offers.iter().map(|o| o.offer_name.clone()).collect())
            .with_series("previous_cr", output.offers.iter().map(|o| o.previous_cr).collect())
            .with_series("recent_cr", output.offers.iter().map(|o| o.recent_cr).collect())])
    }
}
