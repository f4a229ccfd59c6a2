use std::collections::BTreeMap;

use analytics_core::models::{CampaignDailyStat, OfferDailyStat, StatTotals};

/// 按实体汇总的统计：id -> (名称, 累计值)
pub type EntityTotals = BTreeMap<i64, (String, StatTotals)>;

pub fn aggregate_campaigns(stats: &[CampaignDailyStat]) -> EntityTotals {
    let mut totals = EntityTotals::new();
    for stat in stats {
        totals
            .entry(stat.campaign_id)
            .or_insert_with(|| (stat.campaign_name.clone(), StatTotals::default()))
            .1
            .add_campaign(stat);
    }
    totals
}

pub fn aggregate_offers<'a>(stats: impl IntoIterator<Item = &'a OfferDailyStat>) -> EntityTotals {
    let mut totals = EntityTotals::new();
    for stat in stats {
        totals
            .entry(stat.offer_id)
            .or_insert_with(|| (stat.offer_name.clone(), StatTotals::default()))
            .1
            .add_offer(stat);
    }
    totals
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_aggregate_campaigns_sums_days() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let stat = |id: i64, leads: i64| CampaignDailyStat {
            campaign_id: id,
            campaign_name: format!("c{id}"),
            date,
            clicks: 10,
            leads,
            approved_leads: 0,
            cost: 1.5,
            revenue: 0.0,
        };
        let totals = aggregate_campaigns(&[stat(1, 2), stat(1, 3), stat(2, 1)]);

        assert_eq!(totals.len(), 2);
        assert_eq!(totals[&1].1.leads, 5);
        assert_eq!(totals[&1].1.cost, 3.0);
        assert_eq!(round2(2.0 / 3.0), 0.67);
    }
}
