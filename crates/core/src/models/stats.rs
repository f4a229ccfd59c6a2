use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 活动按天聚合的统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignDailyStat {
    pub campaign_id: i64,
    pub campaign_name: String,
    pub date: NaiveDate,
    pub clicks: i64,
    pub leads: i64,
    pub approved_leads: i64,
    pub cost: f64,
    pub revenue: f64,
}

/// Offer 按天聚合的统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferDailyStat {
    pub offer_id: i64,
    pub offer_name: String,
    pub date: NaiveDate,
    pub clicks: i64,
    pub leads: i64,
    pub approved_leads: i64,
    pub revenue: f64,
}

/// 一段时间内的累计值
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatTotals {
    pub clicks: i64,
    pub leads: i64,
    pub approved_leads: i64,
    pub cost: f64,
    pub revenue: f64,
}

impl StatTotals {
    pub fn add_campaign(&mut self, stat: &CampaignDailyStat) {
        self.clicks += stat.clicks;
        self.leads += stat.leads;
        self.approved_leads += stat.approved_leads;
        self.cost += stat.cost;
        self.revenue += stat.revenue;
    }

    pub fn add_offer(&mut self, stat: &OfferDailyStat) {
        self.clicks += stat.clicks;
        self.leads += stat.leads;
        self.approved_leads += stat.approved_leads;
        self.revenue += stat.revenue;
    }

    /// ROI 百分比，花费为0时无意义
    pub fn roi(&self) -> Option<f64> {
        (self.cost > 0.0).then(|| (self.revenue - self.cost) / self.cost * 100.0)
    }

    /// 转化率百分比（线索/点击）
    pub fn cr(&self) -> Option<f64> {
        (self.clicks > 0).then(|| self.leads as f64 / self.clicks as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_ratios() {
        let totals = StatTotals {
            clicks: 200,
            leads: 10,
            approved_leads: 4,
            cost: 100.0,
            revenue: 150.0,
        };
        assert_eq!(totals.roi(), Some(50.0));
        assert_eq!(totals.cr(), Some(5.0));
        assert_eq!(StatTotals::default().roi(), None);
        assert_eq!(StatTotals::default().cr(), None);
    }
}
