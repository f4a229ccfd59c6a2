//! Test data builders for daily statistics

use chrono::NaiveDate;

use analytics_core::models::{CampaignDailyStat, OfferDailyStat};

/// Builder for creating test CampaignDailyStat entities
pub struct CampaignStatBuilder {
    stat: CampaignDailyStat,
}

impl CampaignStatBuilder {
    pub fn new(campaign_id: i64, date: NaiveDate) -> Self {
        Self {
            stat: CampaignDailyStat {
                campaign_id,
                campaign_name: format!("Campaign {campaign_id}"),
                date,
                clicks: 0,
                leads: 0,
                approved_leads: 0,
                cost: 0.0,
                revenue: 0.0,
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.stat.campaign_name = name.to_string();
        self
    }

    pub fn with_clicks(mut self, clicks: i64) -> Self {
        self.stat.clicks = clicks;
        self
    }

    pub fn with_leads(mut self, leads: i64, approved_leads: i64) -> Self {
        self.stat.leads = leads;
        self.stat.approved_leads = approved_leads;
        self
    }

    pub fn with_money(mut self, cost: f64, revenue: f64) -> Self {
        self.stat.cost = cost;
        self.stat.revenue = revenue;
        self
    }

    pub fn build(self) -> CampaignDailyStat {
        self.stat
    }
}

/// Builder for creating test OfferDailyStat entities
pub struct OfferStatBuilder {
    stat: OfferDailyStat,
}

impl OfferStatBuilder {
    pub fn new(offer_id: i64, date: NaiveDate) -> Self {
        Self {
            stat: OfferDailyStat {
                offer_id,
                offer_name: format!("Offer {offer_id}"),
                date,
                clicks: 0,
                leads: 0,
                approved_leads: 0,
                revenue: 0.0,
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.stat.offer_name = name.to_string();
        self
    }

    pub fn with_traffic(mut self, clicks: i64, leads: i64) -> Self {
        self.stat.clicks = clicks;
        self.stat.leads = leads;
        self
    }

    pub fn with_approved(mut self, approved_leads: i64, revenue: f64) -> Self {
        self.stat.approved_leads = approved_leads;
        self.stat.revenue = revenue;
        self
    }

    pub fn build(self) -> OfferDailyStat {
        self.stat
    }
}

/// 从 `end` 往前数 `days_ago` 天的日期
pub fn days_before(end: NaiveDate, days_ago: i64) -> NaiveDate {
    end - chrono::Duration::days(days_ago)
}
