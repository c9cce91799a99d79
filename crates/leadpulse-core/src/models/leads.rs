use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score bands used on the dashboard.
const HOT_THRESHOLD: f64 = 75.0;
const WARM_THRESHOLD: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadTier {
    Hot,
    Warm,
    Cold,
}

impl LeadTier {
    pub fn from_score(score: f64) -> Self {
        if score >= HOT_THRESHOLD {
            LeadTier::Hot
        } else if score >= WARM_THRESHOLD {
            LeadTier::Warm
        } else {
            LeadTier::Cold
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub lead_id: String,
    pub company_name: String,
    pub score: f64,
    pub scored_at: DateTime<Utc>,
}

impl ScoreResult {
    pub fn tier(&self) -> LeadTier {
        LeadTier::from_score(self.score)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geolocation {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// Buyer-intent filter, both ends inclusive, on a 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRange {
    pub min: u8,
    pub max: u8,
}

impl Default for IntentRange {
    fn default() -> Self {
        Self { min: 0, max: 100 }
    }
}

impl IntentRange {
    pub fn contains(&self, intent: u8) -> bool {
        (self.min..=self.max).contains(&intent)
    }
}
