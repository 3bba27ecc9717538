use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sale::{Sale, SaleStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintSale {
    pub description: String,
    pub date: DateTime<Utc>,
}

impl FingerprintSale {
    /// Stored sales are always pending: only valid sales are fingerprinted.
    pub fn to_sale(&self) -> Sale {
        Sale::new(self.description.clone(), SaleStatus::Pending, Some(self.date))
    }
}

/// Canonical change-detection record persisted per fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub id: String,
    #[serde(rename = "match")]
    pub match_label: String,
    pub sales: Vec<FingerprintSale>,
}

impl Fingerprint {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
