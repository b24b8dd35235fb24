//! Cache entry, request type and statistics models.

// Author: kelexine (https://github.com/kelexine)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Operation tag that namespaces cache keys, so identical content submitted
/// to different operations never collides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    GenerateAll,
    Audit,
    LeadScore,
    ListingDescription,
    SocialPost,
    EmailCampaign,
    MarketReport,
}

impl RequestType {
    pub const ALL: [RequestType; 7] = [
        RequestType::GenerateAll,
        RequestType::Audit,
        RequestType::LeadScore,
        RequestType::ListingDescription,
        RequestType::SocialPost,
        RequestType::EmailCampaign,
        RequestType::MarketReport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::GenerateAll => "generate_all",
            RequestType::Audit => "audit",
            RequestType::LeadScore => "lead_score",
            RequestType::ListingDescription => "listing_description",
            RequestType::SocialPost => "social_post",
            RequestType::EmailCampaign => "email_campaign",
            RequestType::MarketReport => "market_report",
        }
    }

    /// Whether the generator is asked for a JSON object rather than prose.
    pub fn expects_structured_output(&self) -> bool {
        matches!(
            self,
            RequestType::GenerateAll
                | RequestType::Audit
                | RequestType::LeadScore
                | RequestType::MarketReport
        )
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown request type '{}'", s))
    }
}

/// One cached generation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// `"<request_type>:<digest prefix>"`.
    pub cache_key: String,
    pub request_type: RequestType,
    /// Digest of the trimmed raw content. Kept for auditing, never used for lookup.
    pub content_hash: String,
    pub response_data: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: u64,
}

impl CacheEntry {
    /// An entry is served only while `expires_at` is strictly in the future.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Raw totals over unexpired entries, as reported by a store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheTotals {
    pub entries: u64,
    pub total_hits: u64,
}

/// Statistics over unexpired cache entries.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub total_hits: u64,
    pub average_hits_per_entry: f64,
    /// `hits / (hits + entries)`; every entry stands for at least one miss.
    pub approximate_hit_rate: f64,
}

impl From<CacheTotals> for CacheStats {
    fn from(totals: CacheTotals) -> Self {
        let entries = totals.entries as f64;
        let hits = totals.total_hits as f64;
        Self {
            entries: totals.entries,
            total_hits: totals.total_hits,
            average_hits_per_entry: if totals.entries == 0 { 0.0 } else { hits / entries },
            approximate_hit_rate: if totals.entries + totals.total_hits == 0 {
                0.0
            } else {
                hits / (hits + entries)
            },
        }
    }
}
