//! Subscription usage accounting.
//!
//! The governed service reads a caller's plan ceiling and current usage
//! before doing any expensive work, and bumps the counter after each
//! freshly generated (non-cached) response. The ledger is authoritative;
//! its values are never cached across requests.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod memory;

pub use memory::MemoryUsageLedger;

use crate::error::StoreError;
use async_trait::async_trait;
use serde::Serialize;

/// Monthly generation ceiling of a subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "limit")]
pub enum PlanLimit {
    Unlimited,
    Monthly(u64),
}

impl PlanLimit {
    /// Whether `used` generations already exhaust this ceiling.
    pub fn is_reached(&self, used: u64) -> bool {
        match self {
            PlanLimit::Unlimited => false,
            PlanLimit::Monthly(limit) => used >= *limit,
        }
    }
}

/// Per-user usage counters and plan ceilings.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    async fn plan_limit(&self, user_id: &str) -> Result<PlanLimit, StoreError>;

    /// Generations counted for `user_id` in the current billing period.
    async fn current_usage(&self, user_id: &str) -> Result<u64, StoreError>;

    async fn increment_usage(&self, user_id: &str) -> Result<(), StoreError>;
}
