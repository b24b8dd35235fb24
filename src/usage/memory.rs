// In-process usage ledger driven by plan configuration
// Author: kelexine (https://github.com/kelexine)

use super::{PlanLimit, UsageLedger};
use crate::config::PlansConfig;
use crate::error::StoreError;
use crate::utils::clock::Clock;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Counts generations per user and calendar month (UTC).
///
/// Tier assignments come from [`PlansConfig`] and can be changed at runtime
/// with [`MemoryUsageLedger::assign_tier`]. User ids and tier names are
/// matched case-insensitively, since the config loader lowercases map keys.
/// Only the current month is kept; counts roll over on the first access of
/// a new month.
pub struct MemoryUsageLedger {
    plans: RwLock<PlansConfig>,
    clock: Arc<dyn Clock>,
    usage: Mutex<MonthlyUsage>,
}

#[derive(Default)]
struct MonthlyUsage {
    period: String,
    counts: HashMap<String, u64>,
}

impl MonthlyUsage {
    fn roll_to(&mut self, period: String) -> &mut HashMap<String, u64> {
        if self.period != period {
            if !self.counts.is_empty() {
                debug!(from = %self.period, to = %period, users = self.counts.len(), "Usage period rolled over");
            }
            self.counts.clear();
            self.period = period;
        }
        &mut self.counts
    }
}

impl MemoryUsageLedger {
    pub fn new(mut plans: PlansConfig, clock: Arc<dyn Clock>) -> Self {
        plans.assignments = plans
            .assignments
            .into_iter()
            .map(|(user, tier)| (user.to_lowercase(), tier))
            .collect();
        plans.tiers = plans
            .tiers
            .into_iter()
            .map(|(tier, limit)| (tier.to_lowercase(), limit))
            .collect();

        Self {
            plans: RwLock::new(plans),
            clock,
            usage: Mutex::new(MonthlyUsage::default()),
        }
    }

    pub fn assign_tier(&self, user_id: &str, tier: impl Into<String>) {
        self.plans
            .write()
            .assignments
            .insert(user_id.to_lowercase(), tier.into());
    }

    fn period(&self) -> String {
        self.clock.now().format("%Y-%m").to_string()
    }
}

#[async_trait]
impl UsageLedger for MemoryUsageLedger {
    async fn plan_limit(&self, user_id: &str) -> Result<PlanLimit, StoreError> {
        let plans = self.plans.read();
        let tier = plans
            .assignments
            .get(&user_id.to_lowercase())
            .unwrap_or(&plans.default_tier)
            .to_lowercase();

        if plans.unlimited_tiers.iter().any(|t| t.eq_ignore_ascii_case(&tier)) {
            return Ok(PlanLimit::Unlimited);
        }

        match plans.tiers.get(&tier) {
            Some(limit) => Ok(PlanLimit::Monthly(*limit)),
            None => {
                debug!(tier = %tier, "Tier has no configured ceiling, treating as unlimited");
                Ok(PlanLimit::Unlimited)
            }
        }
    }

    async fn current_usage(&self, user_id: &str) -> Result<u64, StoreError> {
        let period = self.period();
        let mut usage = self.usage.lock();
        Ok(usage.roll_to(period).get(user_id).copied().unwrap_or(0))
    }

    async fn increment_usage(&self, user_id: &str) -> Result<(), StoreError> {
        let period = self.period();
        let mut usage = self.usage.lock();
        *usage.roll_to(period).entry(user_id.to_string()).or_insert(0) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_tiers_and_assignments() {
        let ledger = MemoryUsageLedger::new(PlansConfig::default(), Arc::new(ManualClock::default()));

        assert_eq!(ledger.plan_limit("nobody").await.unwrap(), PlanLimit::Monthly(5));
        ledger.assign_tier("pro-user", "professional");
        assert_eq!(ledger.plan_limit("pro-user").await.unwrap(), PlanLimit::Monthly(200));
        ledger.assign_tier("big", "agency");
        assert_eq!(ledger.plan_limit("big").await.unwrap(), PlanLimit::Unlimited);
    }

    #[tokio::test]
    async fn test_usage_resets_each_month() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 31, 23, 0, 0).unwrap());
        let ledger = MemoryUsageLedger::new(PlansConfig::default(), Arc::new(clock.clone()));

        ledger.increment_usage("u1").await.unwrap();
        ledger.increment_usage("u1").await.unwrap();
        assert_eq!(ledger.current_usage("u1").await.unwrap(), 2);

        clock.advance(chrono::Duration::hours(2));
        assert_eq!(ledger.current_usage("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_past_months_are_dropped() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap());
        let ledger = MemoryUsageLedger::new(PlansConfig::default(), Arc::new(clock.clone()));

        for user in ["a", "b", "c"] {
            ledger.increment_usage(user).await.unwrap();
        }
        assert_eq!(ledger.usage.lock().counts.len(), 3);

        clock.advance(chrono::Duration::days(31));
        ledger.increment_usage("a").await.unwrap();

        let usage = ledger.usage.lock();
        assert_eq!(usage.period, "2026-02");
        assert_eq!(usage.counts.len(), 1);
        assert_eq!(usage.counts.get("a"), Some(&1));
    }

    #[tokio::test]
    async fn test_loaded_assignments_match_mixed_case_ids() {
        use crate::config::AppConfig;
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[plans.assignments]
AliceSmith = "agency"
CarolW = "Professional"
"#
        )
        .unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        let ledger = MemoryUsageLedger::new(config.plans, Arc::new(ManualClock::default()));

        assert_eq!(ledger.plan_limit("AliceSmith").await.unwrap(), PlanLimit::Unlimited);
        assert_eq!(ledger.plan_limit("CarolW").await.unwrap(), PlanLimit::Monthly(200));
        assert_eq!(ledger.plan_limit("DaveK").await.unwrap(), PlanLimit::Monthly(5));
    }

    #[tokio::test]
    async fn test_assignments_ignore_user_id_case() {
        let mut plans = PlansConfig::default();
        plans.assignments.insert("AliceSmith".to_string(), "Agency".to_string());
        let ledger = MemoryUsageLedger::new(plans, Arc::new(ManualClock::default()));

        assert_eq!(ledger.plan_limit("AliceSmith").await.unwrap(), PlanLimit::Unlimited);

        ledger.assign_tier("BobJones", "starter");
        assert_eq!(ledger.plan_limit("bobjones").await.unwrap(), PlanLimit::Monthly(50));
        assert_eq!(ledger.plan_limit("BOBJONES").await.unwrap(), PlanLimit::Monthly(50));
    }
}
