// Periodic removal of expired cache entries and closed rate windows
// Author: kelexine (https://github.com/kelexine)

use super::models::SweepReport;
use super::service::GovernedGenerationService;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Run one sweep over both stores.
///
/// Safe alongside live traffic: an expired cache entry can no longer be
/// served and a closed window is replaced on the next hit anyway.
pub async fn sweep_once(service: &GovernedGenerationService) -> Result<SweepReport> {
    let cache_entries_removed = service.cache().clear_expired().await?;
    let rate_limit_entries_removed = service.limiter().sweep_expired().await?;

    let report = SweepReport {
        cache_entries_removed,
        rate_limit_entries_removed,
    };
    info!(
        cache_entries = report.cache_entries_removed,
        rate_limit_entries = report.rate_limit_entries_removed,
        "Maintenance sweep complete"
    );
    Ok(report)
}

/// Sweep every `period` until the returned handle is aborted.
/// A failed sweep is logged and the loop keeps going.
pub fn spawn_sweeper(service: Arc<GovernedGenerationService>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = sweep_once(&service).await {
                warn!(error = %e, "Maintenance sweep failed");
            }
        }
    })
}
