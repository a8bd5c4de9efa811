use std::sync::Arc;
use activa_core::ActivityService;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::metrics::Metrics;

/// Periodically recomputes `available_slots` from the booking table so a
/// counter that drifted (manual edits, partial restores) converges again.
pub async fn start_reconciliation_worker(
    catalog: Arc<ActivityService>,
    metrics: Arc<Metrics>,
    period: Duration,
) {
    info!("Slot reconciliation worker started, running every {:?}", period);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        reconcile_once(&catalog, &metrics).await;
    }
}

/// One pass. Returns the number of activities corrected.
pub async fn reconcile_once(catalog: &ActivityService, metrics: &Metrics) -> usize {
    match catalog.reconcile_slots().await {
        Ok(corrections) => {
            metrics.slot_corrections.inc_by(corrections.len() as u64);
            if !corrections.is_empty() {
                info!("Reconciliation corrected {} activities", corrections.len());
            }
            corrections.len()
        }
        Err(e) => {
            error!("Slot reconciliation failed: {}", e);
            0
        }
    }
}
