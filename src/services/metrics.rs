use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge_vec, CounterVec, GaugeVec};
use tracing::{info, warn};

use crate::db::PgStore;
use crate::error::AppResult;

lazy_static! {
    // ── Event counters (increment on each event) ────────────────────────────
    pub static ref LEAVE_REQUESTS_COUNTER: CounterVec = register_counter_vec!(
        "api_leave_requests_total",
        "Leave create/cancel calls by action and outcome",
        &["action", "outcome"]
    ).unwrap();

    pub static ref MAKEUP_TRANSITIONS_COUNTER: CounterVec = register_counter_vec!(
        "api_makeup_transitions_total",
        "Makeup request status transitions by target status",
        &["status"]
    ).unwrap();

    pub static ref CLASS_TRANSITIONS_COUNTER: CounterVec = register_counter_vec!(
        "jobs_class_transitions_total",
        "Class status transitions made by the reconciler",
        &["status"]
    ).unwrap();

    pub static ref REMINDERS_COUNTER: CounterVec = register_counter_vec!(
        "jobs_reminders_total",
        "Reminder sends by kind and outcome",
        &["kind", "outcome"]
    ).unwrap();

    pub static ref JOB_RUNS_COUNTER: CounterVec = register_counter_vec!(
        "jobs_runs_total",
        "Periodic job invocations by job and outcome",
        &["job", "outcome"]
    ).unwrap();

    // ── Business metrics ────────────────────────────────────────────────────
    pub static ref MAKEUP_GAUGE: GaugeVec = register_gauge_vec!(
        "makeup_requests_total",
        "Makeup requests by status",
        &["status"]
    ).unwrap();
}

/// Spawn the background metrics collector (refreshes every 5 minutes).
pub fn start(store: PgStore) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = collect(&store).await {
                warn!("Metrics: collection failed: {}", e);
            }
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
        }
    });
}

async fn collect(store: &PgStore) -> AppResult<()> {
    let counts = store.count_makeups_by_status().await?;
    for (status, count) in &counts {
        MAKEUP_GAUGE.with_label_values(&[status.as_str()]).set(*count as f64);
    }
    info!("Metrics: collected makeup counts for {} status(es)", counts.len());
    Ok(())
}
