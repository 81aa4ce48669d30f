//! Time-driven class status transitions.
//!
//! `published → started` once the start date is reached, and
//! `started → completed` once the end date's school day is over and every
//! non-cancelled session has begun. Each transition is compare-and-set on the
//! status read at the top of the run, so repeated runs are no-ops.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    db::store::Store,
    error::AppResult,
    models::class::{Class, ClassStatus, ScheduleStatus, SYSTEM_CRON},
    services::{
        batch::FailSoft,
        metrics::{CLASS_TRANSITIONS_COUNTER, JOB_RUNS_COUNTER},
        Lifecycle,
    },
};

pub const JOB_NAME: &str = "update-class-status";

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub classes_checked: usize,
    pub classes_completed: usize,
    pub classes_started: usize,
    pub errors: Vec<String>,
}

pub async fn run<S, N>(ctx: &Lifecycle<'_, S, N>) -> AppResult<ReconcileSummary>
where
    S: Store,
{
    let result = reconcile(ctx).await;
    let outcome = match &result {
        Ok(summary) if summary.errors.is_empty() => "ok",
        Ok(_) => "partial",
        Err(_) => "failed",
    };
    JOB_RUNS_COUNTER.with_label_values(&[JOB_NAME, outcome]).inc();
    result
}

async fn reconcile<S, N>(ctx: &Lifecycle<'_, S, N>) -> AppResult<ReconcileSummary>
where
    S: Store,
{
    let now = ctx.now();
    let classes = ctx
        .store
        .list_classes_by_status(&[ClassStatus::Published, ClassStatus::Started])
        .await?;

    let mut summary = ReconcileSummary {
        classes_checked: classes.len(),
        ..Default::default()
    };
    let mut soft = FailSoft::new(JOB_NAME);

    for class in &classes {
        let label = format!("class {}", class.id);
        match class.status {
            ClassStatus::Started => {
                if let Some(true) = soft.record(&label, try_complete(ctx, class, now).await) {
                    summary.classes_completed += 1;
                }
            }
            ClassStatus::Published if class.start_date <= now => {
                let moved = ctx
                    .store
                    .transition_class(
                        class.id,
                        ClassStatus::Published,
                        ClassStatus::Started,
                        now,
                        SYSTEM_CRON,
                    )
                    .await;
                if let Some(true) = soft.record(&label, moved) {
                    CLASS_TRANSITIONS_COUNTER
                        .with_label_values(&[ClassStatus::Started.as_str()])
                        .inc();
                    tracing::info!("class {} ({}) started", class.id, class.name);
                    summary.classes_started += 1;
                }
            }
            _ => {}
        }
    }

    summary.errors = soft.into_errors();
    tracing::info!(
        "{}: checked {}, started {}, completed {}, {} error(s)",
        JOB_NAME,
        summary.classes_checked,
        summary.classes_started,
        summary.classes_completed,
        summary.errors.len()
    );
    Ok(summary)
}

/// Completes a started class when its last day is over and no live session
/// is still ahead. Returns whether this run made the transition.
async fn try_complete<S, N>(
    ctx: &Lifecycle<'_, S, N>,
    class: &Class,
    now: DateTime<Utc>,
) -> AppResult<bool>
where
    S: Store,
{
    if now < ctx.calendar.end_of_day(class.end_date) {
        return Ok(false);
    }

    let schedules = ctx.store.list_schedules(class.id).await?;
    let pending = schedules
        .iter()
        .filter(|s| s.status != ScheduleStatus::Cancelled)
        .any(|s| s.session_date > now);
    if pending {
        tracing::debug!("class {} past end date but has upcoming sessions", class.id);
        return Ok(false);
    }

    let moved = ctx
        .store
        .transition_class(
            class.id,
            ClassStatus::Started,
            ClassStatus::Completed,
            now,
            SYSTEM_CRON,
        )
        .await?;
    if moved {
        CLASS_TRANSITIONS_COUNTER
            .with_label_values(&[ClassStatus::Completed.as_str()])
            .inc();
        tracing::info!("class {} ({}) completed", class.id, class.name);
    }
    Ok(moved)
}
