//! Day-before reminders for class sessions and scheduled makeups.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::store::Store,
    error::AppResult,
    models::{
        class::{ClassStatus, ScheduleStatus},
        makeup::MakeupRequest,
    },
    services::{
        batch::FailSoft,
        dedup::{class_reminder_key, makeup_reminder_key, SendGuard},
        metrics::{JOB_RUNS_COUNTER, REMINDERS_COUNTER},
        notifications::{self, Dispatch, Notice, Notifier},
        Lifecycle,
    },
};

pub const JOB_NAME: &str = "send-reminders";

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSummary {
    pub class_reminders: usize,
    pub makeup_reminders: usize,
    /// Sends already claimed by an earlier or concurrent run, or not made
    /// because LINE is not configured.
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl ReminderSummary {
    pub fn sent_count(&self) -> usize {
        self.class_reminders + self.makeup_reminders
    }
}

enum Delivery {
    Sent,
    AlreadyClaimed,
    NotConfigured,
}

pub async fn run<S, N, G>(ctx: &Lifecycle<'_, S, N>, guard: &G) -> AppResult<ReminderSummary>
where
    S: Store,
    N: Notifier,
    G: SendGuard,
{
    let result = dispatch(ctx, guard).await;
    let outcome = match &result {
        Ok(summary) if summary.errors.is_empty() => "ok",
        Ok(_) => "partial",
        Err(_) => "failed",
    };
    JOB_RUNS_COUNTER.with_label_values(&[JOB_NAME, outcome]).inc();
    result
}

async fn dispatch<S, N, G>(ctx: &Lifecycle<'_, S, N>, guard: &G) -> AppResult<ReminderSummary>
where
    S: Store,
    N: Notifier,
    G: SendGuard,
{
    let (date, from, to) = ctx.calendar.tomorrow(ctx.now());
    let mut summary = ReminderSummary::default();
    let mut soft = FailSoft::new(JOB_NAME);

    // ── Regular sessions ─────────────────────────────────────────────────────
    let classes = ctx
        .store
        .list_classes_by_status(&[ClassStatus::Started])
        .await?;

    for class in &classes {
        let Some(schedules) = soft.record(
            format!("class {}", class.id),
            ctx.store.list_schedules_between(class.id, from, to).await,
        ) else {
            continue;
        };
        let schedules: Vec<_> = schedules
            .into_iter()
            .filter(|s| s.status == ScheduleStatus::Scheduled)
            .collect();
        if schedules.is_empty() {
            continue;
        }

        let Some(enrollments) = soft.record(
            format!("enrollments of class {}", class.id),
            ctx.store.list_active_enrollments(class.id).await,
        ) else {
            continue;
        };

        for schedule in &schedules {
            for enrollment in &enrollments {
                let notice = Notice::ClassReminder {
                    student_name: enrollment.student_name.clone(),
                    class_name: class.name.clone(),
                    session_number: schedule.session_number,
                    session_date: ctx.calendar.format_date(schedule.session_date),
                    start_time: schedule.start_time.clone(),
                    end_time: schedule.end_time.clone(),
                };
                let key = class_reminder_key(schedule.id, enrollment.student_id);
                let label = format!(
                    "class reminder for student {} on schedule {}",
                    enrollment.student_id, schedule.id
                );
                match soft.record(
                    label,
                    deliver(ctx, guard, &key, enrollment.parent_id, &notice).await,
                ) {
                    Some(Delivery::Sent) => summary.class_reminders += 1,
                    Some(Delivery::AlreadyClaimed | Delivery::NotConfigured) => {
                        summary.skipped += 1
                    }
                    None => {}
                }
            }
        }
    }

    // ── Makeup sessions ──────────────────────────────────────────────────────
    let makeups = ctx.store.list_scheduled_makeups_on(date).await?;
    let mut class_names: HashMap<Uuid, String> = HashMap::new();

    for makeup in &makeups {
        let Some(schedule) = makeup.makeup_schedule.clone() else {
            continue;
        };
        let notice = Notice::MakeupReminder {
            student_name: student_name(ctx, makeup).await,
            class_name: class_name(ctx, &mut class_names, makeup.original_class_id).await,
            schedule,
        };
        let key = makeup_reminder_key(makeup.id, date);
        match soft.record(
            format!("makeup reminder {}", makeup.id),
            deliver(ctx, guard, &key, makeup.parent_id, &notice).await,
        ) {
            Some(Delivery::Sent) => summary.makeup_reminders += 1,
            Some(Delivery::AlreadyClaimed | Delivery::NotConfigured) => summary.skipped += 1,
            None => {}
        }
    }

    summary.errors = soft.into_errors();
    tracing::info!(
        "{} for {}: {} class, {} makeup, {} skipped, {} error(s)",
        JOB_NAME,
        date,
        summary.class_reminders,
        summary.makeup_reminders,
        summary.skipped,
        summary.errors.len()
    );
    Ok(summary)
}

/// Claims `key`, sends, and gives the claim back unless the notice left the
/// process. A claim store outage does not block the send.
async fn deliver<S, N, G>(
    ctx: &Lifecycle<'_, S, N>,
    guard: &G,
    key: &str,
    parent_id: Uuid,
    notice: &Notice,
) -> AppResult<Delivery>
where
    S: Store,
    N: Notifier,
    G: SendGuard,
{
    let claimed = match guard.claim(key).await {
        Ok(true) => true,
        Ok(false) => {
            REMINDERS_COUNTER
                .with_label_values(&[notice.kind(), "skipped"])
                .inc();
            return Ok(Delivery::AlreadyClaimed);
        }
        Err(e) => {
            tracing::warn!("reminder claim {} unavailable, sending anyway: {}", key, e);
            false
        }
    };

    let result = notifications::notify_parent(ctx.store, ctx.notifier, parent_id, notice).await;
    let outcome = match &result {
        Ok(Dispatch::Delivered) => "sent",
        Ok(Dispatch::Skipped) => "unconfigured",
        Err(_) => "failed",
    };
    REMINDERS_COUNTER
        .with_label_values(&[notice.kind(), outcome])
        .inc();

    match result {
        Ok(Dispatch::Delivered) => Ok(Delivery::Sent),
        other => {
            if claimed {
                if let Err(release_err) = guard.release(key).await {
                    tracing::warn!("reminder claim {} not released: {}", key, release_err);
                }
            }
            other.map(|_| Delivery::NotConfigured)
        }
    }
}

async fn student_name<S, N>(ctx: &Lifecycle<'_, S, N>, makeup: &MakeupRequest) -> String
where
    S: Store,
{
    match ctx
        .store
        .find_active_enrollment(makeup.student_id, makeup.original_class_id)
        .await
    {
        Ok(Some(enrollment)) => enrollment.student_name,
        Ok(None) => makeup.student_id.to_string(),
        Err(e) => {
            tracing::warn!("student name for makeup {} unavailable: {}", makeup.id, e);
            makeup.student_id.to_string()
        }
    }
}

async fn class_name<S, N>(
    ctx: &Lifecycle<'_, S, N>,
    cache: &mut HashMap<Uuid, String>,
    class_id: Uuid,
) -> String
where
    S: Store,
{
    if let Some(name) = cache.get(&class_id) {
        return name.clone();
    }
    let name = match ctx.store.get_class(class_id).await {
        Ok(Some(class)) => class.name,
        Ok(None) => String::new(),
        Err(e) => {
            tracing::warn!("class name for {} unavailable: {}", class_id, e);
            String::new()
        }
    };
    cache.insert(class_id, name.clone());
    name
}
