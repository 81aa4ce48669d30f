//! Parent/staff leave requests: the entry and exit of the `pending` state.
//!
//! A leave request creates a `pending` makeup request and marks the student
//! absent on the excused session; cancelling it deletes the request and the
//! absence again. The attendance write is secondary: when it fails the leave
//! record still stands and the failure is only logged.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::store::Store,
    error::{AppError, AppResult},
    models::{
        auth::AuthenticatedUser,
        class::ScheduleStatus,
        makeup::{
            CancelLeaveBody, LeaveRequestBody, MakeupRequest, MakeupStatus, MakeupType,
            NewMakeupRequest, RequestedBy,
        },
        user::UserRole,
    },
    services::{
        attendance::AttendanceService,
        metrics::LEAVE_REQUESTS_COUNTER,
        notifications::{self, Notice, Notifier},
        Lifecycle,
    },
};

const MAX_REASON_CHARS: usize = 500;

/// A session can still be excused (or un-excused) only while it starts
/// strictly after `now`. A session starting exactly now counts as elapsed.
pub fn is_upcoming(session_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    session_date > now
}

fn required_id(value: Option<&str>, field: &str) -> AppResult<Uuid> {
    let raw = value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{field} is required")))?;
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("{field} is not a valid id")))
}

pub struct LeaveService;

impl LeaveService {
    /// Records a leave for one session and opens a `pending` makeup request.
    pub async fn create<S, N>(
        ctx: &Lifecycle<'_, S, N>,
        actor: &AuthenticatedUser,
        body: LeaveRequestBody,
    ) -> AppResult<MakeupRequest>
    where
        S: Store,
        N: Notifier,
    {
        let result = Self::create_inner(ctx, actor, body).await;
        let outcome = if result.is_ok() { "created" } else { "rejected" };
        LEAVE_REQUESTS_COUNTER
            .with_label_values(&["create", outcome])
            .inc();
        result
    }

    async fn create_inner<S, N>(
        ctx: &Lifecycle<'_, S, N>,
        actor: &AuthenticatedUser,
        body: LeaveRequestBody,
    ) -> AppResult<MakeupRequest>
    where
        S: Store,
        N: Notifier,
    {
        let student_id = required_id(body.student_id.as_deref(), "studentId")?;
        let class_id = required_id(body.class_id.as_deref(), "classId")?;
        let schedule_id = required_id(body.schedule_id.as_deref(), "scheduleId")?;
        let kind = match body.kind.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => raw
                .parse::<MakeupType>()
                .map_err(|_| AppError::Validation(format!("unknown type: {raw}")))?,
            None => MakeupType::Scheduled,
        };
        let reason = body.reason.as_deref().unwrap_or("").trim().to_string();
        if reason.chars().count() > MAX_REASON_CHARS {
            return Err(AppError::Validation(format!(
                "reason must be at most {MAX_REASON_CHARS} characters"
            )));
        }

        let enrollment = ctx
            .store
            .find_active_enrollment(student_id, class_id)
            .await?
            .ok_or(AppError::not_found("enrollment"))?;

        if actor.role == UserRole::Parent && enrollment.parent_id != actor.user_id {
            return Err(AppError::Forbidden);
        }

        let schedule = ctx
            .store
            .get_schedule(class_id, schedule_id)
            .await?
            .ok_or(AppError::not_found("schedule"))?;

        if schedule.status == ScheduleStatus::Cancelled {
            return Err(AppError::InvalidState(format!(
                "schedule {schedule_id} is cancelled"
            )));
        }

        let now = ctx.now();
        if !is_upcoming(schedule.session_date, now) {
            return Err(AppError::PastDate);
        }

        if ctx
            .store
            .find_active_makeup(student_id, class_id, schedule_id)
            .await?
            .is_some()
        {
            return Err(AppError::DuplicateRequest);
        }

        let requested_by = match actor.role {
            UserRole::Parent => RequestedBy::Parent,
            _ => RequestedBy::Staff,
        };

        // The unique index rejects a concurrent twin that slipped past the check above.
        let makeup = ctx
            .store
            .insert_makeup(NewMakeupRequest {
                kind,
                original_class_id: class_id,
                original_schedule_id: schedule_id,
                student_id,
                parent_id: enrollment.parent_id,
                requested_by,
                reason: reason.clone(),
                original_session_number: schedule.session_number,
                original_session_date: schedule.session_date,
                requested_at: now,
            })
            .await?;

        tracing::info!(
            "leave recorded: makeup {} for student {} on class {} session #{}",
            makeup.id,
            student_id,
            class_id,
            schedule.session_number
        );

        AttendanceService::mark_absent_best_effort(
            ctx.store,
            class_id,
            schedule_id,
            student_id,
            &reason,
            now,
            &actor.user_id.to_string(),
        )
        .await;

        let class_name = match ctx.store.get_class(class_id).await {
            Ok(Some(class)) => class.name,
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!("class {} unavailable for leave confirmation: {}", class_id, e);
                String::new()
            }
        };
        let notice = Notice::LeaveRecorded {
            student_name: enrollment.student_name,
            class_name,
            session_number: schedule.session_number,
            session_date: ctx.calendar.format_date(schedule.session_date),
        };
        if let Err(e) =
            notifications::notify_parent(ctx.store, ctx.notifier, makeup.parent_id, &notice).await
        {
            tracing::warn!("leave confirmation for makeup {} not sent: {}", makeup.id, e);
        }

        Ok(makeup)
    }

    /// Withdraws a `pending` leave: deletes the request and the absence entry.
    pub async fn cancel<S, N>(
        ctx: &Lifecycle<'_, S, N>,
        actor: &AuthenticatedUser,
        body: CancelLeaveBody,
    ) -> AppResult<()>
    where
        S: Store,
    {
        let result = Self::cancel_inner(ctx, actor, body).await;
        let outcome = if result.is_ok() { "cancelled" } else { "rejected" };
        LEAVE_REQUESTS_COUNTER
            .with_label_values(&["cancel", outcome])
            .inc();
        result
    }

    async fn cancel_inner<S, N>(
        ctx: &Lifecycle<'_, S, N>,
        actor: &AuthenticatedUser,
        body: CancelLeaveBody,
    ) -> AppResult<()>
    where
        S: Store,
    {
        let makeup_id = required_id(body.makeup_id.as_deref(), "makeupId")?;
        let student_id = required_id(body.student_id.as_deref(), "studentId")?;
        let class_id = required_id(body.class_id.as_deref(), "classId")?;
        let schedule_id = required_id(body.schedule_id.as_deref(), "scheduleId")?;

        // Cancelled leaves are hard-deleted, so a missing request means it is
        // no longer pending.
        let makeup = ctx.store.get_makeup(makeup_id).await?.ok_or_else(|| {
            AppError::InvalidState(format!("makeup {makeup_id} is not pending"))
        })?;

        if actor.role == UserRole::Parent && makeup.parent_id != actor.user_id {
            return Err(AppError::Forbidden);
        }

        if makeup.student_id != student_id
            || makeup.original_class_id != class_id
            || makeup.original_schedule_id != schedule_id
        {
            return Err(AppError::Validation(
                "makeup request does not match student, class and schedule".into(),
            ));
        }

        if makeup.status != MakeupStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "makeup {makeup_id} is {}",
                makeup.status
            )));
        }

        if !is_upcoming(makeup.original_session_date, ctx.now()) {
            return Err(AppError::PastDate);
        }

        if !ctx.store.delete_pending_makeup(makeup_id).await? {
            return Err(AppError::InvalidState(format!(
                "makeup {makeup_id} changed while cancelling"
            )));
        }

        tracing::info!(
            "leave cancelled: makeup {} for student {} on schedule {}",
            makeup_id,
            student_id,
            schedule_id
        );

        AttendanceService::clear_best_effort(ctx.store, class_id, schedule_id, student_id).await;

        Ok(())
    }
}
