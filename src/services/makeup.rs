use chrono::NaiveTime;
use uuid::Uuid;

use crate::{
    db::store::Store,
    error::{AppError, AppResult},
    models::{
        auth::AuthenticatedUser,
        makeup::{MakeupRequest, MakeupSchedule, MakeupTransition},
    },
    services::{
        metrics::MAKEUP_TRANSITIONS_COUNTER,
        notifications::{self, Dispatch, Notice, Notifier},
        Lifecycle,
    },
};

fn require_staff(actor: &AuthenticatedUser) -> AppResult<()> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn parse_time(value: &str, field: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| AppError::Validation(format!("{field} must be HH:MM")))
}

/// Result of a staff test send: the rendered text, and whether it reached LINE.
#[derive(Debug, Clone)]
pub struct TestNotice {
    pub delivered: bool,
    pub preview: String,
}

pub struct MakeupService;

impl MakeupService {
    pub async fn get<S, N>(
        ctx: &Lifecycle<'_, S, N>,
        actor: &AuthenticatedUser,
        id: Uuid,
    ) -> AppResult<MakeupRequest>
    where
        S: Store,
    {
        let makeup = ctx
            .store
            .get_makeup(id)
            .await?
            .ok_or(AppError::not_found("makeup"))?;
        if !actor.is_staff() && makeup.parent_id != actor.user_id {
            return Err(AppError::Forbidden);
        }
        Ok(makeup)
    }

    pub async fn list_for_student<S, N>(
        ctx: &Lifecycle<'_, S, N>,
        actor: &AuthenticatedUser,
        student_id: Uuid,
    ) -> AppResult<Vec<MakeupRequest>>
    where
        S: Store,
    {
        require_staff(actor)?;
        ctx.store.list_makeups_for_student(student_id).await
    }

    /// `pending → scheduled`: attaches the makeup slot and tells the parent.
    pub async fn schedule<S, N>(
        ctx: &Lifecycle<'_, S, N>,
        actor: &AuthenticatedUser,
        id: Uuid,
        schedule: MakeupSchedule,
    ) -> AppResult<MakeupRequest>
    where
        S: Store,
        N: Notifier,
    {
        require_staff(actor)?;

        let start = parse_time(&schedule.start_time, "startTime")?;
        let end = parse_time(&schedule.end_time, "endTime")?;
        if start >= end {
            return Err(AppError::Validation("startTime must be before endTime".into()));
        }

        let now = ctx.now();
        if schedule.date < ctx.calendar.date_of(now) {
            return Err(AppError::PastDate);
        }

        let schedule = MakeupSchedule {
            date: schedule.date,
            start_time: start.format("%H:%M").to_string(),
            end_time: end.format("%H:%M").to_string(),
        };
        let makeup = Self::apply(ctx, id, MakeupTransition::Schedule { schedule, at: now }).await?;

        let notice = Self::notice_for(ctx, &makeup).await;
        if let Err(e) =
            notifications::notify_parent(ctx.store, ctx.notifier, makeup.parent_id, &notice).await
        {
            tracing::warn!("makeup {} scheduled but parent not notified: {}", makeup.id, e);
        }

        Ok(makeup)
    }

    /// `scheduled → completed`. Completion is never time-driven; staff (or an
    /// external job) mark it explicitly.
    pub async fn complete<S, N>(
        ctx: &Lifecycle<'_, S, N>,
        actor: &AuthenticatedUser,
        id: Uuid,
    ) -> AppResult<MakeupRequest>
    where
        S: Store,
    {
        require_staff(actor)?;
        Self::apply(ctx, id, MakeupTransition::Complete { at: ctx.now() }).await
    }

    /// `pending → cancelled`, keeping the record (staff withdrawal).
    pub async fn cancel<S, N>(
        ctx: &Lifecycle<'_, S, N>,
        actor: &AuthenticatedUser,
        id: Uuid,
        reason: Option<String>,
    ) -> AppResult<MakeupRequest>
    where
        S: Store,
    {
        require_staff(actor)?;
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        Self::apply(ctx, id, MakeupTransition::Cancel { reason, at: ctx.now() }).await
    }

    /// Renders the parent-facing notice for `makeup_id` and pushes it as a test,
    /// either to `line_user_id` or to the owning parent. Returns the text sent.
    pub async fn send_test_notice<S, N>(
        ctx: &Lifecycle<'_, S, N>,
        actor: &AuthenticatedUser,
        makeup_id: Uuid,
        line_user_id: Option<String>,
    ) -> AppResult<TestNotice>
    where
        S: Store,
        N: Notifier,
    {
        require_staff(actor)?;
        let makeup = ctx
            .store
            .get_makeup(makeup_id)
            .await?
            .ok_or(AppError::not_found("makeup"))?;

        let notice = Notice::Test(Box::new(Self::notice_for(ctx, &makeup).await));
        let dispatch = match line_user_id.filter(|id| !id.trim().is_empty()) {
            Some(recipient) => ctx.notifier.push(recipient.trim(), &notice).await?,
            None => {
                notifications::notify_parent(ctx.store, ctx.notifier, makeup.parent_id, &notice)
                    .await?
            }
        };

        let delivered = dispatch == Dispatch::Delivered;
        if delivered {
            tracing::info!("test notice for makeup {} sent by {}", makeup_id, actor.user_id);
        } else {
            tracing::info!("test notice for makeup {} rendered only, LINE not configured", makeup_id);
        }
        Ok(TestNotice {
            delivered,
            preview: notice.text(),
        })
    }

    async fn apply<S, N>(
        ctx: &Lifecycle<'_, S, N>,
        id: Uuid,
        transition: MakeupTransition,
    ) -> AppResult<MakeupRequest>
    where
        S: Store,
    {
        if let Some(updated) = ctx.store.transition_makeup(id, &transition).await? {
            MAKEUP_TRANSITIONS_COUNTER
                .with_label_values(&[transition.target().as_str()])
                .inc();
            tracing::info!("makeup {} is now {}", id, updated.status);
            return Ok(updated);
        }

        match ctx.store.get_makeup(id).await? {
            None => Err(AppError::not_found("makeup")),
            Some(current) => Err(AppError::InvalidState(format!(
                "makeup {id} cannot move from {} to {}",
                current.status,
                transition.target()
            ))),
        }
    }

    /// The notice a parent should see for the request's current state.
    async fn notice_for<S, N>(ctx: &Lifecycle<'_, S, N>, makeup: &MakeupRequest) -> Notice
    where
        S: Store,
    {
        let class_name = match ctx.store.get_class(makeup.original_class_id).await {
            Ok(Some(class)) => class.name,
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!("class name for makeup {} unavailable: {}", makeup.id, e);
                String::new()
            }
        };
        let student_name = match ctx
            .store
            .find_active_enrollment(makeup.student_id, makeup.original_class_id)
            .await
        {
            Ok(Some(enrollment)) => enrollment.student_name,
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!("student name for makeup {} unavailable: {}", makeup.id, e);
                String::new()
            }
        };

        match &makeup.makeup_schedule {
            Some(schedule) => Notice::MakeupScheduled {
                student_name,
                class_name,
                schedule: schedule.clone(),
            },
            None => Notice::LeaveRecorded {
                student_name,
                class_name,
                session_number: makeup.original_session_number,
                session_date: ctx.calendar.format_date(makeup.original_session_date),
            },
        }
    }
}
