use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::store::ScheduleRepository,
    error::{AppError, AppResult},
    models::{
        attendance::{AttendanceRecord, AttendanceStatus, RecordAttendanceRequest},
        auth::AuthenticatedUser,
        class::Schedule,
    },
    services::Lifecycle,
};

const MAX_NOTE_CHARS: usize = 500;

pub struct AttendanceService;

impl AttendanceService {
    /// Manual attendance check by staff; replaces any earlier entry for the student.
    pub async fn record<S, N>(
        ctx: &Lifecycle<'_, S, N>,
        actor: &AuthenticatedUser,
        class_id: Uuid,
        schedule_id: Uuid,
        req: RecordAttendanceRequest,
    ) -> AppResult<Schedule>
    where
        S: ScheduleRepository,
    {
        if !actor.is_staff() {
            return Err(AppError::Forbidden);
        }

        let note = req.note.as_deref().unwrap_or("").trim().to_string();
        if note.chars().count() > MAX_NOTE_CHARS {
            return Err(AppError::Validation(format!(
                "note must be at most {MAX_NOTE_CHARS} characters"
            )));
        }

        let record = AttendanceRecord {
            student_id: req.student_id,
            status: req.status,
            note,
            checked_at: ctx.now(),
            checked_by: actor.user_id.to_string(),
        };
        ctx.store
            .upsert_attendance(class_id, schedule_id, record)
            .await?;

        ctx.store
            .get_schedule(class_id, schedule_id)
            .await?
            .ok_or(AppError::not_found("schedule"))
    }

    /// Marks the student absent after a leave request. Failure is logged only.
    pub async fn mark_absent_best_effort<S: ScheduleRepository>(
        store: &S,
        class_id: Uuid,
        schedule_id: Uuid,
        student_id: Uuid,
        note: &str,
        at: DateTime<Utc>,
        by: &str,
    ) {
        let record = AttendanceRecord {
            student_id,
            status: AttendanceStatus::Absent,
            note: note.to_string(),
            checked_at: at,
            checked_by: by.to_string(),
        };
        if let Err(e) = store.upsert_attendance(class_id, schedule_id, record).await {
            tracing::warn!(
                "attendance sync failed (mark absent) for student {} on schedule {}: {}",
                student_id,
                schedule_id,
                e
            );
        }
    }

    /// Drops the student's entry after a leave is cancelled. Failure is logged only.
    pub async fn clear_best_effort<S: ScheduleRepository>(
        store: &S,
        class_id: Uuid,
        schedule_id: Uuid,
        student_id: Uuid,
    ) {
        match store.remove_attendance(class_id, schedule_id, student_id).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(
                "no attendance entry for student {} on schedule {}",
                student_id,
                schedule_id
            ),
            Err(e) => tracing::warn!(
                "attendance sync failed (clear) for student {} on schedule {}: {}",
                student_id,
                schedule_id,
                e
            ),
        }
    }
}
