//! PostgreSQL implementation of the repository traits.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::db::store::{
    ClassRepository, EnrollmentRepository, MakeupRepository, ParentRepository, ScheduleRepository,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    attendance::{self, AttendanceRecord},
    class::{Class, ClassStatus, Schedule},
    enrollment::Enrollment,
    makeup::{MakeupRequest, MakeupSchedule, MakeupTransition, NewMakeupRequest},
    parent::Parent,
};

const CLASS_COLUMNS: &str = "id, name, status, start_date, end_date, \
     started_at, started_by, completed_at, completed_by";

const SCHEDULE_COLUMNS: &str = "id, class_id, session_number, session_date, \
     start_time, end_time, status, attendance";

const ENROLLMENT_COLUMNS: &str =
    "id, class_id, student_id, student_name, parent_id, status, enrolled_at";

const MAKEUP_COLUMNS: &str = "id, makeup_type, original_class_id, original_schedule_id, \
     student_id, parent_id, status, requested_by, reason, original_session_number, \
     original_session_date, makeup_date, makeup_start_time, makeup_end_time, \
     scheduled_at, completed_at, cancelled_at, cancel_reason, request_date, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Request counts grouped by status, for the metrics collector.
    pub async fn count_makeups_by_status(&self) -> AppResult<Vec<(String, i64)>> {
        let rows = sqlx::query_as(
            "SELECT status, COUNT(*)::BIGINT FROM makeup_classes GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Row types (statuses are TEXT columns, parsed into enums on the way out)
// ---------------------------------------------------------------------------

fn parse_text<T>(value: &str, column: &str) -> AppResult<T>
where
    T: std::str::FromStr<Err = anyhow::Error>,
{
    value
        .parse()
        .map_err(|e| AppError::Upstream(format!("invalid {column} in database: {e}")))
}

#[derive(Debug, FromRow)]
struct ClassRow {
    id: Uuid,
    name: String,
    status: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    started_by: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    completed_by: Option<String>,
}

impl TryFrom<ClassRow> for Class {
    type Error = AppError;

    fn try_from(row: ClassRow) -> AppResult<Self> {
        Ok(Class {
            id: row.id,
            name: row.name,
            status: parse_text(&row.status, "classes.status")?,
            start_date: row.start_date,
            end_date: row.end_date,
            started_at: row.started_at,
            started_by: row.started_by,
            completed_at: row.completed_at,
            completed_by: row.completed_by,
        })
    }
}

#[derive(Debug, FromRow)]
struct ScheduleRow {
    id: Uuid,
    class_id: Uuid,
    session_number: i32,
    session_date: DateTime<Utc>,
    start_time: Option<String>,
    end_time: Option<String>,
    status: String,
    attendance: Json<Vec<AttendanceRecord>>,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = AppError;

    fn try_from(row: ScheduleRow) -> AppResult<Self> {
        Ok(Schedule {
            id: row.id,
            class_id: row.class_id,
            session_number: row.session_number,
            session_date: row.session_date,
            start_time: row.start_time,
            end_time: row.end_time,
            status: parse_text(&row.status, "class_schedules.status")?,
            attendance: row.attendance.0,
        })
    }
}

#[derive(Debug, FromRow)]
struct EnrollmentRow {
    id: Uuid,
    class_id: Uuid,
    student_id: Uuid,
    student_name: String,
    parent_id: Uuid,
    status: String,
    enrolled_at: DateTime<Utc>,
}

impl TryFrom<EnrollmentRow> for Enrollment {
    type Error = AppError;

    fn try_from(row: EnrollmentRow) -> AppResult<Self> {
        Ok(Enrollment {
            id: row.id,
            class_id: row.class_id,
            student_id: row.student_id,
            student_name: row.student_name,
            parent_id: row.parent_id,
            status: parse_text(&row.status, "enrollments.status")?,
            enrolled_at: row.enrolled_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MakeupRow {
    id: Uuid,
    makeup_type: String,
    original_class_id: Uuid,
    original_schedule_id: Uuid,
    student_id: Uuid,
    parent_id: Uuid,
    status: String,
    requested_by: String,
    reason: String,
    original_session_number: i32,
    original_session_date: DateTime<Utc>,
    makeup_date: Option<NaiveDate>,
    makeup_start_time: Option<String>,
    makeup_end_time: Option<String>,
    scheduled_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    request_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MakeupRow> for MakeupRequest {
    type Error = AppError;

    fn try_from(row: MakeupRow) -> AppResult<Self> {
        let makeup_schedule = match (row.makeup_date, row.makeup_start_time, row.makeup_end_time) {
            (Some(date), Some(start_time), Some(end_time)) => Some(MakeupSchedule {
                date,
                start_time,
                end_time,
            }),
            _ => None,
        };

        Ok(MakeupRequest {
            id: row.id,
            kind: parse_text(&row.makeup_type, "makeup_classes.makeup_type")?,
            original_class_id: row.original_class_id,
            original_schedule_id: row.original_schedule_id,
            student_id: row.student_id,
            parent_id: row.parent_id,
            status: parse_text(&row.status, "makeup_classes.status")?,
            requested_by: parse_text(&row.requested_by, "makeup_classes.requested_by")?,
            reason: row.reason,
            original_session_number: row.original_session_number,
            original_session_date: row.original_session_date,
            makeup_schedule,
            created_at: row.created_at,
            request_date: row.request_date,
            scheduled_at: row.scheduled_at,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
            cancel_reason: row.cancel_reason,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> AppResult<Vec<T>>
where
    T: TryFrom<R, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ---------------------------------------------------------------------------
// Classes
// ---------------------------------------------------------------------------

impl ClassRepository for PgStore {
    async fn get_class(&self, id: Uuid) -> AppResult<Option<Class>> {
        let row = sqlx::query_as::<_, ClassRow>(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Class::try_from).transpose()
    }

    async fn list_classes_by_status(&self, statuses: &[ClassStatus]) -> AppResult<Vec<Class>> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query_as::<_, ClassRow>(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes WHERE status = ANY($1) ORDER BY start_date"
        ))
        .bind(statuses)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn transition_class(
        &self,
        id: Uuid,
        from: ClassStatus,
        to: ClassStatus,
        at: DateTime<Utc>,
        by: &str,
    ) -> AppResult<bool> {
        let stamp = match to {
            ClassStatus::Started => "started_at = $4, started_by = $5,",
            ClassStatus::Completed => "completed_at = $4, completed_by = $5,",
            _ => "",
        };
        let sql = if stamp.is_empty() {
            "UPDATE classes SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $2"
                .to_string()
        } else {
            format!(
                "UPDATE classes SET status = $3, {stamp} updated_at = NOW() \
                 WHERE id = $1 AND status = $2"
            )
        };

        let mut query = sqlx::query(&sql).bind(id).bind(from.as_str()).bind(to.as_str());
        if !stamp.is_empty() {
            query = query.bind(at).bind(by);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }
}

// ---------------------------------------------------------------------------
// Sessions and attendance
// ---------------------------------------------------------------------------

impl ScheduleRepository for PgStore {
    async fn get_schedule(&self, class_id: Uuid, schedule_id: Uuid) -> AppResult<Option<Schedule>> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM class_schedules WHERE id = $1 AND class_id = $2"
        ))
        .bind(schedule_id)
        .bind(class_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Schedule::try_from).transpose()
    }

    async fn list_schedules(&self, class_id: Uuid) -> AppResult<Vec<Schedule>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM class_schedules
             WHERE class_id = $1
             ORDER BY session_date"
        ))
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn list_schedules_between(
        &self,
        class_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Schedule>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM class_schedules
             WHERE class_id = $1 AND session_date >= $2 AND session_date < $3
             ORDER BY session_date"
        ))
        .bind(class_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn upsert_attendance(
        &self,
        class_id: Uuid,
        schedule_id: Uuid,
        record: AttendanceRecord,
    ) -> AppResult<()> {
        // Row lock serialises concurrent writers to the same session's array.
        let mut tx = self.pool.begin().await?;
        let row: Option<(Json<Vec<AttendanceRecord>>,)> = sqlx::query_as(
            "SELECT attendance FROM class_schedules WHERE id = $1 AND class_id = $2 FOR UPDATE",
        )
        .bind(schedule_id)
        .bind(class_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((Json(mut records),)) = row else {
            return Err(AppError::not_found("schedule"));
        };
        attendance::upsert_record(&mut records, record);

        sqlx::query("UPDATE class_schedules SET attendance = $1, updated_at = NOW() WHERE id = $2")
            .bind(Json(&records))
            .bind(schedule_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_attendance(
        &self,
        class_id: Uuid,
        schedule_id: Uuid,
        student_id: Uuid,
    ) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;
        let row: Option<(Json<Vec<AttendanceRecord>>,)> = sqlx::query_as(
            "SELECT attendance FROM class_schedules WHERE id = $1 AND class_id = $2 FOR UPDATE",
        )
        .bind(schedule_id)
        .bind(class_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((Json(mut records),)) = row else {
            return Err(AppError::not_found("schedule"));
        };
        if !attendance::remove_student(&mut records, student_id) {
            return Ok(false);
        }

        sqlx::query("UPDATE class_schedules SET attendance = $1, updated_at = NOW() WHERE id = $2")
            .bind(Json(&records))
            .bind(schedule_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Enrollments and parents
// ---------------------------------------------------------------------------

impl EnrollmentRepository for PgStore {
    async fn find_active_enrollment(
        &self,
        student_id: Uuid,
        class_id: Uuid,
    ) -> AppResult<Option<Enrollment>> {
        let row = sqlx::query_as::<_, EnrollmentRow>(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments
             WHERE student_id = $1 AND class_id = $2 AND status = 'active'
             LIMIT 1"
        ))
        .bind(student_id)
        .bind(class_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Enrollment::try_from).transpose()
    }

    async fn list_active_enrollments(&self, class_id: Uuid) -> AppResult<Vec<Enrollment>> {
        let rows = sqlx::query_as::<_, EnrollmentRow>(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments
             WHERE class_id = $1 AND status = 'active'
             ORDER BY student_name"
        ))
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }
}

impl ParentRepository for PgStore {
    async fn get_parent(&self, id: Uuid) -> AppResult<Option<Parent>> {
        let parent = sqlx::query_as::<_, Parent>(
            "SELECT id, display_name, line_user_id FROM parents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(parent)
    }
}

// ---------------------------------------------------------------------------
// Makeup requests
// ---------------------------------------------------------------------------

impl MakeupRepository for PgStore {
    async fn insert_makeup(&self, input: NewMakeupRequest) -> AppResult<MakeupRequest> {
        let result = sqlx::query_as::<_, MakeupRow>(&format!(
            "INSERT INTO makeup_classes
                (makeup_type, original_class_id, original_schedule_id, student_id, parent_id,
                 status, requested_by, reason, original_session_number, original_session_date,
                 request_date, created_at)
             VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8, $9, $10, $10)
             RETURNING {MAKEUP_COLUMNS}"
        ))
        .bind(input.kind.as_str())
        .bind(input.original_class_id)
        .bind(input.original_schedule_id)
        .bind(input.student_id)
        .bind(input.parent_id)
        .bind(input.requested_by.as_str())
        .bind(&input.reason)
        .bind(input.original_session_number)
        .bind(input.original_session_date)
        .bind(input.requested_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => MakeupRequest::try_from(row),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(AppError::DuplicateRequest)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_makeup(&self, id: Uuid) -> AppResult<Option<MakeupRequest>> {
        let row = sqlx::query_as::<_, MakeupRow>(&format!(
            "SELECT {MAKEUP_COLUMNS} FROM makeup_classes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(MakeupRequest::try_from).transpose()
    }

    async fn find_active_makeup(
        &self,
        student_id: Uuid,
        class_id: Uuid,
        schedule_id: Uuid,
    ) -> AppResult<Option<MakeupRequest>> {
        let row = sqlx::query_as::<_, MakeupRow>(&format!(
            "SELECT {MAKEUP_COLUMNS} FROM makeup_classes
             WHERE student_id = $1 AND original_class_id = $2 AND original_schedule_id = $3
               AND status IN ('pending', 'scheduled')
             LIMIT 1"
        ))
        .bind(student_id)
        .bind(class_id)
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(MakeupRequest::try_from).transpose()
    }

    async fn delete_pending_makeup(&self, id: Uuid) -> AppResult<bool> {
        let result =
            sqlx::query("DELETE FROM makeup_classes WHERE id = $1 AND status = 'pending'")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn transition_makeup(
        &self,
        id: Uuid,
        transition: &MakeupTransition,
    ) -> AppResult<Option<MakeupRequest>> {
        let source = transition.source().as_str();
        let target = transition.target().as_str();

        let row = match transition {
            MakeupTransition::Schedule { schedule, at } => {
                sqlx::query_as::<_, MakeupRow>(&format!(
                    "UPDATE makeup_classes
                     SET status = $3, makeup_date = $4, makeup_start_time = $5,
                         makeup_end_time = $6, scheduled_at = $7, updated_at = NOW()
                     WHERE id = $1 AND status = $2
                     RETURNING {MAKEUP_COLUMNS}"
                ))
                .bind(id)
                .bind(source)
                .bind(target)
                .bind(schedule.date)
                .bind(&schedule.start_time)
                .bind(&schedule.end_time)
                .bind(at)
                .fetch_optional(&self.pool)
                .await?
            }
            MakeupTransition::Complete { at } => {
                sqlx::query_as::<_, MakeupRow>(&format!(
                    "UPDATE makeup_classes
                     SET status = $3, completed_at = $4, updated_at = NOW()
                     WHERE id = $1 AND status = $2
                     RETURNING {MAKEUP_COLUMNS}"
                ))
                .bind(id)
                .bind(source)
                .bind(target)
                .bind(at)
                .fetch_optional(&self.pool)
                .await?
            }
            MakeupTransition::Cancel { reason, at } => {
                sqlx::query_as::<_, MakeupRow>(&format!(
                    "UPDATE makeup_classes
                     SET status = $3, cancel_reason = $4, cancelled_at = $5, updated_at = NOW()
                     WHERE id = $1 AND status = $2
                     RETURNING {MAKEUP_COLUMNS}"
                ))
                .bind(id)
                .bind(source)
                .bind(target)
                .bind(reason)
                .bind(at)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.map(MakeupRequest::try_from).transpose()
    }

    async fn list_scheduled_makeups_on(&self, date: NaiveDate) -> AppResult<Vec<MakeupRequest>> {
        let rows = sqlx::query_as::<_, MakeupRow>(&format!(
            "SELECT {MAKEUP_COLUMNS} FROM makeup_classes
             WHERE status = 'scheduled' AND makeup_date = $1
             ORDER BY makeup_start_time"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn list_makeups_for_student(&self, student_id: Uuid) -> AppResult<Vec<MakeupRequest>> {
        let rows = sqlx::query_as::<_, MakeupRow>(&format!(
            "SELECT {MAKEUP_COLUMNS} FROM makeup_classes
             WHERE student_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }
}
