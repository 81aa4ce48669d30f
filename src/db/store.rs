//! Repository traits for the lifecycle's data access.
//!
//! The lifecycle services are generic over [`Store`], so the same rules run
//! against PostgreSQL in production and an in-memory store in tests.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    attendance::AttendanceRecord,
    class::{Class, ClassStatus, Schedule},
    enrollment::Enrollment,
    makeup::{MakeupRequest, MakeupTransition, NewMakeupRequest},
    parent::Parent,
};

pub trait ClassRepository: Send + Sync {
    fn get_class(&self, id: Uuid) -> impl Future<Output = AppResult<Option<Class>>> + Send;

    fn list_classes_by_status(
        &self,
        statuses: &[ClassStatus],
    ) -> impl Future<Output = AppResult<Vec<Class>>> + Send;

    /// Moves a class from `from` to `to`, stamping the matching `*_at`/`*_by`
    /// columns. Returns `false` when the class was no longer in `from`.
    fn transition_class(
        &self,
        id: Uuid,
        from: ClassStatus,
        to: ClassStatus,
        at: DateTime<Utc>,
        by: &str,
    ) -> impl Future<Output = AppResult<bool>> + Send;
}

pub trait ScheduleRepository: Send + Sync {
    fn get_schedule(
        &self,
        class_id: Uuid,
        schedule_id: Uuid,
    ) -> impl Future<Output = AppResult<Option<Schedule>>> + Send;

    fn list_schedules(&self, class_id: Uuid)
        -> impl Future<Output = AppResult<Vec<Schedule>>> + Send;

    /// Sessions of a class whose `session_date` falls in `[from, to)`.
    fn list_schedules_between(
        &self,
        class_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = AppResult<Vec<Schedule>>> + Send;

    /// Atomically replaces or appends the student's attendance entry.
    /// Fails with `NotFound` when the session does not exist.
    fn upsert_attendance(
        &self,
        class_id: Uuid,
        schedule_id: Uuid,
        record: AttendanceRecord,
    ) -> impl Future<Output = AppResult<()>> + Send;

    /// Atomically filters the student out of the session's attendance.
    fn remove_attendance(
        &self,
        class_id: Uuid,
        schedule_id: Uuid,
        student_id: Uuid,
    ) -> impl Future<Output = AppResult<bool>> + Send;
}

pub trait EnrollmentRepository: Send + Sync {
    fn find_active_enrollment(
        &self,
        student_id: Uuid,
        class_id: Uuid,
    ) -> impl Future<Output = AppResult<Option<Enrollment>>> + Send;

    fn list_active_enrollments(
        &self,
        class_id: Uuid,
    ) -> impl Future<Output = AppResult<Vec<Enrollment>>> + Send;
}

pub trait MakeupRepository: Send + Sync {
    /// Inserts a `pending` request. Fails with `DuplicateRequest` when an active
    /// request already exists for the same student, class and session.
    fn insert_makeup(
        &self,
        input: NewMakeupRequest,
    ) -> impl Future<Output = AppResult<MakeupRequest>> + Send;

    fn get_makeup(&self, id: Uuid) -> impl Future<Output = AppResult<Option<MakeupRequest>>> + Send;

    fn find_active_makeup(
        &self,
        student_id: Uuid,
        class_id: Uuid,
        schedule_id: Uuid,
    ) -> impl Future<Output = AppResult<Option<MakeupRequest>>> + Send;

    /// Hard-deletes the request only while it is still `pending`.
    fn delete_pending_makeup(&self, id: Uuid) -> impl Future<Output = AppResult<bool>> + Send;

    /// Applies `transition` if the request is currently in `transition.source()`.
    /// Returns the updated request, or `None` when nothing matched.
    fn transition_makeup(
        &self,
        id: Uuid,
        transition: &MakeupTransition,
    ) -> impl Future<Output = AppResult<Option<MakeupRequest>>> + Send;

    /// `scheduled` requests whose makeup date is `date`.
    fn list_scheduled_makeups_on(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = AppResult<Vec<MakeupRequest>>> + Send;

    fn list_makeups_for_student(
        &self,
        student_id: Uuid,
    ) -> impl Future<Output = AppResult<Vec<MakeupRequest>>> + Send;
}

pub trait ParentRepository: Send + Sync {
    fn get_parent(&self, id: Uuid) -> impl Future<Output = AppResult<Option<Parent>>> + Send;
}

/// Everything the lifecycle services need from persistence.
pub trait Store:
    ClassRepository + ScheduleRepository + EnrollmentRepository + MakeupRepository + ParentRepository
{
}

impl<T> Store for T where
    T: ClassRepository
        + ScheduleRepository
        + EnrollmentRepository
        + MakeupRepository
        + ParentRepository
{
}
