#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use makeup_api::{
    clock::{Clock, SchoolCalendar},
    db::store::{
        ClassRepository, EnrollmentRepository, MakeupRepository, ParentRepository,
        ScheduleRepository,
    },
    error::{AppError, AppResult},
    models::{
        attendance::{self, AttendanceRecord},
        auth::AuthenticatedUser,
        class::{Class, ClassStatus, Schedule, ScheduleStatus},
        enrollment::{Enrollment, EnrollmentStatus},
        makeup::{MakeupRequest, MakeupStatus, MakeupTransition, NewMakeupRequest},
        parent::Parent,
        user::UserRole,
    },
    services::{
        dedup::SendGuard,
        notifications::{Dispatch, Notice, Notifier},
        Lifecycle,
    },
};

// ── Clock ───────────────────────────────────────────────────────────────────

pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// School time is UTC+7.
pub fn calendar() -> SchoolCalendar {
    SchoolCalendar::new(FixedOffset::east_opt(7 * 3600).unwrap())
}

/// Local school time as a UTC instant.
pub fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    let naive = NaiveDateTime::new(
        NaiveDate::from_ymd_opt(y, m, d).unwrap(),
        NaiveTime::from_hms_opt(h, min, 0).unwrap(),
    );
    calendar()
        .offset()
        .from_local_datetime(&naive)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ── Store ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    pub classes: Mutex<HashMap<Uuid, Class>>,
    pub schedules: Mutex<HashMap<Uuid, Schedule>>,
    pub enrollments: Mutex<Vec<Enrollment>>,
    pub parents: Mutex<HashMap<Uuid, Parent>>,
    pub makeups: Mutex<HashMap<Uuid, MakeupRequest>>,
    /// Classes whose session listing fails with an upstream error.
    pub broken_classes: Mutex<HashSet<Uuid>>,
    /// Makes every attendance write fail.
    pub attendance_down: AtomicBool,
    /// Makes single-class lookups fail.
    pub class_lookup_down: AtomicBool,
}

impl MemoryStore {
    pub fn class(&self, id: Uuid) -> Class {
        self.classes.lock().unwrap()[&id].clone()
    }

    pub fn schedule(&self, id: Uuid) -> Schedule {
        self.schedules.lock().unwrap()[&id].clone()
    }

    pub fn makeup(&self, id: Uuid) -> Option<MakeupRequest> {
        self.makeups.lock().unwrap().get(&id).cloned()
    }

    pub fn makeup_count(&self) -> usize {
        self.makeups.lock().unwrap().len()
    }

    fn schedules_of(&self, class_id: Uuid) -> AppResult<Vec<Schedule>> {
        if self.broken_classes.lock().unwrap().contains(&class_id) {
            return Err(AppError::Upstream("database: connection reset".into()));
        }
        let mut list: Vec<Schedule> = self
            .schedules
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.class_id == class_id)
            .cloned()
            .collect();
        list.sort_by_key(|s| s.session_date);
        Ok(list)
    }

    fn with_schedule<T>(
        &self,
        class_id: Uuid,
        schedule_id: Uuid,
        f: impl FnOnce(&mut Vec<AttendanceRecord>) -> T,
    ) -> AppResult<T> {
        if self.attendance_down.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("database: attendance write failed".into()));
        }
        let mut schedules = self.schedules.lock().unwrap();
        match schedules.get_mut(&schedule_id) {
            Some(s) if s.class_id == class_id => Ok(f(&mut s.attendance)),
            _ => Err(AppError::not_found("schedule")),
        }
    }
}

impl ClassRepository for MemoryStore {
    async fn get_class(&self, id: Uuid) -> AppResult<Option<Class>> {
        if self.class_lookup_down.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("database: connection reset".into()));
        }
        Ok(self.classes.lock().unwrap().get(&id).cloned())
    }

    async fn list_classes_by_status(&self, statuses: &[ClassStatus]) -> AppResult<Vec<Class>> {
        let mut list: Vec<Class> = self
            .classes
            .lock()
            .unwrap()
            .values()
            .filter(|c| statuses.contains(&c.status))
            .cloned()
            .collect();
        list.sort_by_key(|c| c.start_date);
        Ok(list)
    }

    async fn transition_class(
        &self,
        id: Uuid,
        from: ClassStatus,
        to: ClassStatus,
        at: DateTime<Utc>,
        by: &str,
    ) -> AppResult<bool> {
        let mut classes = self.classes.lock().unwrap();
        let Some(class) = classes.get_mut(&id) else {
            return Ok(false);
        };
        if class.status != from {
            return Ok(false);
        }
        class.status = to;
        match to {
            ClassStatus::Started => {
                class.started_at = Some(at);
                class.started_by = Some(by.to_string());
            }
            ClassStatus::Completed => {
                class.completed_at = Some(at);
                class.completed_by = Some(by.to_string());
            }
            _ => {}
        }
        Ok(true)
    }
}

impl ScheduleRepository for MemoryStore {
    async fn get_schedule(&self, class_id: Uuid, schedule_id: Uuid) -> AppResult<Option<Schedule>> {
        Ok(self
            .schedules
            .lock()
            .unwrap()
            .get(&schedule_id)
            .filter(|s| s.class_id == class_id)
            .cloned())
    }

    async fn list_schedules(&self, class_id: Uuid) -> AppResult<Vec<Schedule>> {
        self.schedules_of(class_id)
    }

    async fn list_schedules_between(
        &self,
        class_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Schedule>> {
        Ok(self
            .schedules_of(class_id)?
            .into_iter()
            .filter(|s| s.session_date >= from && s.session_date < to)
            .collect())
    }

    async fn upsert_attendance(
        &self,
        class_id: Uuid,
        schedule_id: Uuid,
        record: AttendanceRecord,
    ) -> AppResult<()> {
        self.with_schedule(class_id, schedule_id, |records| {
            attendance::upsert_record(records, record)
        })
    }

    async fn remove_attendance(
        &self,
        class_id: Uuid,
        schedule_id: Uuid,
        student_id: Uuid,
    ) -> AppResult<bool> {
        self.with_schedule(class_id, schedule_id, |records| {
            attendance::remove_student(records, student_id)
        })
    }
}

impl EnrollmentRepository for MemoryStore {
    async fn find_active_enrollment(
        &self,
        student_id: Uuid,
        class_id: Uuid,
    ) -> AppResult<Option<Enrollment>> {
        Ok(self
            .enrollments
            .lock()
            .unwrap()
            .iter()
            .find(|e| {
                e.student_id == student_id
                    && e.class_id == class_id
                    && e.status == EnrollmentStatus::Active
            })
            .cloned())
    }

    async fn list_active_enrollments(&self, class_id: Uuid) -> AppResult<Vec<Enrollment>> {
        Ok(self
            .enrollments
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.class_id == class_id && e.status == EnrollmentStatus::Active)
            .cloned()
            .collect())
    }
}

impl ParentRepository for MemoryStore {
    async fn get_parent(&self, id: Uuid) -> AppResult<Option<Parent>> {
        Ok(self.parents.lock().unwrap().get(&id).cloned())
    }
}

impl MakeupRepository for MemoryStore {
    async fn insert_makeup(&self, input: NewMakeupRequest) -> AppResult<MakeupRequest> {
        let mut makeups = self.makeups.lock().unwrap();
        // Same rule as the partial unique index.
        let clash = makeups.values().any(|m| {
            m.status.is_active()
                && m.student_id == input.student_id
                && m.original_class_id == input.original_class_id
                && m.original_schedule_id == input.original_schedule_id
        });
        if clash {
            return Err(AppError::DuplicateRequest);
        }

        let makeup = MakeupRequest {
            id: Uuid::new_v4(),
            kind: input.kind,
            original_class_id: input.original_class_id,
            original_schedule_id: input.original_schedule_id,
            student_id: input.student_id,
            parent_id: input.parent_id,
            status: MakeupStatus::Pending,
            requested_by: input.requested_by,
            reason: input.reason,
            original_session_number: input.original_session_number,
            original_session_date: input.original_session_date,
            makeup_schedule: None,
            created_at: input.requested_at,
            request_date: input.requested_at,
            scheduled_at: None,
            completed_at: None,
            cancelled_at: None,
            cancel_reason: None,
        };
        makeups.insert(makeup.id, makeup.clone());
        Ok(makeup)
    }

    async fn get_makeup(&self, id: Uuid) -> AppResult<Option<MakeupRequest>> {
        Ok(self.makeup(id))
    }

    async fn find_active_makeup(
        &self,
        student_id: Uuid,
        class_id: Uuid,
        schedule_id: Uuid,
    ) -> AppResult<Option<MakeupRequest>> {
        let found = self
            .makeups
            .lock()
            .unwrap()
            .values()
            .find(|m| {
                m.status.is_active()
                    && m.student_id == student_id
                    && m.original_class_id == class_id
                    && m.original_schedule_id == schedule_id
            })
            .cloned();
        // Lets a concurrent create read the same snapshot before either inserts,
        // as two requests racing on the database would.
        tokio::task::yield_now().await;
        Ok(found)
    }

    async fn delete_pending_makeup(&self, id: Uuid) -> AppResult<bool> {
        let mut makeups = self.makeups.lock().unwrap();
        match makeups.get(&id) {
            Some(m) if m.status == MakeupStatus::Pending => {
                makeups.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_makeup(
        &self,
        id: Uuid,
        transition: &MakeupTransition,
    ) -> AppResult<Option<MakeupRequest>> {
        let mut makeups = self.makeups.lock().unwrap();
        match makeups.get_mut(&id) {
            Some(m) if m.status == transition.source() => {
                transition.apply(m);
                Ok(Some(m.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_scheduled_makeups_on(&self, day: NaiveDate) -> AppResult<Vec<MakeupRequest>> {
        Ok(self
            .makeups
            .lock()
            .unwrap()
            .values()
            .filter(|m| {
                m.status == MakeupStatus::Scheduled
                    && m.makeup_schedule.as_ref().map(|s| s.date) == Some(day)
            })
            .cloned()
            .collect())
    }

    async fn list_makeups_for_student(&self, student_id: Uuid) -> AppResult<Vec<MakeupRequest>> {
        let mut list: Vec<MakeupRequest> = self
            .makeups
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.student_id == student_id)
            .cloned()
            .collect();
        list.sort_by_key(|m| std::cmp::Reverse(m.created_at));
        Ok(list)
    }
}

// ── Notifier and claim guard ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, Notice)>>,
    /// Recipients whose pushes fail.
    pub failing: Mutex<HashSet<String>>,
    /// Behaves like a LINE client without a channel token.
    pub unconfigured: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, Notice)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.sent().into_iter().map(|(to, _)| to).collect()
    }

    pub fn fail_for(&self, recipient: &str) {
        self.failing.lock().unwrap().insert(recipient.to_string());
    }

    pub fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn disconnect(&self) {
        self.unconfigured.store(true, Ordering::SeqCst);
    }
}

impl Notifier for RecordingNotifier {
    async fn push(&self, recipient: &str, notice: &Notice) -> AppResult<Dispatch> {
        if self.unconfigured.load(Ordering::SeqCst) {
            return Ok(Dispatch::Skipped);
        }
        if self.failing.lock().unwrap().contains(recipient) {
            return Err(AppError::Upstream(format!("LINE push 500 for {recipient}")));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), notice.clone()));
        Ok(Dispatch::Delivered)
    }
}

#[derive(Default)]
pub struct MemoryGuard {
    pub claims: Mutex<HashSet<String>>,
    pub unavailable: AtomicBool,
}

impl MemoryGuard {
    pub fn holds(&self, key: &str) -> bool {
        self.claims.lock().unwrap().contains(key)
    }
}

impl SendGuard for MemoryGuard {
    async fn claim(&self, key: &str) -> AppResult<bool> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("redis: connection refused".into()));
        }
        Ok(self.claims.lock().unwrap().insert(key.to_string()))
    }

    async fn release(&self, key: &str) -> AppResult<()> {
        self.claims.lock().unwrap().remove(key);
        Ok(())
    }
}

// ── Harness ─────────────────────────────────────────────────────────────────

pub struct Harness {
    pub store: MemoryStore,
    pub notifier: RecordingNotifier,
    pub guard: MemoryGuard,
    pub clock: FixedClock,
}

impl Harness {
    /// Monday 10 March 2025, 10:00 school time.
    pub fn new() -> Self {
        Self::at(local(2025, 3, 10, 10, 0))
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            store: MemoryStore::default(),
            notifier: RecordingNotifier::default(),
            guard: MemoryGuard::default(),
            clock: FixedClock::at(now),
        }
    }

    pub fn ctx(&self) -> Lifecycle<'_, MemoryStore, RecordingNotifier> {
        Lifecycle {
            store: &self.store,
            notifier: &self.notifier,
            clock: &self.clock,
            calendar: calendar(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn add_parent(&self, line_user_id: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.store.parents.lock().unwrap().insert(
            id,
            Parent {
                id,
                display_name: "Khun Mae".into(),
                line_user_id: line_user_id.map(str::to_string),
            },
        );
        id
    }

    pub fn add_class(
        &self,
        name: &str,
        status: ClassStatus,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.store.classes.lock().unwrap().insert(
            id,
            Class {
                id,
                name: name.into(),
                status,
                start_date,
                end_date,
                started_at: None,
                started_by: None,
                completed_at: None,
                completed_by: None,
            },
        );
        id
    }

    pub fn add_schedule(
        &self,
        class_id: Uuid,
        session_number: i32,
        session_date: DateTime<Utc>,
        status: ScheduleStatus,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.store.schedules.lock().unwrap().insert(
            id,
            Schedule {
                id,
                class_id,
                session_number,
                session_date,
                start_time: Some("09:00".into()),
                end_time: Some("11:00".into()),
                status,
                attendance: Vec::new(),
            },
        );
        id
    }

    /// Enrolls a new student under `parent_id`; returns the student id.
    pub fn enroll(&self, class_id: Uuid, parent_id: Uuid, student_name: &str) -> Uuid {
        self.enroll_with_status(class_id, parent_id, student_name, EnrollmentStatus::Active)
    }

    pub fn enroll_with_status(
        &self,
        class_id: Uuid,
        parent_id: Uuid,
        student_name: &str,
        status: EnrollmentStatus,
    ) -> Uuid {
        let student_id = Uuid::new_v4();
        self.store.enrollments.lock().unwrap().push(Enrollment {
            id: Uuid::new_v4(),
            class_id,
            student_id,
            student_name: student_name.into(),
            parent_id,
            status,
            enrolled_at: self.now() - Duration::days(30),
        });
        student_id
    }
}

pub fn staff() -> AuthenticatedUser {
    AuthenticatedUser {
        user_id: Uuid::new_v4(),
        role: UserRole::Admin,
    }
}

pub fn parent_user(parent_id: Uuid) -> AuthenticatedUser {
    AuthenticatedUser {
        user_id: parent_id,
        role: UserRole::Parent,
    }
}

/// A started class with one session tomorrow at 09:00 and one enrolled student.
pub struct Fixture {
    pub class_id: Uuid,
    pub schedule_id: Uuid,
    pub student_id: Uuid,
    pub parent_id: Uuid,
}

pub fn started_class_with_student(h: &Harness) -> Fixture {
    let parent_id = h.add_parent(Some("U-parent-1"));
    let class_id = h.add_class(
        "Robotics A",
        ClassStatus::Started,
        local(2025, 3, 1, 9, 0),
        local(2025, 4, 30, 11, 0),
    );
    let schedule_id = h.add_schedule(class_id, 5, local(2025, 3, 11, 9, 0), ScheduleStatus::Scheduled);
    let student_id = h.enroll(class_id, parent_id, "Ploy");
    Fixture {
        class_id,
        schedule_id,
        student_id,
        parent_id,
    }
}
