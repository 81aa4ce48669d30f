use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attendance::AttendanceRecord;

/// Actor recorded on status transitions made by the periodic jobs.
pub const SYSTEM_CRON: &str = "system-cron";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassStatus {
    Draft,
    Published,
    Started,
    Completed,
    Cancelled,
}

text_enum!(ClassStatus {
    Draft => "draft",
    Published => "published",
    Started => "started",
    Completed => "completed",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: Uuid,
    pub name: String,
    pub status: ClassStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub started_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Scheduled,
    Cancelled,
    Completed,
}

text_enum!(ScheduleStatus {
    Scheduled => "scheduled",
    Cancelled => "cancelled",
    Completed => "completed",
});

/// One dated occurrence of a class, with its embedded attendance array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: Uuid,
    pub class_id: Uuid,
    pub session_number: i32,
    /// Instant the session starts.
    pub session_date: DateTime<Utc>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub status: ScheduleStatus,
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
}

impl Schedule {
    pub fn attendance_for(&self, student_id: Uuid) -> Option<&AttendanceRecord> {
        self.attendance.iter().find(|r| r.student_id == student_id)
    }
}
