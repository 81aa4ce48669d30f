use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

/// One student's entry in a session's embedded `attendance` array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_id: Uuid,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub note: String,
    pub checked_at: DateTime<Utc>,
    pub checked_by: String,
}

/// Body for PUT /classes/{class_id}/schedules/{schedule_id}/attendance.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAttendanceRequest {
    pub student_id: Uuid,
    pub status: AttendanceStatus,
    pub note: Option<String>,
}

/// Replaces the entry for `record.student_id` if present, otherwise appends.
/// Keeps the array free of duplicate students.
pub fn upsert_record(records: &mut Vec<AttendanceRecord>, record: AttendanceRecord) {
    match records.iter_mut().find(|r| r.student_id == record.student_id) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

/// Filters out every entry for `student_id`. Returns whether anything was removed.
pub fn remove_student(records: &mut Vec<AttendanceRecord>, student_id: Uuid) -> bool {
    let before = records.len();
    records.retain(|r| r.student_id != student_id);
    records.len() != before
}
