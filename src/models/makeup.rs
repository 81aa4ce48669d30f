use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of one absence-to-makeup request.
///
/// `pending → scheduled → completed`, `pending → cancelled`. `completed` and
/// `cancelled` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MakeupStatus {
    Pending,
    Scheduled,
    Completed,
    Cancelled,
}

text_enum!(MakeupStatus {
    Pending => "pending",
    Scheduled => "scheduled",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl MakeupStatus {
    /// Statuses that count towards the one-active-request-per-session rule.
    pub const ACTIVE: [MakeupStatus; 2] = [MakeupStatus::Pending, MakeupStatus::Scheduled];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MakeupStatus::Completed | MakeupStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: MakeupStatus) -> bool {
        matches!(
            (self, next),
            (MakeupStatus::Pending, MakeupStatus::Scheduled)
                | (MakeupStatus::Pending, MakeupStatus::Cancelled)
                | (MakeupStatus::Scheduled, MakeupStatus::Completed)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MakeupType {
    #[serde(rename = "scheduled")]
    Scheduled,
    #[serde(rename = "ad-hoc")]
    AdHoc,
}

text_enum!(MakeupType {
    Scheduled => "scheduled",
    AdHoc => "ad-hoc",
});

/// Channel the leave request came through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestedBy {
    Parent,
    Staff,
}

text_enum!(RequestedBy {
    Parent => "parent",
    Staff => "staff",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MakeupSchedule {
    pub date: NaiveDate,
    /// `HH:MM`, school time.
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MakeupRequest {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: MakeupType,
    pub original_class_id: Uuid,
    pub original_schedule_id: Uuid,
    pub student_id: Uuid,
    pub parent_id: Uuid,
    pub status: MakeupStatus,
    pub requested_by: RequestedBy,
    pub reason: String,
    /// Frozen copy of the excused session, taken when the absence was recorded.
    pub original_session_number: i32,
    pub original_session_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub makeup_schedule: Option<MakeupSchedule>,
    pub created_at: DateTime<Utc>,
    pub request_date: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
}

/// Input for inserting a new `pending` request.
#[derive(Debug, Clone)]
pub struct NewMakeupRequest {
    pub kind: MakeupType,
    pub original_class_id: Uuid,
    pub original_schedule_id: Uuid,
    pub student_id: Uuid,
    pub parent_id: Uuid,
    pub requested_by: RequestedBy,
    pub reason: String,
    pub original_session_number: i32,
    pub original_session_date: DateTime<Utc>,
    pub requested_at: DateTime<Utc>,
}

/// A status change applied with compare-and-set on the current status.
#[derive(Debug, Clone)]
pub enum MakeupTransition {
    Schedule {
        schedule: MakeupSchedule,
        at: DateTime<Utc>,
    },
    Complete {
        at: DateTime<Utc>,
    },
    Cancel {
        reason: Option<String>,
        at: DateTime<Utc>,
    },
}

impl MakeupTransition {
    pub fn target(&self) -> MakeupStatus {
        match self {
            MakeupTransition::Schedule { .. } => MakeupStatus::Scheduled,
            MakeupTransition::Complete { .. } => MakeupStatus::Completed,
            MakeupTransition::Cancel { .. } => MakeupStatus::Cancelled,
        }
    }

    /// The only status this transition may be applied from.
    pub fn source(&self) -> MakeupStatus {
        match self {
            MakeupTransition::Schedule { .. } | MakeupTransition::Cancel { .. } => {
                MakeupStatus::Pending
            }
            MakeupTransition::Complete { .. } => MakeupStatus::Scheduled,
        }
    }

    /// Applies the transition to an in-memory copy.
    pub fn apply(&self, request: &mut MakeupRequest) {
        request.status = self.target();
        match self {
            MakeupTransition::Schedule { schedule, at } => {
                request.makeup_schedule = Some(schedule.clone());
                request.scheduled_at = Some(*at);
            }
            MakeupTransition::Complete { at } => request.completed_at = Some(*at),
            MakeupTransition::Cancel { reason, at } => {
                request.cancel_reason = reason.clone();
                request.cancelled_at = Some(*at);
            }
        }
    }
}

/// Body for POST /makeup/leave-request. Ids arrive as strings and are parsed by
/// the service; a body of the wrong shape is turned into a validation reply by
/// `routes::extract::ApiJson`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequestBody {
    pub student_id: Option<String>,
    pub class_id: Option<String>,
    pub schedule_id: Option<String>,
    pub reason: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Body for POST /makeup/cancel-leave.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelLeaveBody {
    pub makeup_id: Option<String>,
    pub student_id: Option<String>,
    pub class_id: Option<String>,
    pub schedule_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelMakeupRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MakeupListQuery {
    pub student_id: Uuid,
}

/// Body for POST /notifications/test-makeup.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMakeupNotificationRequest {
    pub makeup_id: Uuid,
    /// Overrides the owning parent as recipient.
    pub line_user_id: Option<String>,
}
