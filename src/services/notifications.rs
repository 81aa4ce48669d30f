use std::future::Future;

use reqwest::Client;
use serde_json::json;
use uuid::Uuid;

use crate::db::store::ParentRepository;
use crate::error::{AppError, AppResult};
use crate::models::makeup::MakeupSchedule;

/// A message the lifecycle sends to a parent.
#[derive(Debug, Clone)]
pub enum Notice {
    ClassReminder {
        student_name: String,
        class_name: String,
        session_number: i32,
        session_date: String,
        start_time: Option<String>,
        end_time: Option<String>,
    },
    MakeupReminder {
        student_name: String,
        class_name: String,
        schedule: MakeupSchedule,
    },
    MakeupScheduled {
        student_name: String,
        class_name: String,
        schedule: MakeupSchedule,
    },
    LeaveRecorded {
        student_name: String,
        class_name: String,
        session_number: i32,
        session_date: String,
    },
    /// Staff-triggered preview of another notice.
    Test(Box<Notice>),
}

impl Notice {
    pub fn kind(&self) -> &'static str {
        match self {
            Notice::ClassReminder { .. } => "class_reminder",
            Notice::MakeupReminder { .. } => "makeup_reminder",
            Notice::MakeupScheduled { .. } => "makeup_scheduled",
            Notice::LeaveRecorded { .. } => "leave_recorded",
            Notice::Test(_) => "test",
        }
    }

    /// Plain-text body as delivered to LINE.
    pub fn text(&self) -> String {
        match self {
            Notice::ClassReminder {
                student_name,
                class_name,
                session_number,
                session_date,
                start_time,
                end_time,
            } => format!(
                "แจ้งเตือนคลาสเรียนพรุ่งนี้\nนักเรียน: {student_name}\nคลาส: {class_name} (ครั้งที่ {session_number})\nวันที่: {session_date}{}",
                time_range(start_time.as_deref(), end_time.as_deref())
            ),
            Notice::MakeupReminder {
                student_name,
                class_name,
                schedule,
            } => format!(
                "แจ้งเตือนคลาสชดเชยพรุ่งนี้\nนักเรียน: {student_name}\nคลาส: {class_name}\nวันที่: {}{}",
                schedule.date.format("%d/%m/%Y"),
                time_range(Some(&schedule.start_time), Some(&schedule.end_time))
            ),
            Notice::MakeupScheduled {
                student_name,
                class_name,
                schedule,
            } => format!(
                "นัดหมายคลาสชดเชยเรียบร้อยแล้ว\nนักเรียน: {student_name}\nคลาส: {class_name}\nวันที่: {}{}",
                schedule.date.format("%d/%m/%Y"),
                time_range(Some(&schedule.start_time), Some(&schedule.end_time))
            ),
            Notice::LeaveRecorded {
                student_name,
                class_name,
                session_number,
                session_date,
            } => format!(
                "รับแจ้งลาเรียบร้อยแล้ว\nนักเรียน: {student_name}\nคลาส: {class_name} (ครั้งที่ {session_number})\nวันที่: {session_date}\nทางโรงเรียนจะติดต่อเพื่อนัดคลาสชดเชย"
            ),
            Notice::Test(inner) => format!("[ทดสอบ] {}", inner.text()),
        }
    }
}

fn time_range(start: Option<&str>, end: Option<&str>) -> String {
    match (start, end) {
        (Some(s), Some(e)) => format!("\nเวลา: {s} - {e} น."),
        (Some(s), None) => format!("\nเวลา: {s} น."),
        _ => String::new(),
    }
}

/// What became of a push that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Delivered,
    /// No messaging channel is configured; nothing left the process.
    Skipped,
}

/// Outbound delivery of notices to a messaging recipient.
pub trait Notifier: Send + Sync {
    fn push(
        &self,
        recipient: &str,
        notice: &Notice,
    ) -> impl Future<Output = AppResult<Dispatch>> + Send;
}

/// LINE Messaging API push client.
pub struct LineNotifier {
    client: Client,
    channel_access_token: Option<String>,
    api_base: String,
}

impl LineNotifier {
    pub fn new(channel_access_token: Option<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            channel_access_token,
            api_base: api_base.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.channel_access_token.is_some()
    }
}

impl Notifier for LineNotifier {
    async fn push(&self, recipient: &str, notice: &Notice) -> AppResult<Dispatch> {
        let token = match &self.channel_access_token {
            Some(t) => t,
            None => {
                tracing::debug!("LINE not configured, skipping {} notice", notice.kind());
                return Ok(Dispatch::Skipped);
            }
        };

        let payload = json!({
            "to": recipient,
            "messages": [{ "type": "text", "text": notice.text() }],
        });

        let response = self
            .client
            .post(format!("{}/v2/bot/message/push", self.api_base))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!("LINE push {status}: {text}")));
        }

        Ok(Dispatch::Delivered)
    }
}

/// Resolves the parent's LINE id and pushes `notice` to it.
pub async fn notify_parent<S, N>(
    store: &S,
    notifier: &N,
    parent_id: Uuid,
    notice: &Notice,
) -> AppResult<Dispatch>
where
    S: ParentRepository,
    N: Notifier,
{
    let parent = store
        .get_parent(parent_id)
        .await?
        .ok_or(AppError::not_found("parent"))?;

    let line_user_id = parent.line_user_id.ok_or_else(|| {
        AppError::InvalidState(format!("parent {parent_id} has no linked LINE account"))
    })?;

    notifier.push(&line_user_id, notice).await
}
