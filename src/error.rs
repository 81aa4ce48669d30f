//! Error taxonomy for the makeup-class lifecycle.

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("Session has already taken place")]
    PastDate,

    #[error("An active makeup request already exists for this session")]
    DuplicateRequest,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Access denied")]
    Forbidden,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limit exceeded for {0}")]
    RateLimited(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(entity: &'static str) -> Self {
        AppError::NotFound { entity }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::PastDate
            | AppError::DuplicateRequest
            | AppError::InvalidState(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short user-facing message. Internal detail never appears here.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "ข้อมูลไม่ครบถ้วนหรือไม่ถูกต้อง",
            AppError::NotFound { entity } => match *entity {
                "enrollment" => "ไม่พบข้อมูลการลงทะเบียนเรียน",
                "schedule" => "ไม่พบคาบเรียนที่ระบุ",
                "class" => "ไม่พบคลาสเรียน",
                "parent" => "ไม่พบข้อมูลผู้ปกครอง",
                _ => "ไม่พบข้อมูลการขอชดเชย",
            },
            AppError::PastDate => "ไม่สามารถดำเนินการกับคาบเรียนที่ผ่านไปแล้ว",
            AppError::DuplicateRequest => "มีการแจ้งลาสำหรับคาบเรียนนี้แล้ว",
            AppError::InvalidState(_) => "ไม่สามารถดำเนินการในสถานะปัจจุบันได้",
            AppError::Forbidden => "ไม่มีสิทธิ์ดำเนินการ",
            AppError::Auth(_) => "Unauthorized",
            AppError::RateLimited(_) => "ทำรายการบ่อยเกินไป กรุณาลองใหม่ในอีกสักครู่",
            AppError::Upstream(_) => "เกิดข้อผิดพลาด กรุณาลองใหม่อีกครั้ง",
        }
    }

    /// Renders the `{ success: false, message }` body. `debug` adds the
    /// internal error text and must only be set in development.
    pub fn into_reply(self, debug: bool) -> (StatusCode, Json<Value>) {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::debug!("request rejected ({}): {}", status, self);
        }

        let mut body = json!({
            "success": false,
            "message": self.user_message(),
        });
        if debug {
            body["debug"] = json!(self.to_string());
        }
        (status, Json(body))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Upstream(format!("database: {err}"))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Upstream(format!("redis: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Upstream(format!("messaging: {err}"))
    }
}
