//! Cron-triggered batch jobs. Per-item failures land in `details.errors`;
//! only a failure outside any item turns the whole call into a 500.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    middleware::cron::CronAuth,
    services::{reconciler, reminders},
    AppState,
};

/// GET /jobs/update-class-status
pub async fn update_class_status(
    State(state): State<AppState>,
    _auth: CronAuth,
) -> (StatusCode, Json<Value>) {
    let timestamp = state.clock.now().to_rfc3339();

    match reconciler::run(&state.lifecycle()).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": format!(
                    "Checked {} class(es): {} started, {} completed",
                    summary.classes_checked, summary.classes_started, summary.classes_completed
                ),
                "details": summary,
                "timestamp": timestamp,
            })),
        ),
        Err(e) => {
            tracing::error!("update-class-status failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": "Failed to update class status",
                    "timestamp": timestamp,
                })),
            )
        }
    }
}

/// GET /jobs/send-reminders
pub async fn send_reminders(
    State(state): State<AppState>,
    _auth: CronAuth,
) -> (StatusCode, Json<Value>) {
    let timestamp = state.clock.now().to_rfc3339();
    let guard = state.send_guard();

    match reminders::run(&state.lifecycle(), &guard).await {
        Ok(summary) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": format!("Sent {} reminder(s)", summary.sent_count()),
                "sentCount": summary.sent_count(),
                "details": summary,
                "timestamp": timestamp,
            })),
        ),
        Err(e) => {
            tracing::error!("send-reminders failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": "Failed to send reminders",
                    "timestamp": timestamp,
                })),
            )
        }
    }
}
