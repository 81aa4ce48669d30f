use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    models::{attendance::RecordAttendanceRequest, auth::AuthenticatedUser},
    routes::{extract::ApiJson, reject, ApiResult},
    services::attendance::AttendanceService,
    AppState,
};

/// PUT /classes/{class_id}/schedules/{schedule_id}/attendance
pub async fn record_attendance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((class_id, schedule_id)): Path<(Uuid, Uuid)>,
    ApiJson(body): ApiJson<RecordAttendanceRequest>,
) -> ApiResult {
    let schedule = AttendanceService::record(&state.lifecycle(), &user, class_id, schedule_id, body)
        .await
        .map_err(reject(&state))?;
    Ok(Json(json!({ "success": true, "data": schedule })))
}
