use axum::{extract::State, Json};
use serde_json::json;

use crate::{
    middleware::rate_limit::{check_rate_limit, leave_key},
    models::{
        auth::AuthenticatedUser,
        makeup::{CancelLeaveBody, LeaveRequestBody},
    },
    routes::{extract::ApiJson, reject, ApiResult},
    services::leave::LeaveService,
    AppState,
};

/// POST /makeup/leave-request
pub async fn create_leave(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(body): ApiJson<LeaveRequestBody>,
) -> ApiResult {
    let mut redis = state.redis.clone();
    check_rate_limit(&mut redis, &leave_key(user.user_id), state.config.leave_rate_limit, 60)
        .await
        .map_err(reject(&state))?;

    let makeup = LeaveService::create(&state.lifecycle(), &user, body)
        .await
        .map_err(reject(&state))?;

    Ok(Json(json!({
        "success": true,
        "message": "บันทึกการลาเรียบร้อยแล้ว",
        "makeupId": makeup.id,
    })))
}

/// POST /makeup/cancel-leave
pub async fn cancel_leave(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(body): ApiJson<CancelLeaveBody>,
) -> ApiResult {
    let mut redis = state.redis.clone();
    check_rate_limit(&mut redis, &leave_key(user.user_id), state.config.leave_rate_limit, 60)
        .await
        .map_err(reject(&state))?;

    LeaveService::cancel(&state.lifecycle(), &user, body)
        .await
        .map_err(reject(&state))?;

    Ok(Json(json!({
        "success": true,
        "message": "ยกเลิกการลาเรียบร้อยแล้ว",
    })))
}
