use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    models::{
        auth::AuthenticatedUser,
        makeup::{CancelMakeupRequest, MakeupListQuery, MakeupSchedule},
    },
    routes::{
        extract::{ApiJson, ApiQuery},
        reject, ApiResult,
    },
    services::makeup::MakeupService,
    AppState,
};

pub async fn list_for_student(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<MakeupListQuery>,
) -> ApiResult {
    let makeups = MakeupService::list_for_student(&state.lifecycle(), &user, query.student_id)
        .await
        .map_err(reject(&state))?;
    Ok(Json(json!({ "success": true, "data": makeups })))
}

pub async fn get_makeup(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let makeup = MakeupService::get(&state.lifecycle(), &user, id)
        .await
        .map_err(reject(&state))?;
    Ok(Json(json!({ "success": true, "data": makeup })))
}

pub async fn schedule_makeup(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<MakeupSchedule>,
) -> ApiResult {
    let makeup = MakeupService::schedule(&state.lifecycle(), &user, id, body)
        .await
        .map_err(reject(&state))?;
    Ok(Json(json!({
        "success": true,
        "message": "นัดหมายคลาสชดเชยเรียบร้อยแล้ว",
        "data": makeup,
    })))
}

pub async fn complete_makeup(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult {
    let makeup = MakeupService::complete(&state.lifecycle(), &user, id)
        .await
        .map_err(reject(&state))?;
    Ok(Json(json!({
        "success": true,
        "message": "บันทึกการเรียนชดเชยเรียบร้อยแล้ว",
        "data": makeup,
    })))
}

pub async fn cancel_makeup(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<CancelMakeupRequest>,
) -> ApiResult {
    let makeup = MakeupService::cancel(&state.lifecycle(), &user, id, body.reason)
        .await
        .map_err(reject(&state))?;
    Ok(Json(json!({
        "success": true,
        "message": "ยกเลิกคำขอชดเชยเรียบร้อยแล้ว",
        "data": makeup,
    })))
}
