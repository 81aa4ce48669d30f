use axum::{extract::State, Json};
use serde_json::json;

use crate::{
    models::{auth::AuthenticatedUser, makeup::TestMakeupNotificationRequest},
    routes::{extract::ApiJson, reject, ApiResult},
    services::makeup::MakeupService,
    AppState,
};

/// POST /notifications/test-makeup: staff preview of the parent-facing notice.
pub async fn test_makeup(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(body): ApiJson<TestMakeupNotificationRequest>,
) -> ApiResult {
    let sent =
        MakeupService::send_test_notice(&state.lifecycle(), &user, body.makeup_id, body.line_user_id)
            .await
            .map_err(reject(&state))?;

    let message = if sent.delivered {
        "ส่งข้อความทดสอบเรียบร้อยแล้ว"
    } else {
        "ยังไม่ได้ตั้งค่า LINE ข้อความทดสอบจึงไม่ถูกส่ง"
    };
    Ok(Json(json!({
        "success": true,
        "delivered": sent.delivered,
        "message": message,
        "preview": sent.preview,
    })))
}
