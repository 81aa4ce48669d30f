pub mod attendance;
pub mod extract;
pub mod health;
pub mod jobs;
pub mod leave;
pub mod makeup;
pub mod metrics;
pub mod notifications;

use axum::{http::StatusCode, Json};
use serde_json::Value;

use crate::{error::AppError, AppState};

pub type ApiResult<T = Json<Value>> = Result<T, (StatusCode, Json<Value>)>;

/// Maps lifecycle errors to the `{ success: false, message }` reply,
/// with internal detail only in development.
pub(crate) fn reject(state: &AppState) -> impl Fn(AppError) -> (StatusCode, Json<Value>) {
    let debug = state.debug_errors();
    move |e| e.into_reply(debug)
}
