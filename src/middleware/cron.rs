use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    Json,
};
use serde_json::{json, Value};

use crate::config::Config;

/// Extractor that validates `Authorization: Bearer <CRON_SECRET>` on job triggers.
pub struct CronAuth;

impl<S> FromRequestParts<S> for CronAuth
where
    Arc<Config>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Arc::<Config>::from_ref(state);

        let presented = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match presented {
            Some(secret) if !config.cron_secret.is_empty() && secret == config.cron_secret => {
                Ok(CronAuth)
            }
            _ => {
                tracing::warn!("rejected job trigger without a valid cron secret");
                Err((
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "success": false, "message": "Unauthorized" })),
                ))
            }
        }
    }
}
