//! Body and query extractors whose rejections use the `{ success: false, message }` reply.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{config::Config, error::AppError};

/// `Json<T>` that answers a missing content type or a body of the wrong
/// shape with a 400 validation reply.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    Arc<Config>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let debug = Arc::<Config>::from_ref(state).is_development();
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                Err(AppError::Validation(rejection.body_text()).into_reply(debug))
            }
        }
    }
}

/// `Query<T>` with the same rejection shape as [`ApiJson`].
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    Arc<Config>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let debug = Arc::<Config>::from_ref(state).is_development();
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => {
                Err(AppError::Validation(rejection.body_text()).into_reply(debug))
            }
        }
    }
}
