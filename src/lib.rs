// Library exports for the binaries and integration tests
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{
    extract::FromRef,
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use clock::{Clock, SchoolCalendar};
use config::Config;
use db::PgStore;
use middleware::auth::JwtSecret;
use services::{dedup::RedisSendGuard, notifications::LineNotifier, Lifecycle};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: PgStore,
    pub redis: redis::aio::MultiplexedConnection,
    pub config: Arc<Config>,
    pub notifier: Arc<LineNotifier>,
    pub clock: Arc<dyn Clock>,
    pub calendar: SchoolCalendar,
}

impl AppState {
    pub fn lifecycle(&self) -> Lifecycle<'_, PgStore, LineNotifier> {
        Lifecycle {
            store: &self.store,
            notifier: self.notifier.as_ref(),
            clock: self.clock.as_ref(),
            calendar: self.calendar,
        }
    }

    pub fn send_guard(&self) -> RedisSendGuard {
        RedisSendGuard::new(self.redis.clone())
    }

    /// Whether error replies may carry internal detail.
    pub fn debug_errors(&self) -> bool {
        self.config.is_development()
    }
}

impl FromRef<AppState> for Arc<Config> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

/// Builds the full HTTP surface with tracing, CORS and the JWT secret attached.
pub fn router(state: AppState) -> Router {
    // In development (localhost), all local origins are allowed.
    let base = state.config.app_base_url.clone();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let o = match origin.to_str() {
            Ok(s) => s,
            Err(_) => return false,
        };
        o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") || o == base
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(cors_origin);

    let jwt_secret = JwtSecret(state.config.jwt_secret.clone());

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Cron triggers
        .route("/jobs/update-class-status", get(routes::jobs::update_class_status))
        .route("/jobs/send-reminders", get(routes::jobs::send_reminders))
        // Leave / makeup lifecycle
        .route("/makeup", get(routes::makeup::list_for_student))
        .route("/makeup/leave-request", post(routes::leave::create_leave))
        .route("/makeup/cancel-leave", post(routes::leave::cancel_leave))
        .route("/makeup/{id}", get(routes::makeup::get_makeup))
        .route("/makeup/{id}/schedule", post(routes::makeup::schedule_makeup))
        .route("/makeup/{id}/complete", post(routes::makeup::complete_makeup))
        .route("/makeup/{id}/cancel", post(routes::makeup::cancel_makeup))
        // Attendance
        .route(
            "/classes/{class_id}/schedules/{schedule_id}/attendance",
            put(routes::attendance::record_attendance),
        )
        // Notifications
        .route("/notifications/test-makeup", post(routes::notifications::test_makeup))
        .layer(axum::Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
