use std::sync::Arc;

use redis::Client as RedisClient;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use makeup_api::{
    clock::{SchoolCalendar, SystemClock},
    config::Config,
    db::{self, PgStore},
    router,
    services::{
        dedup::RedisSendGuard,
        metrics,
        notifications::LineNotifier,
        scheduler::{self, JobRunner},
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let config = Arc::new(config);

    let pool = db::create_pool(&config.database_url, 10).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");
    let store = PgStore::new(pool);

    let redis_client = RedisClient::open(config.redis_url.as_str())?;
    let redis_conn = redis_client.get_multiplexed_async_connection().await?;
    info!("Redis connected");

    let notifier = Arc::new(LineNotifier::new(
        config.line_channel_access_token.clone(),
        config.line_api_base.clone(),
    ));
    if notifier.is_configured() {
        info!("LINE messaging configured");
    } else {
        info!("LINE not configured, notifications will be skipped");
    }

    let calendar = SchoolCalendar::new(config.school_offset()?);
    let state = AppState {
        store: store.clone(),
        redis: redis_conn.clone(),
        config: config.clone(),
        notifier: notifier.clone(),
        clock: Arc::new(SystemClock),
        calendar,
    };

    metrics::start(store.clone());

    if config.internal_scheduler {
        scheduler::start(
            JobRunner {
                store,
                notifier,
                guard: RedisSendGuard::new(redis_conn),
                clock: state.clock.clone(),
                calendar,
            },
            config.reminder_hour,
        );
    }

    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("makeup API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
