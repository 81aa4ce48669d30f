//! Run one periodic job and print its summary as JSON.
//! For deployments that trigger jobs from system cron instead of HTTP:
//!   0 * * * *  /app/run-job reconcile
//!   0 18 * * * /app/run-job reminders
//!
//! Usage: run-job <reconcile|reminders>
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use makeup_api::{
    clock::{SchoolCalendar, SystemClock},
    config::Config,
    db::{self, PgStore},
    services::{dedup::RedisSendGuard, notifications::LineNotifier, reconciler, reminders, Lifecycle},
};

#[derive(Parser)]
#[command(name = "run-job", about = "Run a makeup-class periodic job once")]
struct Args {
    #[command(subcommand)]
    job: Job,
}

#[derive(Subcommand)]
enum Job {
    /// Start and complete classes whose dates have been reached
    Reconcile,
    /// Send tomorrow's class and makeup reminders
    Reminders,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url, 5).await?;
    db::run_migrations(&pool).await?;
    let store = PgStore::new(pool);

    let notifier = LineNotifier::new(
        config.line_channel_access_token.clone(),
        config.line_api_base.clone(),
    );
    let clock = Arc::new(SystemClock);
    let ctx = Lifecycle {
        store: &store,
        notifier: &notifier,
        clock: clock.as_ref(),
        calendar: SchoolCalendar::new(config.school_offset()?),
    };

    let summary = match args.job {
        Job::Reconcile => {
            tracing::info!("Starting class status reconciliation...");
            serde_json::to_value(reconciler::run(&ctx).await?)?
        }
        Job::Reminders => {
            tracing::info!("Starting reminder dispatch...");
            let redis_client = redis::Client::open(config.redis_url.as_str())?;
            let guard = RedisSendGuard::new(redis_client.get_multiplexed_async_connection().await?);
            serde_json::to_value(reminders::run(&ctx, &guard).await?)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
