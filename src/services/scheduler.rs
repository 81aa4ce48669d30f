use std::sync::Arc;

use chrono::Timelike;
use tracing::{info, warn};

use crate::clock::{Clock, SchoolCalendar};
use crate::db::PgStore;
use crate::services::{
    dedup::RedisSendGuard, notifications::LineNotifier, reconciler, reminders, Lifecycle,
};

/// What the in-process jobs run against.
#[derive(Clone)]
pub struct JobRunner {
    pub store: PgStore,
    pub notifier: Arc<LineNotifier>,
    pub guard: RedisSendGuard,
    pub clock: Arc<dyn Clock>,
    pub calendar: SchoolCalendar,
}

impl JobRunner {
    fn lifecycle(&self) -> Lifecycle<'_, PgStore, LineNotifier> {
        Lifecycle {
            store: &self.store,
            notifier: self.notifier.as_ref(),
            clock: self.clock.as_ref(),
            calendar: self.calendar,
        }
    }
}

/// Spawn the hourly reconciler and the daily reminder task.
/// Only used when the external cron trigger is not deployed.
pub fn start(runner: JobRunner, reminder_hour: u32) {
    let hourly = runner.clone();
    tokio::spawn(async move {
        loop {
            // Sleep until the next top of the hour
            let secs_past = (hourly.clock.now().timestamp() % 3600) as u64;
            tokio::time::sleep(tokio::time::Duration::from_secs(3600 - secs_past)).await;

            match reconciler::run(&hourly.lifecycle()).await {
                Ok(s) => info!(
                    "Scheduler: reconciler started {} / completed {} class(es)",
                    s.classes_started, s.classes_completed
                ),
                Err(e) => warn!("Scheduler: reconciler failed: {}", e),
            }
        }
    });

    tokio::spawn(async move {
        loop {
            let secs = secs_until_hour(&runner, reminder_hour);
            tokio::time::sleep(tokio::time::Duration::from_secs(secs)).await;

            match reminders::run(&runner.lifecycle(), &runner.guard).await {
                Ok(s) => info!("Scheduler: {} reminder(s) sent", s.sent_count()),
                Err(e) => warn!("Scheduler: reminders failed: {}", e),
            }
        }
    });

    info!("In-process scheduler started (reminders at {:02}:00)", reminder_hour);
}

/// Seconds from now until the next `hour:00` in school time.
fn secs_until_hour(runner: &JobRunner, hour: u32) -> u64 {
    let local = runner
        .clock
        .now()
        .with_timezone(&runner.calendar.offset());
    secs_until(local.num_seconds_from_midnight(), hour * 3600)
}

fn secs_until(secs_today: u32, target_secs: u32) -> u64 {
    if secs_today < target_secs {
        (target_secs - secs_today) as u64
    } else {
        // Already past today's slot → tomorrow
        (86400 - secs_today + target_secs) as u64
    }
}
