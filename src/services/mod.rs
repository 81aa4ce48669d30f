pub mod attendance;
pub mod batch;
pub mod dedup;
pub mod leave;
pub mod makeup;
pub mod metrics;
pub mod notifications;
pub mod reconciler;
pub mod reminders;
pub mod scheduler;

use chrono::{DateTime, Utc};

use crate::clock::{Clock, SchoolCalendar};

/// Collaborators shared by every lifecycle operation.
pub struct Lifecycle<'a, S, N> {
    pub store: &'a S,
    pub notifier: &'a N,
    pub clock: &'a dyn Clock,
    pub calendar: SchoolCalendar,
}

impl<S, N> Lifecycle<'_, S, N> {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
