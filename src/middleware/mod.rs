pub mod auth;
pub mod cron;
pub mod rate_limit;
