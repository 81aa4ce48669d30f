use std::env;

use chrono::FixedOffset;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    /// Shared secret presented by the external cron trigger as a bearer token.
    pub cron_secret: String,
    pub host: String,
    pub port: u16,
    pub app_env: String,
    pub app_base_url: String,
    // LINE Messaging API (optional)
    pub line_channel_access_token: Option<String>,
    pub line_api_base: String,
    /// Offset of the school's wall clock from UTC; day boundaries use it.
    pub school_utc_offset_minutes: i32,
    pub internal_scheduler: bool,
    pub reminder_hour: u32,
    /// Max leave/cancel calls per user per minute.
    pub leave_rate_limit: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            database_url: required("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            jwt_secret: required("JWT_SECRET")?,
            cron_secret: required("CRON_SECRET")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "production".into()),
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            line_channel_access_token: env::var("LINE_CHANNEL_ACCESS_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            line_api_base: env::var("LINE_API_BASE")
                .unwrap_or_else(|_| "https://api.line.me".into()),
            school_utc_offset_minutes: env::var("SCHOOL_UTC_OFFSET_MINUTES")
                .unwrap_or_else(|_| "420".into())
                .parse()?,
            internal_scheduler: env::var("INTERNAL_SCHEDULER")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            reminder_hour: env::var("REMINDER_HOUR")
                .unwrap_or_else(|_| "18".into())
                .parse()?,
            leave_rate_limit: env::var("LEAVE_RATE_LIMIT")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
        };

        anyhow::ensure!(
            config.reminder_hour < 24,
            "REMINDER_HOUR must be between 0 and 23"
        );
        config.school_offset()?;

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }

    pub fn school_offset(&self) -> anyhow::Result<FixedOffset> {
        FixedOffset::east_opt(self.school_utc_offset_minutes * 60).ok_or_else(|| {
            anyhow::anyhow!(
                "SCHOOL_UTC_OFFSET_MINUTES out of range: {}",
                self.school_utc_offset_minutes
            )
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
