use redis::aio::MultiplexedConnection;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Fixed window counter per key. The first hit in a window creates the key
/// with its TTL in the same pipeline as the increment, so a counter never
/// outlives its window.
///
/// A Redis outage lets the request through.
pub async fn check_rate_limit(
    redis: &mut MultiplexedConnection,
    key: &str,
    max_attempts: u64,
    window_secs: u64,
) -> AppResult<()> {
    let counted: Result<(u64,), redis::RedisError> = redis::pipe()
        .atomic()
        .cmd("SET")
        .arg(key)
        .arg(0)
        .arg("EX")
        .arg(window_secs)
        .arg("NX")
        .ignore()
        .cmd("INCR")
        .arg(key)
        .query_async(redis)
        .await;

    let count = match counted {
        Ok((count,)) => count,
        Err(e) => {
            tracing::warn!("rate limit for {} not checked: {}", key, e);
            return Ok(());
        }
    };

    if exceeds(count, max_attempts) {
        tracing::warn!("rate limit exceeded for {} ({} in {}s)", key, count, window_secs);
        return Err(AppError::RateLimited(key.to_string()));
    }
    Ok(())
}

fn exceeds(count: u64, max_attempts: u64) -> bool {
    count > max_attempts
}

/// Rate-limit key for leave create/cancel calls by one user.
pub fn leave_key(user_id: Uuid) -> String {
    format!("ratelimit:leave:{user_id}")
}
