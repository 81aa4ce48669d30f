use std::future::Future;

use crate::error::AppResult;

/// How long a reminder claim survives; covers retries and restarts on the same day.
pub const CLAIM_TTL_SECS: u64 = 172_800;

/// At-most-once claims for outbound sends that may be retried by overlapping jobs.
pub trait SendGuard: Send + Sync {
    /// Returns `true` when the caller now owns `key` and should send.
    fn claim(&self, key: &str) -> impl Future<Output = AppResult<bool>> + Send;

    /// Gives up a claim after a failed send so a later run can retry.
    fn release(&self, key: &str) -> impl Future<Output = AppResult<()>> + Send;
}

/// Redis-backed claims (`SET key 1 NX EX ttl`).
#[derive(Clone)]
pub struct RedisSendGuard {
    conn: redis::aio::MultiplexedConnection,
    ttl_secs: u64,
}

impl RedisSendGuard {
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self {
            conn,
            ttl_secs: CLAIM_TTL_SECS,
        }
    }
}

impl SendGuard for RedisSendGuard {
    async fn claim(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn release(&self, key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}

/// Claim key for a class-session reminder to one student.
pub fn class_reminder_key(schedule_id: uuid::Uuid, student_id: uuid::Uuid) -> String {
    format!("reminder:class:{schedule_id}:{student_id}")
}

/// Claim key for the reminder of a makeup held on `date`.
pub fn makeup_reminder_key(makeup_id: uuid::Uuid, date: chrono::NaiveDate) -> String {
    format!("reminder:makeup:{makeup_id}:{date}")
}
