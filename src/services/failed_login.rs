// Failed-login tracker (§4.4): per-key attempt record with progressive
// lockout. Shares the Redis-with-in-process-fallback posture of
// `rate_limit`, since both sit in front of the same login path.

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

use crate::db::RedisPool;

const LOCKOUT_THRESHOLD: u32 = 5;
const LOCKOUT_MINUTES: i64 = 30;

/// Delay applied before the login handler runs, indexed by
/// `min(count, PROGRESSIVE_DELAYS.len() - 1)`.
const PROGRESSIVE_DELAYS_MS: [u64; 5] = [0, 1000, 2000, 5000, 10000];

#[derive(Debug, Error)]
pub enum FailedLoginError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedLoginRecord {
    pub count: u32,
    pub first_attempt: DateTime<Utc>,
    pub last_attempt: DateTime<Utc>,
    pub blocked: bool,
    pub blocked_until: Option<DateTime<Utc>>,
}

impl FailedLoginRecord {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            first_attempt: now,
            last_attempt: now,
            blocked: false,
            blocked_until: None,
        }
    }

    fn window_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.first_attempt) > chrono::Duration::minutes(LOCKOUT_MINUTES)
    }
}

pub struct FailedLoginTracker {
    redis_pool: Option<RedisPool>,
    local: Mutex<HashMap<String, FailedLoginRecord>>,
}

impl FailedLoginTracker {
    pub fn new(redis_pool: Option<RedisPool>) -> Self {
        Self {
            redis_pool,
            local: Mutex::new(HashMap::new()),
        }
    }

    fn redis_key(key: &str) -> String {
        format!("failed_login:{}", key)
    }

    pub async fn record_failure(&self, key: &str) -> Result<FailedLoginRecord, FailedLoginError> {
        let now = Utc::now();
        let mut record = self.get_record(key).await?.unwrap_or_else(|| FailedLoginRecord::fresh(now));

        if record.window_expired(now) {
            record = FailedLoginRecord::fresh(now);
        } else {
            record.count += 1;
            record.last_attempt = now;
        }

        if record.count >= LOCKOUT_THRESHOLD {
            record.blocked = true;
            record.blocked_until = Some(now + chrono::Duration::minutes(LOCKOUT_MINUTES));
        }

        self.put_record(key, &record).await?;
        Ok(record)
    }

    pub async fn record_success(&self, key: &str) -> Result<(), FailedLoginError> {
        if let Some(pool) = &self.redis_pool {
            let mut conn = pool.get_connection().await?;
            let _: () = conn.del(Self::redis_key(key)).await?;
        }
        self.local.lock().expect("failed login mutex poisoned").remove(key);
        Ok(())
    }

    /// Returns `Some(remaining_seconds)` if the key is currently blocked.
    pub async fn check_blocked(&self, key: &str) -> Result<Option<i64>, FailedLoginError> {
        let record = match self.get_record(key).await? {
            Some(r) => r,
            None => return Ok(None),
        };

        if !record.blocked {
            return Ok(None);
        }

        let Some(until) = record.blocked_until else {
            return Ok(None);
        };

        let remaining = until.signed_duration_since(Utc::now()).num_seconds();
        if remaining > 0 {
            Ok(Some(remaining))
        } else {
            Ok(None)
        }
    }

    pub fn progressive_delay_ms(count: u32) -> u64 {
        let idx = (count as usize).min(PROGRESSIVE_DELAYS_MS.len() - 1);
        PROGRESSIVE_DELAYS_MS[idx]
    }

    async fn get_record(&self, key: &str) -> Result<Option<FailedLoginRecord>, FailedLoginError> {
        if let Some(pool) = &self.redis_pool {
            let mut conn = pool.get_connection().await?;
            let raw: Option<String> = conn.get(Self::redis_key(key)).await?;
            return Ok(match raw {
                Some(s) => Some(serde_json::from_str(&s)?),
                None => None,
            });
        }

        Ok(self.local.lock().expect("failed login mutex poisoned").get(key).cloned())
    }

    async fn put_record(
        &self,
        key: &str,
        record: &FailedLoginRecord,
    ) -> Result<(), FailedLoginError> {
        if let Some(pool) = &self.redis_pool {
            let mut conn = pool.get_connection().await?;
            let serialized = serde_json::to_string(record)?;
            let _: () = conn
                .set_ex(Self::redis_key(key), serialized, (LOCKOUT_MINUTES as u64) * 60)
                .await?;
            return Ok(());
        }

        self.local
            .lock()
            .expect("failed login mutex poisoned")
            .insert(key.to_string(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifth_failure_blocks_for_thirty_minutes() {
        let tracker = FailedLoginTracker::new(None);
        let mut last = None;
        for _ in 0..5 {
            last = Some(tracker.record_failure("user@example.com").await.unwrap());
        }
        let record = last.unwrap();
        assert_eq!(record.count, 5);
        assert!(record.blocked);
        assert!(tracker.check_blocked("user@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn success_clears_record() {
        let tracker = FailedLoginTracker::new(None);
        tracker.record_failure("a@example.com").await.unwrap();
        tracker.record_success("a@example.com").await.unwrap();
        assert!(tracker.check_blocked("a@example.com").await.unwrap().is_none());
    }

    #[test]
    fn progressive_delay_caps_at_last_entry() {
        assert_eq!(FailedLoginTracker::progressive_delay_ms(0), 0);
        assert_eq!(FailedLoginTracker::progressive_delay_ms(4), 10000);
        assert_eq!(FailedLoginTracker::progressive_delay_ms(99), 10000);
    }
}
