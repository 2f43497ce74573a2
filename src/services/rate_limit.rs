// Rate limiting service: Redis-backed sliding window counters with an
// in-process fallback so the gate keeps working if the distributed store is
// unreachable (§4.4).

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::db::RedisPool;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Redis connection error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Named tiers from §4.4. Window/max pairs are fixed per tier; "enhanced
/// auth" additionally depends on `DetectAutomation` at the call site.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RateLimitTier {
    General,
    Auth,
    Strict,
    EnhancedAuthNormal,
    EnhancedAuthAutomated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u32,
}

impl RateLimitTier {
    pub fn config(self) -> RateLimitConfig {
        match self {
            RateLimitTier::General => RateLimitConfig {
                max_requests: crate::CONFIG.rate_limit_max_requests,
                window_seconds: crate::CONFIG.rate_limit_window_minutes * 60,
            },
            RateLimitTier::Auth => RateLimitConfig {
                max_requests: 5,
                window_seconds: 60,
            },
            RateLimitTier::Strict => RateLimitConfig {
                max_requests: 3,
                window_seconds: 900,
            },
            RateLimitTier::EnhancedAuthAutomated => RateLimitConfig {
                max_requests: 3,
                window_seconds: 900,
            },
            RateLimitTier::EnhancedAuthNormal => RateLimitConfig {
                max_requests: 10,
                window_seconds: 900,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_time: u64,
    pub retry_after: Option<u32>,
    pub current_count: u32,
}

/// In-process fallback window, used when Redis is unavailable or disabled.
/// Evicted lazily (entries older than their own window are dropped on next
/// access) and swept wholesale every 5 minutes by a background task.
struct LocalWindow {
    hits: Vec<Instant>,
}

pub struct RateLimitService {
    redis_pool: Option<RedisPool>,
    local: Mutex<HashMap<String, LocalWindow>>,
}

impl RateLimitService {
    pub fn new(redis_pool: Option<RedisPool>) -> Self {
        Self {
            redis_pool,
            local: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_distributed(&self) -> bool {
        self.redis_pool.is_some()
    }

    #[instrument(skip(self), fields(key))]
    pub async fn check(
        &self,
        key: &str,
        tier: RateLimitTier,
    ) -> Result<RateLimitResult, RateLimitError> {
        let config = tier.config();

        match &self.redis_pool {
            Some(pool) => match self.sliding_window_check(pool, key, &config).await {
                Ok(result) => Ok(result),
                Err(e) => {
                    warn!(
                        "rate limit store unreachable, falling back to in-process window: {}",
                        e
                    );
                    Ok(self.local_window_check(key, &config))
                },
            },
            None => Ok(self.local_window_check(key, &config)),
        }
    }

    async fn sliding_window_check(
        &self,
        pool: &RedisPool,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, RateLimitError> {
        let mut conn = pool.get_connection().await?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let window_start = now.saturating_sub(config.window_seconds as u64 * 1000);
        let window_key = format!("rate_limit:{}", key);

        let script = r#"
            local key = KEYS[1]
            local now = tonumber(ARGV[1])
            local window_start = tonumber(ARGV[2])
            local max_requests = tonumber(ARGV[3])
            local window_seconds = tonumber(ARGV[4])

            redis.call('ZREMRANGEBYSCORE', key, '-inf', window_start)
            local current_count = redis.call('ZCARD', key)

            local allowed = current_count < max_requests
            if allowed then
                local rand = math.random(1000000)
                redis.call('ZADD', key, now, now .. ':' .. rand)
                current_count = current_count + 1
                redis.call('PEXPIREAT', key, now + (window_seconds * 1000))
            end

            local remaining = math.max(0, max_requests - current_count)
            local reset_time = now + (window_seconds * 1000)
            return {allowed and 1 or 0, remaining, reset_time, current_count}
        "#;

        let result: Vec<u64> = redis::Script::new(script)
            .key(&window_key)
            .arg(now)
            .arg(window_start)
            .arg(config.max_requests)
            .arg(config.window_seconds)
            .invoke_async(&mut conn)
            .await?;

        let allowed = result[0] == 1;
        Ok(RateLimitResult {
            allowed,
            remaining: result[1] as u32,
            reset_time: result[2] / 1000,
            retry_after: if allowed { None } else { Some(config.window_seconds) },
            current_count: result[3] as u32,
        })
    }

    fn local_window_check(&self, key: &str, config: &RateLimitConfig) -> RateLimitResult {
        let mut local = self.local.lock().expect("rate limit mutex poisoned");
        let now = Instant::now();
        let window = Duration::from_secs(config.window_seconds as u64);

        let entry = local.entry(key.to_string()).or_insert_with(|| LocalWindow { hits: Vec::new() });
        entry.hits.retain(|t| now.duration_since(*t) < window);

        let allowed = entry.hits.len() < config.max_requests as usize;
        if allowed {
            entry.hits.push(now);
        }

        let current_count = entry.hits.len() as u32;
        RateLimitResult {
            allowed,
            remaining: config.max_requests.saturating_sub(current_count),
            reset_time: 0,
            retry_after: if allowed { None } else { Some(config.window_seconds) },
            current_count,
        }
    }

    /// Periodic sweep of the in-process fallback map, run every 5 minutes
    /// per §4.4's backing-store contract.
    pub fn evict_stale_local_entries(&self, max_age: Duration) {
        let mut local = self.local.lock().expect("rate limit mutex poisoned");
        let now = Instant::now();
        local.retain(|_, window| {
            window.hits.retain(|t| now.duration_since(*t) < max_age);
            !window.hits.is_empty()
        });
    }

    pub async fn clear(&self, key: &str) -> Result<(), RateLimitError> {
        if let Some(pool) = &self.redis_pool {
            let mut conn = pool.get_connection().await?;
            let window_key = format!("rate_limit:{}", key);
            let _: () = conn.del(&window_key).await?;
        }
        self.local.lock().expect("rate limit mutex poisoned").remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_configs_match_spec_limits() {
        assert_eq!(RateLimitTier::Auth.config().max_requests, 5);
        assert_eq!(RateLimitTier::Auth.config().window_seconds, 60);
        assert_eq!(RateLimitTier::Strict.config().max_requests, 3);
        assert_eq!(RateLimitTier::Strict.config().window_seconds, 900);
        assert_eq!(RateLimitTier::EnhancedAuthAutomated.config().max_requests, 3);
        assert_eq!(RateLimitTier::EnhancedAuthNormal.config().max_requests, 10);
    }

    #[tokio::test]
    async fn local_fallback_allows_up_to_limit_then_blocks() {
        let service = RateLimitService::new(None);
        let config = RateLimitConfig {
            max_requests: 2,
            window_seconds: 60,
        };

        let r1 = service.local_window_check("k", &config);
        let r2 = service.local_window_check("k", &config);
        let r3 = service.local_window_check("k", &config);

        assert!(r1.allowed);
        assert!(r2.allowed);
        assert!(!r3.allowed);
        assert_eq!(r3.current_count, 2);
    }
}
