//! Fixed-window admission control keyed by hashed client identity.
//!
//! Buckets hold `{count, reset_at}`. The first hit on a key opens a window;
//! hits inside it increment the count until the ceiling, after which the key
//! is limited (the count saturates). Once `reset_at` passes the bucket is
//! replaced wholesale.

use std::{
    collections::HashMap,
    fmt,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use redis::{aio::ConnectionManager, RedisError, Script};
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),
}

/// Identity a bucket is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Ip,
    Email,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Ip => f.write_str("ip"),
            Scope::Email => f.write_str("email"),
        }
    }
}

/// Builds the `scope:hash` key used by every limiter backend.
pub fn bucket_key(scope: Scope, identity_hash: &str) -> String {
    format!("{scope}:{identity_hash}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { count: u32 },
    Limited,
}

impl RateLimitDecision {
    pub fn is_limited(&self) -> bool {
        matches!(self, RateLimitDecision::Limited)
    }
}

/// Check-and-increment admission control.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Records a hit on `key` and reports whether it exceeds `limit` hits per window.
    async fn check(&self, key: &str, limit: u32) -> Result<RateLimitDecision, RateLimitError>;
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

/// Process-local limiter. Only honest for single-instance deployments.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    window: Duration,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl InMemoryRateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn hit(&self, key: &str, limit: u32, now: Instant) -> RateLimitDecision {
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match buckets.get_mut(key) {
            Some(bucket) if now < bucket.reset_at => {
                if bucket.count >= limit {
                    return RateLimitDecision::Limited;
                }
                bucket.count += 1;
                RateLimitDecision::Allowed {
                    count: bucket.count,
                }
            }
            _ => {
                buckets.insert(
                    key.to_owned(),
                    Bucket {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                if limit == 0 {
                    RateLimitDecision::Limited
                } else {
                    RateLimitDecision::Allowed { count: 1 }
                }
            }
        }
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str, limit: u32) -> Result<RateLimitDecision, RateLimitError> {
        Ok(self.hit(key, limit, Instant::now()))
    }
}

// Saturating fixed window: refuse without incrementing once the ceiling is hit.
const FIXED_WINDOW_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if current and tonumber(current) >= tonumber(ARGV[1]) then
  return -1
end
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return count
";

/// Redis-backed limiter shared by every instance pointing at the same Redis.
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    window: Duration,
    script: Script,
}

impl RedisRateLimiter {
    pub fn new(conn: ConnectionManager, window: Duration) -> Self {
        Self {
            conn,
            window,
            script: Script::new(FIXED_WINDOW_SCRIPT),
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, key: &str, limit: u32) -> Result<RateLimitDecision, RateLimitError> {
        let mut conn = self.conn.clone();
        let count: i64 = self
            .script
            .key(format!("ratelimit:{key}"))
            .arg(limit)
            .arg(self.window.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;

        if count < 0 {
            Ok(RateLimitDecision::Limited)
        } else {
            Ok(RateLimitDecision::Allowed {
                count: u32::try_from(count).unwrap_or(u32::MAX),
            })
        }
    }
}
