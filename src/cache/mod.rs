//! Best-effort key-value cache.
//!
//! The cache is an optimization, never a source of truth: every operation is
//! bounded by a timeout and degrades to a miss or a no-op on failure. A
//! failed cache call must never fail the surrounding request.

pub mod mirror;
pub mod refresh;

use redis::{AsyncCommands, aio::ConnectionManager};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use crate::auth::token::epoch_now;

const CACHE_OP_TIMEOUT: Duration = Duration::from_secs(2);

/// JSON envelope wrapped around every stored value.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub data: Value,
    pub key: String,
    pub created_at: i64,
    pub exp: Option<u64>,
}

/// Redis-backed cache handle. When the initial connection fails the handle
/// stays usable: every read misses and every write is a no-op.
#[derive(Clone)]
pub struct Cache {
    conn: Option<ConnectionManager>,
}

impl Cache {
    /// Connect to redis; on failure return a disabled handle and log why.
    pub async fn connect(redis_url: &str) -> Self {
        let client = match redis::Client::open(redis_url) {
            Ok(client) => client,
            Err(err) => {
                warn!("Cache disabled, invalid redis URL: {err}");
                return Self::disabled();
            }
        };
        match ConnectionManager::new(client).await {
            Ok(conn) => Self { conn: Some(conn) },
            Err(err) => {
                warn!("Cache disabled, redis unreachable: {err}");
                Self::disabled()
            }
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { conn: None }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    /// Write a value under the envelope; `ttl` in seconds, absent = no expiry.
    pub async fn set(&self, key: &str, data: Value, ttl: Option<u64>) {
        let Some(conn) = self.conn.clone() else {
            return;
        };
        let envelope = Envelope {
            data,
            key: key.to_string(),
            created_at: epoch_now(),
            exp: ttl,
        };
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Failed to serialize cache entry {key}: {err}");
                return;
            }
        };
        let mut conn = conn;
        let result = match ttl {
            Some(seconds) => {
                timeout(CACHE_OP_TIMEOUT, conn.set_ex::<_, _, ()>(key, payload, seconds)).await
            }
            None => timeout(CACHE_OP_TIMEOUT, conn.set::<_, _, ()>(key, payload)).await,
        };
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("Cache set failed for {key}: {err}"),
            Err(_) => warn!("Cache set timed out for {key}"),
        }
    }

    /// Read the unwrapped `data` field; any failure is a miss.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut conn = self.conn.clone()?;
        let payload: Option<String> =
            match timeout(CACHE_OP_TIMEOUT, conn.get::<_, Option<String>>(key)).await {
                Ok(Ok(payload)) => payload,
                Ok(Err(err)) => {
                    warn!("Cache get failed for {key}: {err}");
                    return None;
                }
                Err(_) => {
                    warn!("Cache get timed out for {key}");
                    return None;
                }
            };
        let payload = payload?;
        match serde_json::from_str::<Envelope>(&payload) {
            Ok(envelope) => Some(envelope.data),
            Err(err) => {
                warn!("Corrupt cache entry {key}: {err}");
                None
            }
        }
    }

    pub async fn delete(&self, key: &str) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        match timeout(CACHE_OP_TIMEOUT, conn.del::<_, ()>(key)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("Cache delete failed for {key}: {err}"),
            Err(_) => warn!("Cache delete timed out for {key}"),
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            return false;
        };
        match timeout(CACHE_OP_TIMEOUT, conn.exists::<_, bool>(key)).await {
            Ok(Ok(present)) => present,
            Ok(Err(err)) => {
                warn!("Cache exists failed for {key}: {err}");
                false
            }
            Err(_) => {
                warn!("Cache exists timed out for {key}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cache, Envelope};
    use serde_json::json;

    #[test]
    fn envelope_round_trip() {
        let envelope = Envelope {
            data: json!({"id": "abc", "roles": ["shopper"]}),
            key: "ms-users-abc".to_string(),
            created_at: 1_700_000_000,
            exp: Some(300),
        };
        let payload = serde_json::to_string(&envelope).expect("serialize envelope");
        let parsed: Envelope = serde_json::from_str(&payload).expect("parse envelope");
        assert_eq!(parsed.data, envelope.data);
        assert_eq!(parsed.key, "ms-users-abc");
        assert_eq!(parsed.exp, Some(300));
    }

    #[test]
    fn envelope_without_ttl_has_null_exp() {
        let envelope = Envelope {
            data: json!(null),
            key: "k".to_string(),
            created_at: 0,
            exp: None,
        };
        let payload = serde_json::to_string(&envelope).expect("serialize envelope");
        assert!(payload.contains("\"exp\":null"));
    }

    #[tokio::test]
    async fn disabled_cache_misses_and_swallows_writes() {
        let cache = Cache::disabled();
        assert!(!cache.is_enabled());
        cache.set("key", json!({"a": 1}), None).await;
        assert_eq!(cache.get("key").await, None);
        assert!(!cache.exists("key").await);
        cache.delete("key").await;
    }
}
