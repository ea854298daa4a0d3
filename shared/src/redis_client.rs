//! # Redis Client for the Revocation Registry Backend
//!
//! Thin async Redis client used by the pluggable refresh-token
//! revocation registry.
//!
//! ## Why Redis Here?
//!
//! The revocation registry is a single logical store with a pluggable
//! backend. The in-memory backend serves a single process; the Redis
//! backend lets several instances of the service agree on which refresh
//! tokens have been consumed.
//!
//! | Operation | Redis Command | Registry Use |
//! |-----------|---------------|--------------|
//! | [`set_nx_ex`](RedisClient::set_nx_ex) | `SET key v NX EX ttl` | Insert-if-absent: exactly one rotation wins |
//! | [`exists`](RedisClient::exists) | `EXISTS` | Is this identifier revoked? |
//! | [`delete`](RedisClient::delete) | `DEL` | Manual cleanup |
//! | [`ping`](RedisClient::ping) | `PING` | Health check |
//!
//! Expired entries need no explicit purge: the `EX` TTL matches the
//! token's remaining lifetime, after which the token is invalid anyway.
//!
//! ## Connection Management
//!
//! We use a `ConnectionManager` which automatically reconnects on
//! failure. This is more resilient than a simple connection for
//! long-running services.
//!
//! ## Key Naming Convention
//!
//! | Pattern | Purpose |
//! |---------|---------|
//! | `revoked:{identifier}` | Consumed/revoked token identifiers |
//! | `revoked:fam:{family}` | Revoked token families (reuse response) |

use crate::config::RedisConfig;
use crate::errors::ApiError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

// =============================================================================
// Redis Client
// =============================================================================

/// Async Redis client with automatic reconnection.
///
/// ## Thread Safety
///
/// The client is `Clone + Send + Sync`. Cloning is cheap (Arc-based);
/// each operation uses an async connection from the manager.
#[derive(Clone)]
pub struct RedisClient {
    /// Connection manager for automatic reconnection
    conn: ConnectionManager,
}

impl RedisClient {
    /// Creates a new Redis client and establishes connection.
    ///
    /// ## Errors
    ///
    /// Returns `ApiError::RedisError` if the URL is invalid, the server
    /// is unreachable, or authentication fails.
    pub async fn new(config: &RedisConfig) -> Result<Self, ApiError> {
        info!(url = %config.url, "Connecting to Redis");

        let client = redis::Client::open(config.url.as_str()).map_err(ApiError::RedisError)?;

        // Connection manager handles reconnection automatically
        let conn = ConnectionManager::new(client)
            .await
            .map_err(ApiError::RedisError)?;

        info!("Redis connection established");

        Ok(Self { conn })
    }

    /// Sets a key only if it does not exist, with a TTL.
    ///
    /// Returns `true` if this call created the key (first writer), `false`
    /// if the key already existed. This is the serialization primitive
    /// behind single-use refresh rotation: two concurrent rotations race
    /// on the insert and exactly one observes `true`.
    pub async fn set_nx_ex(&self, key: &str, ttl_secs: u64) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();

        // SET key value NX EX ttl -> Some("OK") when set, None when present
        let outcome: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async(&mut conn)
            .await
            .map_err(ApiError::RedisError)?;

        Ok(outcome.is_some())
    }

    /// Checks if a key exists.
    pub async fn exists(&self, key: &str) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(ApiError::RedisError)
    }

    /// Deletes a key.
    ///
    /// Returns `true` if the key was deleted, `false` if it didn't exist.
    pub async fn delete(&self, key: &str) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = conn.del(key).await.map_err(ApiError::RedisError)?;
        Ok(deleted > 0)
    }

    /// Health check - verifies Redis is responding.
    pub async fn ping(&self) -> Result<(), ApiError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(ApiError::RedisError)?;
        Ok(())
    }
}

// Hide internal state in Debug output
impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient").finish_non_exhaustive()
    }
}
