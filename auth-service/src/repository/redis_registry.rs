//! # Redis-Backed Revocation Registry
//!
//! The pluggable second backend of the refresh-token revocation
//! registry, for deployments running more than one service instance.
//!
//! `SET NX EX` provides the same insert-if-absent semantics as the
//! in-memory backend's write lock: the first rotation to consume a
//! refresh token wins, every later attempt observes the identifier as
//! revoked. The `EX` TTL mirrors the token's remaining lifetime, so
//! Redis expires entries on its own and [`purge_expired`] has nothing
//! left to do.
//!
//! [`purge_expired`]: crate::repository::RevocationRegistry::purge_expired

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::redis_client::RedisClient;

use super::{RevocationRegistry, StoreError, StoreResult};

/// [`RevocationRegistry`] backed by Redis.
#[derive(Debug, Clone)]
pub struct RedisRevocationRegistry {
    client: RedisClient,
}

impl RedisRevocationRegistry {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    fn key(identifier: &str) -> String {
        format!("revoked:{}", identifier)
    }
}

#[async_trait]
impl RevocationRegistry for RedisRevocationRegistry {
    async fn revoke(&self, identifier: &str, expires_at: DateTime<Utc>) -> StoreResult<bool> {
        let ttl_secs = (expires_at - Utc::now()).num_seconds().max(1) as u64;
        self.client
            .set_nx_ex(&Self::key(identifier), ttl_secs)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn is_revoked(&self, identifier: &str) -> StoreResult<bool> {
        self.client
            .exists(&Self::key(identifier))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn purge_expired(&self, _before: DateTime<Utc>) -> StoreResult<u64> {
        // Redis expires entries itself via the EX TTL
        Ok(0)
    }
}
