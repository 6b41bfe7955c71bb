use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;

use crate::error::Result;

/// Lifetime of a single-request CSRF token.
pub const CSRF_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Server-side storage for single-request CSRF tokens.
///
/// A token is usable exactly once: `consume` removes it atomically.
#[async_trait]
pub trait CsrfStore: Send + Sync {
    async fn store(&self, token: &str, ttl: Duration) -> Result<()>;

    /// Removes `token` and returns whether it was present and unexpired.
    async fn consume(&self, token: &str) -> Result<bool>;
}

fn key_for(token: &str) -> String {
    format!("csrf:{}", token)
}

/// Redis backend: `SET EX` to store, `GETDEL` to consume.
#[derive(Clone)]
pub struct RedisCsrfStore {
    redis: ConnectionManager,
}

impl RedisCsrfStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CsrfStore for RedisCsrfStore {
    async fn store(&self, token: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: () = redis::cmd("SET")
            .arg(key_for(token))
            .arg(1)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn consume(&self, token: &str) -> Result<bool> {
        let mut conn = self.redis.clone();
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(key_for(token))
            .query_async(&mut conn)
            .await?;
        Ok(value.is_some())
    }
}

/// In-process backend. Expired entries are rejected on read and removed by
/// [`MemoryCsrfStore::sweep`].
#[derive(Clone, Default)]
pub struct MemoryCsrfStore {
    tokens: Arc<DashMap<String, Instant>>,
}

impl MemoryCsrfStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired tokens. Returns how many went.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.tokens.len())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl CsrfStore for MemoryCsrfStore {
    async fn store(&self, token: &str, ttl: Duration) -> Result<()> {
        self.tokens.insert(key_for(token), Instant::now() + ttl);
        Ok(())
    }

    async fn consume(&self, token: &str) -> Result<bool> {
        Ok(self
            .tokens
            .remove(&key_for(token))
            .is_some_and(|(_, expires_at)| expires_at > Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_is_consumed_once() {
        let store = MemoryCsrfStore::new();
        store.store("abc", CSRF_TOKEN_TTL).await.unwrap();
        assert!(store.consume("abc").await.unwrap());
        assert!(!store.consume("abc").await.unwrap());
        assert!(!store.consume("never-issued").await.unwrap());
    }

    #[tokio::test]
    async fn expired_tokens_are_refused_and_swept() {
        let store = MemoryCsrfStore::new();
        store.store("old", Duration::ZERO).await.unwrap();
        store.store("fresh", CSRF_TOKEN_TTL).await.unwrap();

        assert_eq!(store.sweep(Instant::now()), 1);
        assert_eq!(store.len(), 1);
        assert!(!store.consume("old").await.unwrap());
        assert!(store.consume("fresh").await.unwrap());
    }
}
