//! Pluggable cost accumulators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::warn;
use veronica_core::ChainId;

use crate::error::{PolicyError, PolicyResult};

/// Default TTL applied to the backend key, in seconds.
pub const DEFAULT_BACKEND_TTL_SECS: u64 = 3600;

/// A shared cost accumulator.
///
/// The only resource shared across contexts. Mutation is atomic: an
/// in-process lock for [`LocalBudgetBackend`], a single INCRBYFLOAT+EXPIRE
/// pipeline for [`RedisBudgetBackend`].
#[async_trait]
pub trait BudgetBackend: Send + Sync {
    /// Add `amount` and return the new total.
    async fn add(&self, amount: f64) -> PolicyResult<f64>;

    /// The accumulated total.
    async fn get(&self) -> PolicyResult<f64>;

    /// Reset the accumulator to zero.
    async fn reset(&self) -> PolicyResult<()>;

    /// Whether a distributed backend has degraded to its local fallback.
    fn is_using_fallback(&self) -> bool;
}

/// Thread-safe in-process accumulator.
#[derive(Debug, Default)]
pub struct LocalBudgetBackend {
    total: RwLock<f64>,
}

impl LocalBudgetBackend {
    /// Create a zeroed accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BudgetBackend for LocalBudgetBackend {
    async fn add(&self, amount: f64) -> PolicyResult<f64> {
        let mut total = self.total.write().unwrap_or_else(|e| {
            warn!("LocalBudgetBackend lock poisoned, recovering");
            e.into_inner()
        });
        if amount.is_finite() {
            *total += amount;
        }
        Ok(*total)
    }

    async fn get(&self) -> PolicyResult<f64> {
        Ok(self.total.read().map(|t| *t).unwrap_or(0.0))
    }

    async fn reset(&self) -> PolicyResult<()> {
        let mut total = self.total.write().unwrap_or_else(|e| e.into_inner());
        *total = 0.0;
        Ok(())
    }

    fn is_using_fallback(&self) -> bool {
        false
    }
}

/// Configuration for [`RedisBudgetBackend`].
#[derive(Debug, Clone)]
pub struct RedisBackendConfig {
    /// TTL applied on every write so active chains never expire mid-run.
    pub ttl_seconds: u64,
    /// Degrade to a local accumulator on connection or command failure.
    pub fallback_on_error: bool,
}

impl Default for RedisBackendConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_BACKEND_TTL_SECS,
            fallback_on_error: true,
        }
    }
}

/// Cross-process accumulator backed by Redis.
///
/// Keys follow `veronica:budget:{chain_id}`. Every `add` runs INCRBYFLOAT
/// and EXPIRE as one atomic pipeline, refreshing the TTL so a long-running
/// chain does not expire mid-run.
///
/// With `fallback_on_error` (the default) construction never fails and any
/// mid-run backend failure degrades to a contained [`LocalBudgetBackend`]
/// for the remainder of the process, logged once and observable through
/// [`BudgetBackend::is_using_fallback`]. With it disabled, errors surface —
/// reserved for strict environments.
pub struct RedisBudgetBackend {
    key: String,
    ttl_seconds: u64,
    fallback_on_error: bool,
    conn: Option<ConnectionManager>,
    fallback: LocalBudgetBackend,
    using_fallback: AtomicBool,
    degraded_logged: AtomicBool,
}

impl RedisBudgetBackend {
    /// The Redis key for a chain's accumulator.
    #[must_use]
    pub fn key_for(chain_id: &ChainId) -> String {
        format!("veronica:budget:{chain_id}")
    }

    /// Connect to `url` for the given chain.
    ///
    /// # Errors
    ///
    /// Only with `fallback_on_error` disabled; otherwise a failed connection
    /// yields a backend already degraded to its local fallback.
    pub async fn connect(
        url: &str,
        chain_id: &ChainId,
        config: RedisBackendConfig,
    ) -> PolicyResult<Self> {
        let key = Self::key_for(chain_id);
        let conn = match Self::open(url).await {
            Ok(conn) => Some(conn),
            Err(e) => {
                if !config.fallback_on_error {
                    return Err(PolicyError::Backend(e.to_string()));
                }
                warn!(error = %e, key = %key, "Redis budget backend unavailable, using local fallback");
                None
            },
        };
        let degraded = conn.is_none();
        Ok(Self {
            key,
            ttl_seconds: config.ttl_seconds,
            fallback_on_error: config.fallback_on_error,
            conn,
            fallback: LocalBudgetBackend::new(),
            using_fallback: AtomicBool::new(degraded),
            degraded_logged: AtomicBool::new(degraded),
        })
    }

    async fn open(url: &str) -> Result<ConnectionManager, redis::RedisError> {
        let client = redis::Client::open(url)?;
        client.get_connection_manager().await
    }

    /// Degrade to the local fallback, or surface the error in strict mode.
    fn degrade(&self, error: &redis::RedisError) -> PolicyResult<()> {
        if !self.fallback_on_error {
            return Err(PolicyError::Backend(error.to_string()));
        }
        if !self.degraded_logged.swap(true, Ordering::SeqCst) {
            warn!(error = %error, key = %self.key, "Redis budget backend failed mid-run, degrading to local fallback");
        }
        self.using_fallback.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl BudgetBackend for RedisBudgetBackend {
    async fn add(&self, amount: f64) -> PolicyResult<f64> {
        if !self.using_fallback.load(Ordering::SeqCst) {
            if let Some(conn) = &self.conn {
                let mut conn = conn.clone();
                let result: Result<(f64, i64), redis::RedisError> = redis::pipe()
                    .atomic()
                    .cmd("INCRBYFLOAT")
                    .arg(&self.key)
                    .arg(amount)
                    .cmd("EXPIRE")
                    .arg(&self.key)
                    .arg(self.ttl_seconds)
                    .query_async(&mut conn)
                    .await;
                match result {
                    Ok((total, _)) => return Ok(total),
                    Err(e) => self.degrade(&e)?,
                }
            }
        }
        self.fallback.add(amount).await
    }

    async fn get(&self) -> PolicyResult<f64> {
        if !self.using_fallback.load(Ordering::SeqCst) {
            if let Some(conn) = &self.conn {
                let mut conn = conn.clone();
                let result: Result<Option<f64>, redis::RedisError> = redis::cmd("GET")
                    .arg(&self.key)
                    .query_async(&mut conn)
                    .await;
                match result {
                    Ok(total) => return Ok(total.unwrap_or(0.0)),
                    Err(e) => self.degrade(&e)?,
                }
            }
        }
        self.fallback.get().await
    }

    async fn reset(&self) -> PolicyResult<()> {
        if !self.using_fallback.load(Ordering::SeqCst) {
            if let Some(conn) = &self.conn {
                let mut conn = conn.clone();
                let result: Result<(), redis::RedisError> = redis::cmd("DEL")
                    .arg(&self.key)
                    .query_async(&mut conn)
                    .await;
                match result {
                    Ok(()) => return Ok(()),
                    Err(e) => self.degrade(&e)?,
                }
            }
        }
        self.fallback.reset().await
    }

    fn is_using_fallback(&self) -> bool {
        self.using_fallback.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for RedisBudgetBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBudgetBackend")
            .field("key", &self.key)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("using_fallback", &self.is_using_fallback())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_backend_accumulates() {
        let backend = LocalBudgetBackend::new();
        assert_eq!(backend.add(0.25).await.unwrap(), 0.25);
        assert_eq!(backend.add(0.25).await.unwrap(), 0.5);
        assert_eq!(backend.get().await.unwrap(), 0.5);
        assert!(!backend.is_using_fallback());
    }

    #[tokio::test]
    async fn test_local_backend_reset() {
        let backend = LocalBudgetBackend::new();
        backend.add(1.0).await.unwrap();
        backend.reset().await.unwrap();
        assert_eq!(backend.get().await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_local_backend_ignores_non_finite() {
        let backend = LocalBudgetBackend::new();
        backend.add(f64::NAN).await.unwrap();
        backend.add(f64::INFINITY).await.unwrap();
        assert_eq!(backend.get().await.unwrap(), 0.0);
    }

    #[test]
    fn test_key_pattern() {
        let key = RedisBudgetBackend::key_for(&ChainId::from_string("abc"));
        assert_eq!(key, "veronica:budget:abc");
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back() {
        // Nothing listens on this port; construction must still succeed and
        // the backend must accumulate locally.
        let backend = RedisBudgetBackend::connect(
            "redis://127.0.0.1:1/",
            &ChainId::from_string("c1"),
            RedisBackendConfig::default(),
        )
        .await
        .unwrap();
        assert!(backend.is_using_fallback());
        assert_eq!(backend.add(0.5).await.unwrap(), 0.5);
        assert_eq!(backend.get().await.unwrap(), 0.5);
    }

    #[tokio::test]
    async fn test_unreachable_redis_strict_mode_errors() {
        let result = RedisBudgetBackend::connect(
            "redis://127.0.0.1:1/",
            &ChainId::from_string("c1"),
            RedisBackendConfig {
                fallback_on_error: false,
                ..RedisBackendConfig::default()
            },
        )
        .await;
        assert!(result.is_err());
    }
}
