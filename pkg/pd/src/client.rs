use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a coordination service call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PdError {
    #[error("pd is unavailable: {0}")]
    Unavailable(String),
    #[error("pd request timed out after {0:?}")]
    Timeout(Duration),
    #[error("pd rejected the request: {0}")]
    Rejected(String),
}

/// The subset of the PD client the safepoint keeper depends on.
///
/// Implementations must be safe to share between keepers of independent backups.
#[async_trait]
pub trait PdClient: Send + Sync {
    /// Try to advance the global GC safe point to `safe_point` and return the
    /// resulting value. PD never moves it backwards, so passing 0 only reads it.
    async fn update_gc_safe_point(&self, safe_point: u64) -> Result<u64, PdError>;

    /// Register or renew the service safe point `service_id` for `ttl` seconds.
    /// A non-positive `ttl` removes it. Returns the minimum service safe point
    /// PD holds after the update.
    async fn update_service_gc_safe_point(
        &self,
        service_id: &str,
        ttl: i64,
        safe_point: u64,
    ) -> Result<u64, PdError>;
}

#[async_trait]
impl<T: PdClient + ?Sized> PdClient for Arc<T> {
    async fn update_gc_safe_point(&self, safe_point: u64) -> Result<u64, PdError> {
        (**self).update_gc_safe_point(safe_point).await
    }

    async fn update_service_gc_safe_point(
        &self,
        service_id: &str,
        ttl: i64,
        safe_point: u64,
    ) -> Result<u64, PdError> {
        (**self)
            .update_service_gc_safe_point(service_id, ttl, safe_point)
            .await
    }
}

/// Wraps a client so every call fails with [`PdError::Timeout`] once it
/// runs longer than `timeout`.
pub struct TimeoutPd<C> {
    inner: C,
    timeout: Duration,
}

impl<C: PdClient> TimeoutPd<C> {
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<C: PdClient> PdClient for TimeoutPd<C> {
    async fn update_gc_safe_point(&self, safe_point: u64) -> Result<u64, PdError> {
        tokio::time::timeout(self.timeout, self.inner.update_gc_safe_point(safe_point))
            .await
            .map_err(|_| PdError::Timeout(self.timeout))?
    }

    async fn update_service_gc_safe_point(
        &self,
        service_id: &str,
        ttl: i64,
        safe_point: u64,
    ) -> Result<u64, PdError> {
        tokio::time::timeout(
            self.timeout,
            self.inner
                .update_service_gc_safe_point(service_id, ttl, safe_point),
        )
        .await
        .map_err(|_| PdError::Timeout(self.timeout))?
    }
}
