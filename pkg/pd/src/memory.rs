use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::{PdClient, PdError};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A live service safe point held by PD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSafePointEntry {
    pub service_id: String,
    pub safe_point: u64,
    pub expired_at: DateTime<Utc>,
}

/// One `update_service_gc_safe_point` request as received, accepted or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUpdate {
    pub service_id: String,
    pub ttl: i64,
    pub safe_point: u64,
}

/// In-memory coordination service with PD's safe point rules.
///
/// Service safe points only hold back GC when [`MemoryPd::run_gc`] is used;
/// `update_gc_safe_point` moves the global safe point unconditionally, the
/// way an external GC worker would.
#[derive(Clone)]
pub struct MemoryPd {
    inner: Arc<RwLock<MemoryPdInner>>,
    clock: Clock,
}

#[derive(Default)]
struct MemoryPdInner {
    gc_safe_point: u64,
    service_safe_points: BTreeMap<String, ServiceSafePointEntry>,
    unavailable: bool,
    gc_queries: u64,
    service_updates: Vec<ServiceUpdate>,
}

impl MemoryPdInner {
    fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.service_safe_points.retain(|id, sp| {
            let live = sp.expired_at > now;
            if !live {
                debug!("MemoryPd: service safe point {} expired", id);
            }
            live
        });
    }

    fn min_service_safe_point(&self) -> Option<&ServiceSafePointEntry> {
        self.service_safe_points.values().min_by_key(|sp| sp.safe_point)
    }
}

impl MemoryPd {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    /// Use `clock` instead of the wall clock to decide expiry.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryPdInner::default())),
            clock,
        }
    }

    /// Make every client call fail with [`PdError::Unavailable`] until reset.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.write().await.unavailable = unavailable;
    }

    /// Current global GC safe point.
    pub async fn gc_safe_point(&self) -> u64 {
        self.inner.read().await.gc_safe_point
    }

    /// Run one GC round towards `target`, held back by the lowest live
    /// service safe point. Returns the resulting GC safe point.
    pub async fn run_gc(&self, target: u64) -> u64 {
        let now = (self.clock)();
        let mut inner = self.inner.write().await;
        inner.purge_expired(now);

        let new_safe_point = match inner.min_service_safe_point() {
            Some(min) if min.safe_point < target => {
                debug!(
                    "MemoryPd: GC held back at {} by {}",
                    min.safe_point, min.service_id
                );
                min.safe_point
            }
            _ => target,
        };
        if new_safe_point > inner.gc_safe_point {
            info!(
                "MemoryPd: GC safe point {} → {}",
                inner.gc_safe_point, new_safe_point
            );
            inner.gc_safe_point = new_safe_point;
        }
        inner.gc_safe_point
    }

    /// Live service safe points, ordered by id.
    pub async fn service_safe_points(&self) -> Vec<ServiceSafePointEntry> {
        let now = (self.clock)();
        let inner = self.inner.read().await;
        inner
            .service_safe_points
            .values()
            .filter(|sp| sp.expired_at > now)
            .cloned()
            .collect()
    }

    /// Every service safe point request received so far, in arrival order.
    pub async fn service_updates(&self) -> Vec<ServiceUpdate> {
        self.inner.read().await.service_updates.clone()
    }

    /// Number of `update_gc_safe_point` requests received so far.
    pub async fn gc_queries(&self) -> u64 {
        self.inner.read().await.gc_queries
    }
}

impl Default for MemoryPd {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PdClient for MemoryPd {
    async fn update_gc_safe_point(&self, safe_point: u64) -> Result<u64, PdError> {
        let mut inner = self.inner.write().await;
        inner.gc_queries += 1;
        if inner.unavailable {
            return Err(PdError::Unavailable("memory pd is down".to_string()));
        }
        if safe_point > inner.gc_safe_point {
            inner.gc_safe_point = safe_point;
        }
        Ok(inner.gc_safe_point)
    }

    async fn update_service_gc_safe_point(
        &self,
        service_id: &str,
        ttl: i64,
        safe_point: u64,
    ) -> Result<u64, PdError> {
        let now = (self.clock)();
        let mut inner = self.inner.write().await;
        inner.service_updates.push(ServiceUpdate {
            service_id: service_id.to_string(),
            ttl,
            safe_point,
        });
        if inner.unavailable {
            return Err(PdError::Unavailable("memory pd is down".to_string()));
        }
        if service_id.is_empty() {
            return Err(PdError::Rejected("empty service id".to_string()));
        }
        inner.purge_expired(now);

        if ttl <= 0 {
            inner.service_safe_points.remove(service_id);
        } else {
            let accept = match inner.min_service_safe_point() {
                Some(min) => safe_point >= min.safe_point,
                None => true,
            };
            if accept {
                inner.service_safe_points.insert(
                    service_id.to_string(),
                    ServiceSafePointEntry {
                        service_id: service_id.to_string(),
                        safe_point,
                        expired_at: expiry(now, ttl),
                    },
                );
            }
        }

        Ok(inner
            .min_service_safe_point()
            .map(|min| min.safe_point)
            .unwrap_or(safe_point))
    }
}

/// A TTL past chrono's range never expires.
fn expiry(now: DateTime<Utc>, ttl: i64) -> DateTime<Utc> {
    chrono::TimeDelta::try_seconds(ttl)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
