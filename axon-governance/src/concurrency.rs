//! Parallelism caps for tool execution.
//!
//! A global counting semaphore bounds total in-flight work; optional
//! per-tool semaphores bound individual tools. The per-tool permit is
//! taken after the global one and released before it (permits are RAII —
//! field order on [`ConcurrencyPermit`] encodes the release order).
//! Fairness is not guaranteed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Errors from limiter configuration or acquisition.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConcurrencyError {
    /// A limit was configured as zero.
    #[error("limit for '{0}' must be >= 1")]
    InvalidLimit(String),

    /// The limiter was torn down while a waiter was queued.
    #[error("limiter closed")]
    Closed,
}

/// An acquired slot. Dropping it releases the per-tool permit first,
/// then the global one.
pub struct ConcurrencyPermit {
    _tool: Option<OwnedSemaphorePermit>,
    _global: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for ConcurrencyPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Semaphore-based limiter with a global cap and optional per-tool caps.
pub struct ConcurrencyLimiter {
    global: Arc<Semaphore>,
    per_tool: HashMap<String, Arc<Semaphore>>,
    max_parallel: usize,
    active: Arc<AtomicUsize>,
}

impl ConcurrencyLimiter {
    /// Create a limiter. Every limit must be at least 1.
    pub fn new(
        max_parallel: usize,
        per_tool_limits: HashMap<String, usize>,
    ) -> Result<Self, ConcurrencyError> {
        if max_parallel < 1 {
            return Err(ConcurrencyError::InvalidLimit("max_parallel".into()));
        }
        let mut per_tool = HashMap::new();
        for (name, limit) in per_tool_limits {
            if limit < 1 {
                return Err(ConcurrencyError::InvalidLimit(name));
            }
            per_tool.insert(name, Arc::new(Semaphore::new(limit)));
        }
        Ok(Self {
            global: Arc::new(Semaphore::new(max_parallel)),
            per_tool,
            max_parallel,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The global cap.
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Number of currently held slots.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Acquire a slot, waiting as long as necessary. Pass the tool name to
    /// also take that tool's permit (if one is configured).
    pub async fn acquire(&self, tool: Option<&str>) -> Result<ConcurrencyPermit, ConcurrencyError> {
        let global = self
            .global
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ConcurrencyError::Closed)?;
        let tool_permit = match tool.and_then(|name| self.per_tool.get(name)) {
            Some(sem) => Some(
                sem.clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| ConcurrencyError::Closed)?,
            ),
            None => None,
        };
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(ConcurrencyPermit {
            _tool: tool_permit,
            _global: global,
            active: self.active.clone(),
        })
    }

    /// Acquire a slot without waiting. Returns `None` if either the global
    /// or the tool's semaphore has no free permit.
    pub fn try_acquire(&self, tool: Option<&str>) -> Option<ConcurrencyPermit> {
        let global = match self.global.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => return None,
        };
        let tool_permit = match tool.and_then(|name| self.per_tool.get(name)) {
            Some(sem) => match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                // Global permit drops here, releasing it.
                Err(_) => return None,
            },
            None => None,
        };
        self.active.fetch_add(1, Ordering::SeqCst);
        Some(ConcurrencyPermit {
            _tool: tool_permit,
            _global: global,
            active: self.active.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_and_release_tracks_active() {
        let limiter = ConcurrencyLimiter::new(2, HashMap::new()).unwrap();
        let a = limiter.acquire(None).await.unwrap();
        let b = limiter.acquire(None).await.unwrap();
        assert_eq!(limiter.active_count(), 2);
        drop(a);
        assert_eq!(limiter.active_count(), 1);
        drop(b);
        assert_eq!(limiter.active_count(), 0);
    }

    #[tokio::test]
    async fn try_acquire_fails_without_blocking() {
        let limiter = ConcurrencyLimiter::new(1, HashMap::new()).unwrap();
        let held = limiter.try_acquire(None).unwrap();
        assert!(limiter.try_acquire(None).is_none());
        drop(held);
        assert!(limiter.try_acquire(None).is_some());
    }

    #[tokio::test]
    async fn per_tool_limit_is_independent() {
        let limiter =
            ConcurrencyLimiter::new(4, HashMap::from([("scraper".to_string(), 1)])).unwrap();
        let held = limiter.try_acquire(Some("scraper")).unwrap();
        // Tool limit blocks a second scraper call.
        assert!(limiter.try_acquire(Some("scraper")).is_none());
        // Global capacity still serves other tools.
        assert!(limiter.try_acquire(Some("other")).is_some());
        drop(held);
        assert!(limiter.try_acquire(Some("scraper")).is_some());
    }

    #[tokio::test]
    async fn failed_tool_acquire_releases_global() {
        let limiter =
            ConcurrencyLimiter::new(2, HashMap::from([("db".to_string(), 1)])).unwrap();
        let _held = limiter.try_acquire(Some("db")).unwrap();
        assert!(limiter.try_acquire(Some("db")).is_none());
        // The failed attempt must not leak its global permit.
        let _a = limiter.try_acquire(None).unwrap();
        assert_eq!(limiter.active_count(), 2);
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(ConcurrencyLimiter::new(0, HashMap::new()).is_err());
        assert!(ConcurrencyLimiter::new(1, HashMap::from([("x".to_string(), 0)])).is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blocked_acquire_resumes_on_release() {
        let limiter = Arc::new(ConcurrencyLimiter::new(1, HashMap::new()).unwrap());
        let held = limiter.acquire(None).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let _permit = limiter.acquire(None).await.unwrap();
            })
        };
        // Give the waiter time to queue, then release.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(held);
        waiter.await.unwrap();
    }
}
