//! Execution leases: at-most-one concurrent execution per key.
//!
//! The lease is an explicit abstraction so the single-instance in-memory
//! implementation and a distributed (e.g. lease-based) implementation are
//! interchangeable without touching the orchestration logic. Semantics:
//! acquire rejects immediately when the key is held (no queueing), and a
//! held lease auto-expires at its TTL so a crashed or hung handler cannot
//! permanently block future executions of the same key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum LeaseError {
    /// The key is currently held. Callers must treat this as a rejection,
    /// not a retry signal.
    #[error("lease already held")]
    Held,

    #[error("lease backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Acquire/renew/release with TTL.
#[async_trait]
pub trait Lease: Send + Sync {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<(), LeaseError>;

    /// Extend a held lease. Fails when the key is not currently held.
    async fn renew(&self, key: &str, ttl: Duration) -> Result<(), LeaseError>;

    async fn release(&self, key: &str);
}

/// In-process lease table. Advisory only: it does not coordinate across
/// multiple server instances.
#[derive(Debug, Default)]
pub struct MemoryLease {
    held: DashMap<String, Instant>,
}

impl MemoryLease {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Lease for MemoryLease {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<(), LeaseError> {
        let now = Instant::now();
        match self.held.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    warn!(key, "lease contention, rejecting");
                    return Err(LeaseError::Held);
                }
                // Expired: the previous holder crashed or overran its TTL.
                entry.insert(now + ttl);
                Ok(())
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(now + ttl);
                Ok(())
            }
        }
    }

    async fn renew(&self, key: &str, ttl: Duration) -> Result<(), LeaseError> {
        match self.held.get_mut(key) {
            Some(mut expiry) => {
                *expiry = Instant::now() + ttl;
                Ok(())
            }
            None => Err(LeaseError::Backend(anyhow::anyhow!(
                "renew of unheld lease '{key}'"
            ))),
        }
    }

    async fn release(&self, key: &str) {
        self.held.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn second_acquire_is_rejected_not_queued() {
        let lease = MemoryLease::new();
        lease.acquire("item-1", TTL).await.unwrap();
        assert!(matches!(
            lease.acquire("item-1", TTL).await,
            Err(LeaseError::Held)
        ));
        // Different keys are independent.
        lease.acquire("item-2", TTL).await.unwrap();
    }

    #[tokio::test]
    async fn released_keys_can_be_reacquired() {
        let lease = MemoryLease::new();
        lease.acquire("item", TTL).await.unwrap();
        lease.release("item").await;
        lease.acquire("item", TTL).await.unwrap();
    }

    #[tokio::test]
    async fn expired_leases_are_reclaimed() {
        let lease = MemoryLease::new();
        lease
            .acquire("item", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        // The previous holder overran its TTL; acquisition succeeds.
        lease.acquire("item", TTL).await.unwrap();
    }

    #[tokio::test]
    async fn renew_extends_a_held_lease() {
        let lease = MemoryLease::new();
        lease
            .acquire("item", Duration::from_millis(10))
            .await
            .unwrap();
        lease.renew("item", TTL).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(
            lease.acquire("item", TTL).await,
            Err(LeaseError::Held)
        ));
        assert!(lease.renew("missing", TTL).await.is_err());
    }
}
