//! Connection pool management.
//!
//! # Responsibilities
//! - Keep one bounded sub-pool per target
//! - Hand out idle connections before opening new ones
//! - Close connections past their idle time or lifetime instead of reusing them
//! - Fail fast once live connections and waiters are both at their limits

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::error::TransportError;
use crate::observability::metrics;
use crate::pool::connection::{EvictionReason, PooledConnection};
use crate::pool::target::Target;
use crate::pool::Connect;

/// Point-in-time view of one target's sub-pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections waiting in the pool for reuse.
    pub idle: usize,
    /// Connections currently handed out.
    pub leased: usize,
    /// Callers waiting for a free connection.
    pub pending: usize,
}

/// Per-target state.
struct TargetPool<T> {
    target: Target,
    /// One permit per live connection slot.
    slots: Arc<Semaphore>,
    max_connections: usize,
    /// Callers currently waiting on `slots`.
    pending: AtomicUsize,
    /// Most recently released connection last.
    idle: Mutex<Vec<PooledConnection<T>>>,
}

impl<T> TargetPool<T> {
    fn new(target: Target, max_connections: usize) -> Self {
        Self {
            target,
            slots: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            pending: AtomicUsize::new(0),
            idle: Mutex::new(Vec::new()),
        }
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<PooledConnection<T>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to register as a waiter. Returns a guard that deregisters on drop.
    fn try_enqueue(&self, max_pending: usize) -> Option<PendingGuard<'_>> {
        let mut prev = self.pending.load(Ordering::Relaxed);
        loop {
            if prev >= max_pending {
                return None;
            }
            match self.pending.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        Some(PendingGuard {
            pending: &self.pending,
        })
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.lock_idle().len(),
            leased: self.max_connections - self.slots.available_permits(),
            pending: self.pending.load(Ordering::Acquire),
        }
    }
}

/// A RAII guard that manages the waiter count.
struct PendingGuard<'a> {
    pending: &'a AtomicUsize,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A connection checked out of the pool.
///
/// Hand it back with [`ConnectionPool::release`] once the exchange completed.
/// Dropping it instead (error, timeout, cancellation) closes the connection
/// and frees its slot.
pub struct Lease<T> {
    connection: Option<PooledConnection<T>>,
    reused: bool,
    shared: Arc<TargetPool<T>>,
    _permit: OwnedSemaphorePermit,
}

impl<T> Lease<T> {
    /// Whether the connection served an earlier exchange.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub fn target(&self) -> &Target {
        &self.shared.target
    }

    /// The underlying connection. `None` only after a failed reconnect.
    pub fn connection_mut(&mut self) -> Option<&mut T> {
        self.connection.as_mut().map(PooledConnection::get_mut)
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            tracing::debug!(
                peer = %self.shared.target,
                connection_id = %conn.id(),
                "Discarding connection that was not released"
            );
        }
    }
}

/// Bounded, per-target pool of transport connections.
pub struct ConnectionPool<C: Connect> {
    connector: C,
    config: PoolConfig,
    targets: DashMap<Target, Arc<TargetPool<C::Connection>>>,
}

impl<C: Connect> ConnectionPool<C> {
    /// Create a pool opening connections through `connector`.
    pub fn new(connector: C, config: PoolConfig) -> Self {
        Self {
            connector,
            config,
            targets: DashMap::new(),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn target_pool(&self, target: &Target) -> Arc<TargetPool<C::Connection>> {
        let entry = self
            .targets
            .entry(target.clone())
            .or_insert_with(|| Arc::new(TargetPool::new(target.clone(), self.config.max_connections)));
        Arc::clone(entry.value())
    }

    /// Check out a connection to `target`.
    ///
    /// Waits for a free slot only while fewer than `max_pending_acquisitions`
    /// callers are already waiting; otherwise fails with `PoolExhausted`.
    pub async fn acquire(&self, target: &Target) -> Result<Lease<C::Connection>, TransportError> {
        let shared = self.target_pool(target);

        let permit = match Arc::clone(&shared.slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let Some(_waiting) = shared.try_enqueue(self.config.max_pending_acquisitions) else {
                    tracing::warn!(
                        peer = %target,
                        max_connections = self.config.max_connections,
                        max_pending = self.config.max_pending_acquisitions,
                        "Connection pool exhausted"
                    );
                    metrics::record_pool_exhausted(&target.to_string());
                    return Err(TransportError::PoolExhausted(target.to_string()));
                };
                Arc::clone(&shared.slots)
                    .acquire_owned()
                    .await
                    .map_err(|_| TransportError::PoolExhausted(target.to_string()))?
            }
        };

        if let Some(conn) = self.checkout_idle(&shared) {
            tracing::debug!(peer = %target, connection_id = %conn.id(), "Reusing pooled connection");
            return Ok(Lease {
                connection: Some(conn),
                reused: true,
                shared,
                _permit: permit,
            });
        }

        let conn = self.open(target).await?;
        Ok(Lease {
            connection: Some(conn),
            reused: false,
            shared,
            _permit: permit,
        })
    }

    /// Return a connection for reuse. Expired or closed connections are dropped.
    pub fn release(&self, mut lease: Lease<C::Connection>) {
        let Some(mut conn) = lease.connection.take() else {
            return;
        };

        let eviction = if self.connector.is_open(conn.get_ref()) {
            conn.expiry(&self.config, Instant::now())
        } else {
            Some(EvictionReason::Closed)
        };

        match eviction {
            None => {
                conn.touch();
                lease.shared.lock_idle().push(conn);
            }
            Some(reason) => self.evict(&lease.shared.target, conn, reason),
        }
        // The slot is freed when `lease` drops, after the connection is back in `idle`.
    }

    /// Replace the leased connection with a freshly opened one, keeping the slot.
    pub async fn reconnect(&self, lease: &mut Lease<C::Connection>) -> Result<(), TransportError> {
        if let Some(stale) = lease.connection.take() {
            self.evict(&lease.shared.target, stale, EvictionReason::Closed);
        }
        let fresh = self.open(&lease.shared.target).await?;
        lease.connection = Some(fresh);
        lease.reused = false;
        Ok(())
    }

    /// Current counts for `target`; all zero if it was never used.
    pub fn stats(&self, target: &Target) -> PoolStats {
        self.targets
            .get(target)
            .map(|shared| shared.stats())
            .unwrap_or_default()
    }

    async fn open(&self, target: &Target) -> Result<PooledConnection<C::Connection>, TransportError> {
        let connection = self.connector.connect(target).await?;
        let conn = PooledConnection::new(connection);
        tracing::debug!(peer = %target, connection_id = %conn.id(), "Opened new connection");
        metrics::record_connection_created(&target.to_string());
        Ok(conn)
    }

    fn checkout_idle(
        &self,
        shared: &TargetPool<C::Connection>,
    ) -> Option<PooledConnection<C::Connection>> {
        let now = Instant::now();
        let mut idle = shared.lock_idle();
        while let Some(conn) = idle.pop() {
            let eviction = if self.connector.is_open(conn.get_ref()) {
                conn.expiry(&self.config, now)
            } else {
                Some(EvictionReason::Closed)
            };
            match eviction {
                None => return Some(conn),
                Some(reason) => self.evict(&shared.target, conn, reason),
            }
        }
        None
    }

    fn evict(&self, target: &Target, conn: PooledConnection<C::Connection>, reason: EvictionReason) {
        tracing::debug!(
            peer = %target,
            connection_id = %conn.id(),
            reason = reason.as_str(),
            "Evicting pooled connection"
        );
        metrics::record_eviction(&target.to_string(), reason.as_str());
        drop(conn);
    }
}
