//! Pooled connection handle and its age bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::PoolConfig;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Why a connection was closed instead of handed out again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    Idle,
    Lifetime,
    Closed,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Idle => "idle",
            EvictionReason::Lifetime => "lifetime",
            EvictionReason::Closed => "closed",
        }
    }
}

/// A transport connection owned by the pool.
#[derive(Debug)]
pub struct PooledConnection<T> {
    id: ConnectionId,
    inner: T,
    created_at: Instant,
    last_used: Instant,
}

impl<T> PooledConnection<T> {
    pub fn new(inner: T) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            inner,
            created_at: now,
            last_used: now,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used)
    }

    /// Mark the connection as just used.
    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    /// Returns the reason this connection must not be reused, if any.
    pub fn expiry(&self, config: &PoolConfig, now: Instant) -> Option<EvictionReason> {
        if self.age(now) >= config.max_lifetime {
            Some(EvictionReason::Lifetime)
        } else if self.idle_for(now) >= config.max_idle_time {
            Some(EvictionReason::Idle)
        } else {
            None
        }
    }
}
