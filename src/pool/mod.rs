//! Connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Transport needs a connection for a request
//!     → target.rs (scheme/host/port key)
//!     → manager.rs (per-target sub-pool):
//!         - free slot?        take it
//!         - waiters < limit?  wait for a slot
//!         - otherwise         PoolExhausted (fail fast)
//!     → reuse an idle connection (evicting expired/closed ones) or Connect::connect
//!     → Lease handed to the transport
//!     → release() puts it back, dropping it closes it
//! ```
//!
//! # Design Decisions
//! - Bounded waiting is a backpressure contract, not a soft limit
//! - Slots are semaphore permits, waiters an atomic counter
//! - Expiry is checked lazily on acquisition and release, no reaper task
//! - The connector is a trait so the pool is independent of the wire protocol

pub mod connection;
pub mod manager;
pub mod target;

use futures_util::future::BoxFuture;

use crate::error::TransportError;

pub use connection::{ConnectionId, EvictionReason, PooledConnection};
pub use manager::{ConnectionPool, Lease, PoolStats};
pub use target::Target;

/// Opens transport connections for the pool.
pub trait Connect: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open a new connection to `target`.
    fn connect<'a>(
        &'a self,
        target: &'a Target,
    ) -> BoxFuture<'a, Result<Self::Connection, TransportError>>;

    /// Whether a pooled connection can still carry a request.
    fn is_open(&self, _connection: &Self::Connection) -> bool {
        true
    }
}
