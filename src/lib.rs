//! Resilient HTTP Client Library
//!
//! Outbound HTTP clients hardened against transient downstream failures:
//! a bounded connection pool with per-phase timeouts, a circuit breaker and
//! retries with jittered exponential backoff, composed as an ordered
//! middleware chain around every call.

// Core
pub mod client;
pub mod config;
pub mod error;
pub mod http;

// Connection management
pub mod pool;
pub mod transport;

// Cross-cutting concerns
pub mod observability;
pub mod resilience;

pub use client::{Client, ClientBuilder};
pub use config::ClientSettings;
pub use error::{CallError, TimeoutPhase, TransportError};
pub use http::{HttpResponse, OutboundRequest};
pub use resilience::CircuitState;
