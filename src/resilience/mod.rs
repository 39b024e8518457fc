//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt result from the transport:
//!     → classifier.rs (success / transient / terminal / rejected)
//!     → circuit_breaker.rs (record outcome, gate the next attempt)
//!     → retries.rs (retry transient failures after backoff.rs delay)
//! ```
//!
//! # Design Decisions
//! - Every attempt, retries included, passes the breaker gate
//! - Retries only for transient failures
//! - The pieces are plain values; `client::middleware` composes them

pub mod backoff;
pub mod circuit_breaker;
pub mod classifier;
pub mod retries;

pub use circuit_breaker::{CircuitBreaker, CircuitState, Permit};
pub use classifier::{classify, CallOutcome};
pub use retries::RetryPolicy;
