//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pool, transport, breaker, retry layer, client:
//!     → logging.rs (structured log events, request id on every call)
//!     → metrics.rs (counters, gauges, histograms)
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Request ID flows through every attempt of a logical call
//! - Metrics are cheap (facade macros, no-op without a recorder)

pub mod logging;
pub mod metrics;
