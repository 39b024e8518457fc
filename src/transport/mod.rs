//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! OutboundRequest
//!     → http.rs (acquire pooled connection, send, read body)
//!     → timeouts.rs (connect / response / read deadlines)
//!     → HttpResponse or TransportError
//! ```
//!
//! # Design Decisions
//! - One exchange per call; retries live in the middleware chain, not here
//! - Timeouts are non-negotiable; every phase has a deadline
//! - The network stack sits behind the `Transport` trait so it can be replaced

pub mod http;
pub mod timeouts;

use futures_util::future::BoxFuture;

use crate::error::TransportError;
use crate::http::{HttpResponse, OutboundRequest};

pub use self::http::{HttpConnector, HttpTransport};
pub use timeouts::TimeoutConfig;

/// Issues a single request/response exchange.
pub trait Transport: Send + Sync + 'static {
    fn execute<'a>(
        &'a self,
        request: &'a OutboundRequest,
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>>;
}
