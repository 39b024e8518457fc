//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap each phase of an exchange with its own deadline
//! - Cancel the phase cleanly on timeout (the future is dropped)
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors and name the phase

use std::future::Future;
use std::time::Duration;

use crate::error::{TimeoutPhase, TransportError};

/// Per-phase limits of a single exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// TCP connect plus HTTP handshake.
    pub connect: Duration,
    /// Writing the request until the response head arrives.
    pub response: Duration,
    /// Reading the response body.
    pub read: Duration,
}

impl TimeoutConfig {
    /// The same limit for every phase.
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            connect: timeout,
            response: timeout,
            read: timeout,
        }
    }

    fn limit(&self, phase: TimeoutPhase) -> Duration {
        match phase {
            TimeoutPhase::Connect => self.connect,
            TimeoutPhase::Response | TimeoutPhase::Deadline => self.response,
            TimeoutPhase::Read => self.read,
        }
    }

    /// Run `future` under the limit configured for `phase`.
    pub async fn enforce<F: Future>(
        &self,
        phase: TimeoutPhase,
        future: F,
    ) -> Result<F::Output, TransportError> {
        let limit = self.limit(phase);
        tokio::time::timeout(limit, future).await.map_err(|_| {
            tracing::debug!(phase = %phase, limit = ?limit, "Exchange timed out");
            TransportError::Timeout(phase)
        })
    }
}
