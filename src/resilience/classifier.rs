//! Outcome classification.
//!
//! # Rules
//! - 2xx/3xx (and 1xx): success
//! - 5xx, timeouts, connect and I/O failures: transient
//! - 4xx and unsendable requests: terminal
//! - Pool exhaustion: rejected (never reached the wire)

use crate::error::{CallError, TransportError};
use crate::http::HttpResponse;

/// Result of one attempt as seen by the middleware chain.
#[derive(Debug)]
pub enum CallOutcome {
    Success(HttpResponse),
    /// Likely temporary; eligible for retry.
    TransientFailure(CallError),
    /// Not worth retrying.
    TerminalFailure(CallError),
    /// Refused before any exchange (open circuit, exhausted pool).
    Rejected(CallError),
}

impl CallOutcome {
    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            CallOutcome::Success(_) => "success",
            CallOutcome::TransientFailure(_) => "transient",
            CallOutcome::TerminalFailure(_) => "terminal",
            CallOutcome::Rejected(_) => "rejected",
        }
    }

    /// Whether the attempt produced an exchange the breaker must record.
    pub fn reached_transport(&self) -> bool {
        !matches!(self, CallOutcome::Rejected(_))
    }

    pub fn into_result(self) -> Result<HttpResponse, CallError> {
        match self {
            CallOutcome::Success(response) => Ok(response),
            CallOutcome::TransientFailure(err)
            | CallOutcome::TerminalFailure(err)
            | CallOutcome::Rejected(err) => Err(err),
        }
    }
}

/// Map a transport result onto a [`CallOutcome`].
pub fn classify(result: Result<HttpResponse, TransportError>) -> CallOutcome {
    match result {
        Ok(response) => classify_response(response),
        Err(TransportError::PoolExhausted(target)) => {
            CallOutcome::Rejected(CallError::PoolExhausted(target))
        }
        Err(err @ TransportError::InvalidRequest(_)) => CallOutcome::TerminalFailure(err.into()),
        Err(err) => CallOutcome::TransientFailure(err.into()),
    }
}

fn classify_response(response: HttpResponse) -> CallOutcome {
    let status = response.status();
    if status.is_server_error() {
        CallOutcome::TransientFailure(CallError::ServerError {
            status,
            body: String::from_utf8_lossy(response.body()).into_owned(),
        })
    } else if status.is_client_error() {
        CallOutcome::TerminalFailure(CallError::TerminalFailure {
            status,
            body: String::from_utf8_lossy(response.body()).into_owned(),
        })
    } else {
        CallOutcome::Success(response)
    }
}
