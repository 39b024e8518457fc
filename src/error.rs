//! Error taxonomy for outbound calls.
//!
//! # Categories
//! - Transient: 5xx, timeouts, connect and I/O failures (retryable, counted by the breaker)
//! - Terminal: 4xx, malformed requests, exhausted retries (never retried)
//! - Admission: circuit open, pool exhausted (rejected before any exchange)

use std::fmt;

use hyper::StatusCode;

/// The stage of an exchange that ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// TCP connect and HTTP handshake.
    Connect,
    /// Sending the request and waiting for the response head.
    Response,
    /// Reading the response body.
    Read,
    /// The overall deadline of a logical call, retries included.
    Deadline,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            TimeoutPhase::Connect => "connect",
            TimeoutPhase::Response => "response",
            TimeoutPhase::Read => "read",
            TimeoutPhase::Deadline => "call deadline",
        };
        f.write_str(phase)
    }
}

/// Failure raised by the pool or the transport for a single exchange.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("connection pool exhausted for {0}")]
    PoolExhausted(String),

    #[error("{0} timeout")]
    Timeout(TimeoutPhase),

    #[error("failed to connect to {target}: {reason}")]
    Connect { target: String, reason: String },

    #[error("I/O failure: {0}")]
    Io(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Failure surfaced to the caller of a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// The circuit breaker rejected the call without reaching the transport.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// No pooled connection could be acquired and the wait queue was full.
    #[error("connection pool exhausted for {0}")]
    PoolExhausted(String),

    #[error("{0} timeout")]
    Timeout(TimeoutPhase),

    #[error("connect failure: {0}")]
    ConnectFailure(String),

    #[error("I/O failure: {0}")]
    Io(String),

    /// A 5xx response, surfaced as-is when no retry layer is installed.
    #[error("server error {status}: {body}")]
    ServerError { status: StatusCode, body: String },

    /// A 4xx response. Never retried.
    #[error("terminal failure {status}: {body}")]
    TerminalFailure { status: StatusCode, body: String },

    #[error("retries exhausted after {attempts} attempts: {last_cause}")]
    RetryExhausted {
        attempts: u32,
        last_cause: Box<CallError>,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl CallError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::CircuitOpen => "circuit_open",
            CallError::PoolExhausted(_) => "pool_exhausted",
            CallError::Timeout(_) => "timeout",
            CallError::ConnectFailure(_) => "connect_failure",
            CallError::Io(_) => "io",
            CallError::ServerError { .. } => "server_error",
            CallError::TerminalFailure { .. } => "terminal_failure",
            CallError::RetryExhausted { .. } => "retry_exhausted",
            CallError::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Status code carried by the error, if the call produced a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            CallError::ServerError { status, .. } | CallError::TerminalFailure { status, .. } => {
                Some(*status)
            }
            CallError::RetryExhausted { last_cause, .. } => last_cause.status(),
            _ => None,
        }
    }
}

impl From<TransportError> for CallError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::PoolExhausted(target) => CallError::PoolExhausted(target),
            TransportError::Timeout(phase) => CallError::Timeout(phase),
            TransportError::Connect { target, reason } => {
                CallError::ConnectFailure(format!("{target}: {reason}"))
            }
            TransportError::Io(reason) => CallError::Io(reason),
            TransportError::InvalidRequest(reason) => CallError::InvalidRequest(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_map_onto_call_errors() {
        let err: CallError = TransportError::Timeout(TimeoutPhase::Read).into();
        assert_eq!(err, CallError::Timeout(TimeoutPhase::Read));

        let err: CallError = TransportError::Connect {
            target: "127.0.0.1:1".into(),
            reason: "refused".into(),
        }
        .into();
        assert_eq!(err.kind(), "connect_failure");
    }

    #[test]
    fn exhausted_retries_expose_last_status() {
        let err = CallError::RetryExhausted {
            attempts: 3,
            last_cause: Box::new(CallError::ServerError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "boom".into(),
            }),
        };
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(err.to_string().contains("after 3 attempts"));
    }
}
