//! Middleware chain around the transport.
//!
//! # Layering
//! ```text
//! Retry            (loops while the outcome is transient)
//!   → CircuitBreaker (gates and records every attempt)
//!     → Classify     (turns transport results into CallOutcome)
//!       → Transport
//! ```
//!
//! The chain is built by folding an ordered list of [`Middleware`] over the
//! innermost handler; the first element ends up closest to the transport.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::CallError;
use crate::http::OutboundRequest;
use crate::observability::metrics;
use crate::resilience::{classify, CallOutcome, CircuitBreaker, RetryPolicy};
use crate::transport::Transport;

/// One layer of the chain: runs a request and reports its outcome.
pub trait Handler: Send + Sync {
    fn call<'a>(&'a self, request: &'a OutboundRequest) -> BoxFuture<'a, CallOutcome>;
}

/// Innermost layer: a single transport exchange, classified.
pub struct Classify {
    transport: Arc<dyn Transport>,
}

impl Classify {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl Handler for Classify {
    fn call<'a>(&'a self, request: &'a OutboundRequest) -> BoxFuture<'a, CallOutcome> {
        Box::pin(async move {
            let outcome = classify(self.transport.execute(request).await);
            metrics::record_attempt(outcome.label());
            outcome
        })
    }
}

/// Gates each attempt on the breaker and records what reached the transport.
pub struct BreakerLayer {
    breaker: Arc<CircuitBreaker>,
    inner: Box<dyn Handler>,
}

impl Handler for BreakerLayer {
    fn call<'a>(&'a self, request: &'a OutboundRequest) -> BoxFuture<'a, CallOutcome> {
        Box::pin(async move {
            let permit = match self.breaker.try_acquire() {
                Ok(permit) => permit,
                Err(err) => return CallOutcome::Rejected(err),
            };

            let outcome = self.inner.call(request).await;
            if !outcome.reached_transport() {
                drop(permit);
            } else if matches!(outcome, CallOutcome::Success(_)) {
                permit.record_success();
            } else {
                permit.record_failure();
            }
            outcome
        })
    }
}

/// Re-runs the inner chain after transient failures.
pub struct RetryLayer {
    policy: RetryPolicy,
    inner: Box<dyn Handler>,
}

impl Handler for RetryLayer {
    fn call<'a>(&'a self, request: &'a OutboundRequest) -> BoxFuture<'a, CallOutcome> {
        Box::pin(async move {
            let mut retries = 0;
            loop {
                let outcome = self.inner.call(request).await;

                if let Some(delay) = self.policy.next_delay(retries, &outcome) {
                    retries += 1;
                    tracing::info!(
                        request_id = %request.request_id(),
                        retry = retries,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        cause = outcome_cause(&outcome),
                        "Retrying after transient failure"
                    );
                    metrics::record_retry();
                    tokio::time::sleep(delay).await;
                    continue;
                }

                return match outcome {
                    CallOutcome::TransientFailure(cause) if self.policy.max_attempts() > 0 => {
                        let attempts = retries + 1;
                        tracing::warn!(
                            request_id = %request.request_id(),
                            attempts,
                            cause = %cause,
                            "Retries exhausted"
                        );
                        CallOutcome::TerminalFailure(CallError::RetryExhausted {
                            attempts,
                            last_cause: Box::new(cause),
                        })
                    }
                    other => other,
                };
            }
        })
    }
}

fn outcome_cause(outcome: &CallOutcome) -> &'static str {
    match outcome {
        CallOutcome::TransientFailure(err)
        | CallOutcome::TerminalFailure(err)
        | CallOutcome::Rejected(err) => err.kind(),
        CallOutcome::Success(_) => "none",
    }
}

/// A layer that can be stacked on top of the chain.
#[derive(Debug, Clone)]
pub enum Middleware {
    CircuitBreaker(Arc<CircuitBreaker>),
    Retry(RetryPolicy),
}

impl Middleware {
    pub fn wrap(self, inner: Box<dyn Handler>) -> Box<dyn Handler> {
        match self {
            Middleware::CircuitBreaker(breaker) => Box::new(BreakerLayer { breaker, inner }),
            Middleware::Retry(policy) => Box::new(RetryLayer { policy, inner }),
        }
    }
}

/// Fold `layers` over the classified transport, innermost first.
pub fn compose(transport: Arc<dyn Transport>, layers: Vec<Middleware>) -> Box<dyn Handler> {
    layers
        .into_iter()
        .fold(Box::new(Classify::new(transport)) as Box<dyn Handler>, |inner, layer| {
            layer.wrap(inner)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use bytes::Bytes;
    use hyper::{Method, Response};

    use crate::config::{BreakerConfig, RetryConfig};
    use crate::error::{TimeoutPhase, TransportError};
    use crate::http::HttpResponse;
    use crate::resilience::CircuitState;

    /// Replays scripted results, repeating the last one, and counts calls.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<u16, TransportError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<u16, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl Transport for ScriptedTransport {
        fn execute<'a>(
            &'a self,
            _request: &'a OutboundRequest,
        ) -> BoxFuture<'a, Result<HttpResponse, TransportError>> {
            Box::pin(async move {
                *self.calls.lock().unwrap() += 1;
                let mut script = self.script.lock().unwrap();
                let next = if script.len() > 1 {
                    script.pop_front().unwrap()
                } else {
                    script.front().cloned().unwrap()
                };
                next.map(|status| {
                    Response::builder()
                        .status(status)
                        .body(Bytes::from_static(b"body"))
                        .unwrap()
                })
            })
        }
    }

    fn retry(max_attempts: u32) -> Middleware {
        Middleware::Retry(RetryPolicy::new(RetryConfig {
            max_attempts,
            min_backoff: Duration::from_millis(50),
            jitter: 0.5,
        }))
    }

    fn breaker(window: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "test",
            BreakerConfig {
                failure_rate_threshold: 50.0,
                wait_duration_open: Duration::from_millis(200),
                permitted_calls_half_open: 1,
                sliding_window_size: window,
            },
        ))
    }

    fn request() -> OutboundRequest {
        OutboundRequest::new(Method::GET, "http://127.0.0.1:9/".parse().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_transient_failure_makes_max_attempts_plus_one_calls() {
        let transport = ScriptedTransport::new(vec![Ok(500)]);
        let chain = compose(transport.clone(), vec![retry(2)]);

        let err = chain.call(&request()).await.into_result().unwrap_err();
        assert_eq!(transport.calls(), 3);
        match err {
            CallError::RetryExhausted { attempts, last_cause } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_cause.kind(), "server_error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let transport = ScriptedTransport::new(vec![Ok(503), Ok(503), Ok(200)]);
        let chain = compose(transport.clone(), vec![retry(3)]);

        let response = chain.call(&request()).await.into_result().unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failure_is_not_retried_but_is_recorded() {
        let transport = ScriptedTransport::new(vec![Ok(404)]);
        let breaker = breaker(1);
        let chain = compose(
            transport.clone(),
            vec![Middleware::CircuitBreaker(breaker.clone()), retry(3)],
        );

        let err = chain.call(&request()).await.into_result().unwrap_err();
        assert_eq!(err.status().map(|s| s.as_u16()), Some(404));
        assert_eq!(transport.calls(), 1);

        // The 404 filled the one-slot window; the next outcome opens the breaker.
        let _ = chain.call(&request()).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_trip_mid_sequence_stops_retries() {
        let transport = ScriptedTransport::new(vec![Ok(500)]);
        let breaker = breaker(2);
        let chain = compose(
            transport.clone(),
            vec![Middleware::CircuitBreaker(breaker.clone()), retry(5)],
        );

        let err = chain.call(&request()).await.into_result().unwrap_err();
        assert_eq!(err, CallError::CircuitOpen);
        // Two failures fill the window, the third trips it, the fourth is rejected.
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_sees_every_retry_attempt() {
        let transport = ScriptedTransport::new(vec![Ok(500)]);
        let breaker = breaker(2);
        let chain = compose(
            transport.clone(),
            vec![Middleware::CircuitBreaker(breaker.clone()), retry(2)],
        );

        let err = chain.call(&request()).await.into_result().unwrap_err();
        assert!(matches!(err, CallError::RetryExhausted { attempts: 3, .. }));
        assert_eq!(transport.calls(), 3);
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = chain.call(&request()).await.into_result().unwrap_err();
        assert_eq!(err, CallError::CircuitOpen);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn pool_exhaustion_is_neither_retried_nor_recorded() {
        let transport =
            ScriptedTransport::new(vec![Err(TransportError::PoolExhausted("http://a:80".into()))]);
        let breaker = breaker(1);
        let chain = compose(
            transport.clone(),
            vec![Middleware::CircuitBreaker(breaker.clone()), retry(3)],
        );

        for _ in 0..3 {
            let err = chain.call(&request()).await.into_result().unwrap_err();
            assert!(matches!(err, CallError::PoolExhausted(_)));
        }
        assert_eq!(transport.calls(), 3);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn without_retry_transient_errors_surface_directly() {
        let transport =
            ScriptedTransport::new(vec![Err(TransportError::Timeout(TimeoutPhase::Response))]);
        let chain = compose(transport.clone(), vec![retry(0)]);

        let err = chain.call(&request()).await.into_result().unwrap_err();
        assert_eq!(err, CallError::Timeout(TimeoutPhase::Response));

        let chain = compose(transport.clone(), Vec::new());
        let err = chain.call(&request()).await.into_result().unwrap_err();
        assert_eq!(err, CallError::Timeout(TimeoutPhase::Response));
        assert_eq!(transport.calls(), 2);
    }
}
