//! Metrics collection.
//!
//! # Metrics
//! - `client_calls_total` (counter): logical calls by method, result
//! - `client_call_duration_seconds` (histogram): latency of a logical call, retries included
//! - `client_attempts_total` (counter): transport attempts by outcome
//! - `client_retries_total` (counter): scheduled retries
//! - `client_circuit_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `client_circuit_rejections_total` (counter): calls refused by an open circuit
//! - `client_pool_exhausted_total` (counter): acquisitions refused by the pool
//! - `client_pool_connections_created_total` (counter): new transport connections
//! - `client_pool_evictions_total` (counter): connections closed instead of reused, by reason
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder they cost nothing
//! - Labels for method, peer, breaker name and outcome

use std::time::Instant;

use hyper::Method;

use crate::resilience::circuit_breaker::CircuitState;

pub fn record_call(method: &Method, result: &'static str, start_time: Instant) {
    let duration = start_time.elapsed().as_secs_f64();

    ::metrics::counter!(
        "client_calls_total",
        "method" => method.to_string(),
        "result" => result
    )
    .increment(1);

    ::metrics::histogram!(
        "client_call_duration_seconds",
        "method" => method.to_string()
    )
    .record(duration);
}

pub fn record_attempt(outcome: &'static str) {
    ::metrics::counter!("client_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_retry() {
    ::metrics::counter!("client_retries_total").increment(1);
}

pub fn record_circuit_state(breaker: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    };
    ::metrics::gauge!("client_circuit_state", "breaker" => breaker.to_string()).set(value);
}

pub fn record_circuit_rejection(breaker: &str) {
    ::metrics::counter!(
        "client_circuit_rejections_total",
        "breaker" => breaker.to_string()
    )
    .increment(1);
}

pub fn record_pool_exhausted(peer: &str) {
    ::metrics::counter!("client_pool_exhausted_total", "peer" => peer.to_string()).increment(1);
}

pub fn record_connection_created(peer: &str) {
    ::metrics::counter!(
        "client_pool_connections_created_total",
        "peer" => peer.to_string()
    )
    .increment(1);
}

pub fn record_eviction(peer: &str, reason: &'static str) {
    ::metrics::counter!(
        "client_pool_evictions_total",
        "peer" => peer.to_string(),
        "reason" => reason
    )
    .increment(1);
}
