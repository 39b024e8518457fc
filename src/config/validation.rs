//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, jitter within [0, 1], ...)
//! - Check the base address and default headers are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientSettings → Result<(), Vec<ValidationError>>
//! - Runs before a client is built, whether from a file or the builder

use hyper::header::{HeaderName, HeaderValue};
use tokio::sync::Semaphore;
use url::Url;

use crate::config::schema::{BreakerConfig, ClientConfig, ClientSettings, PoolConfig, RetryConfig};

/// A single violated rule.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("client.base_address `{0}` is not an absolute http(s) URL")]
    InvalidBaseAddress(String),

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} must be within {range}, got {value}")]
    OutOfRange {
        field: &'static str,
        range: &'static str,
        value: f64,
    },

    #[error("header `{0}` is not a valid HTTP header")]
    InvalidHeader(String),
}

/// Validate a whole settings file.
pub fn validate_config(config: &ClientSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_client(&config.client, &mut errors);
    validate_pool(&config.pool, &mut errors);
    if let Some(retry) = &config.retry {
        validate_retry(retry, &mut errors);
    }
    if let Some(breaker) = &config.circuit_breaker {
        validate_breaker(breaker, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn validate_client(config: &ClientConfig, errors: &mut Vec<ValidationError>) {
    match Url::parse(&config.base_address) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        _ => errors.push(ValidationError::InvalidBaseAddress(config.base_address.clone())),
    }

    if config.timeout.is_zero() {
        errors.push(ValidationError::NotPositive {
            field: "client.timeout_ms",
        });
    }
    if config.deadline.is_some_and(|d| d.is_zero()) {
        errors.push(ValidationError::NotPositive {
            field: "client.deadline_ms",
        });
    }

    for (name, value) in &config.headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err()
            || HeaderValue::from_str(value).is_err()
        {
            errors.push(ValidationError::InvalidHeader(name.clone()));
        }
    }
}

pub fn validate_pool(config: &PoolConfig, errors: &mut Vec<ValidationError>) {
    if config.max_connections == 0 {
        errors.push(ValidationError::NotPositive {
            field: "pool.max_connections",
        });
    } else if config.max_connections > Semaphore::MAX_PERMITS {
        errors.push(ValidationError::OutOfRange {
            field: "pool.max_connections",
            range: "[1, 2^61 - 1]",
            value: config.max_connections as f64,
        });
    }
    if config.max_idle_time.is_zero() {
        errors.push(ValidationError::NotPositive {
            field: "pool.max_idle_time_ms",
        });
    }
    if config.max_lifetime.is_zero() {
        errors.push(ValidationError::NotPositive {
            field: "pool.max_lifetime_ms",
        });
    }
}

pub fn validate_retry(config: &RetryConfig, errors: &mut Vec<ValidationError>) {
    if config.min_backoff.is_zero() {
        errors.push(ValidationError::NotPositive {
            field: "retry.min_backoff_ms",
        });
    }
    if !(0.0..=1.0).contains(&config.jitter) {
        errors.push(ValidationError::OutOfRange {
            field: "retry.jitter",
            range: "[0, 1]",
            value: config.jitter,
        });
    }
}

pub fn validate_breaker(config: &BreakerConfig, errors: &mut Vec<ValidationError>) {
    let threshold = config.failure_rate_threshold;
    if !(threshold > 0.0 && threshold <= 100.0) {
        errors.push(ValidationError::OutOfRange {
            field: "circuit_breaker.failure_rate_threshold",
            range: "(0, 100]",
            value: f64::from(threshold),
        });
    }
    if config.wait_duration_open.is_zero() {
        errors.push(ValidationError::NotPositive {
            field: "circuit_breaker.wait_duration_open_ms",
        });
    }
    if config.permitted_calls_half_open == 0 {
        errors.push(ValidationError::NotPositive {
            field: "circuit_breaker.permitted_calls_half_open",
        });
    }
    if config.sliding_window_size == 0 {
        errors.push(ValidationError::NotPositive {
            field: "circuit_breaker.sliding_window_size",
        });
    }
}
