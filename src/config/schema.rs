//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a hardened
//! client. All types derive Serde traits for deserialization from config files;
//! durations are written as integer milliseconds (`*_ms` keys).

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for a client built from a file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientSettings {
    /// Target service, timeouts and default headers.
    pub client: ClientConfig,

    /// Connection pool limits.
    pub pool: PoolConfig,

    /// Retry policy. Absent section means no retry layer.
    pub retry: Option<RetryConfig>,

    /// Circuit breaker. Absent section means no breaker layer.
    pub circuit_breaker: Option<BreakerConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Per-client settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL every request path is resolved against.
    pub base_address: String,

    /// Connect, response and read timeout of a single attempt.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,

    /// Optional bound on a whole logical call, backoff and retries included.
    #[serde(
        rename = "deadline_ms",
        with = "option_duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub deadline: Option<Duration>,

    /// Headers added to every request unless the request sets them itself.
    pub headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_address: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(5),
            deadline: None,
            headers: BTreeMap::new(),
        }
    }
}

/// Connection pool limits, applied per target (scheme, host, port).
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum live connections per target.
    pub max_connections: usize,

    /// Callers allowed to wait for a free connection before failing fast.
    pub max_pending_acquisitions: usize,

    /// Idle connections older than this are closed instead of reused.
    #[serde(rename = "max_idle_time_ms", with = "duration_ms")]
    pub max_idle_time: Duration,

    /// Connections older than this are closed instead of reused.
    #[serde(rename = "max_lifetime_ms", with = "duration_ms")]
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_pending_acquisitions: 500,
            max_idle_time: Duration::from_secs(20),
            max_lifetime: Duration::from_secs(60),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts after the first one.
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each following retry.
    #[serde(rename = "min_backoff_ms", with = "duration_ms")]
    pub min_backoff: Duration,

    /// Relative spread of each delay, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::from_millis(100),
            jitter: 0.5,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failure percentage, in `(0, 100]`, at which the circuit opens.
    pub failure_rate_threshold: f32,

    /// Time spent open before probes are let through.
    #[serde(rename = "wait_duration_open_ms", with = "duration_ms")]
    pub wait_duration_open: Duration,

    /// Probe calls admitted while half-open.
    pub permitted_calls_half_open: u32,

    /// Number of most recent outcomes the failure rate is computed over.
    pub sliding_window_size: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            wait_duration_open: Duration::from_secs(60),
            permitted_calls_half_open: 10,
            sliding_window_size: 100,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod option_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => super::duration_ms::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}
