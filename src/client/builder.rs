//! Client construction.
//!
//! # Responsibilities
//! - Collect optional layers and settings in any order
//! - Validate everything once, in `build`
//! - Assemble the chain in a fixed order: classifier, breaker, retry
//!
//! Each `with_*` call replaces whatever the previous call of the same
//! method configured.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use hyper::header::{HeaderName, HeaderValue};
use hyper::HeaderMap;
use url::Url;

use crate::client::middleware::{compose, Middleware};
use crate::client::{Client, ClientInner};
use crate::config::validation::validate_config;
use crate::config::{
    BreakerConfig, ClientConfig, ClientSettings, ConfigError, PoolConfig, RetryConfig,
    ValidationError,
};
use crate::resilience::{CircuitBreaker, RetryPolicy};
use crate::transport::{HttpTransport, TimeoutConfig, Transport};

/// Immutable recipe for a [`Client`]; cheap to clone and reuse.
#[derive(Clone)]
pub struct ClientBuilder {
    settings: ClientSettings,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// `timeout` bounds connect, response and read of every attempt.
    pub fn new(timeout: Duration, base_address: impl Into<String>) -> Self {
        Self {
            settings: ClientSettings {
                client: ClientConfig {
                    base_address: base_address.into(),
                    timeout,
                    ..ClientConfig::default()
                },
                ..ClientSettings::default()
            },
            transport: None,
        }
    }

    /// Start from a loaded settings file.
    pub fn from_config(settings: &ClientSettings) -> Self {
        Self {
            settings: settings.clone(),
            transport: None,
        }
    }

    /// Headers added to every request that does not set them itself.
    pub fn with_headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.settings.client.headers = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<BTreeMap<_, _>>();
        self
    }

    /// Retry transient failures up to `max_attempts` times after the first attempt.
    pub fn with_retry(mut self, max_attempts: u8, min_backoff: Duration, jitter: f64) -> Self {
        self.settings.retry = Some(RetryConfig {
            max_attempts: u32::from(max_attempts),
            min_backoff,
            jitter,
        });
        self
    }

    pub fn with_circuit_breaker(
        mut self,
        failure_rate_threshold: f32,
        wait_duration_open: Duration,
        permitted_calls_half_open: u32,
        sliding_window_size: u32,
    ) -> Self {
        self.settings.circuit_breaker = Some(BreakerConfig {
            failure_rate_threshold,
            wait_duration_open,
            permitted_calls_half_open,
            sliding_window_size,
        });
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.settings.pool = pool;
        self
    }

    /// Bound a whole logical call, backoff and retries included.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.settings.client.deadline = Some(deadline);
        self
    }

    /// Replace the pooled HTTP transport.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Validate the configuration and assemble the client.
    pub fn build(&self) -> Result<Client, ConfigError> {
        validate_config(&self.settings).map_err(ConfigError::Validation)?;

        let client = &self.settings.client;
        let base = Url::parse(&client.base_address).map_err(|_| {
            ConfigError::Validation(vec![ValidationError::InvalidBaseAddress(
                client.base_address.clone(),
            )])
        })?;
        let default_headers = header_map(&client.headers)?;

        let (transport, http) = match &self.transport {
            Some(transport) => (transport.clone(), None),
            None => {
                let http = Arc::new(HttpTransport::new(
                    self.settings.pool,
                    TimeoutConfig::uniform(client.timeout),
                ));
                (http.clone() as Arc<dyn Transport>, Some(http))
            }
        };

        let breaker = self
            .settings
            .circuit_breaker
            .map(|config| Arc::new(CircuitBreaker::new(base.as_str(), config)));

        let mut layers = Vec::new();
        if let Some(breaker) = &breaker {
            layers.push(Middleware::CircuitBreaker(breaker.clone()));
        }
        if let Some(retry) = self.settings.retry {
            layers.push(Middleware::Retry(RetryPolicy::new(retry)));
        }

        tracing::debug!(
            base_address = %base,
            retry = self.settings.retry.is_some(),
            circuit_breaker = breaker.is_some(),
            deadline = ?client.deadline,
            "Client built"
        );

        Ok(Client {
            inner: Arc::new(ClientInner {
                base,
                default_headers,
                deadline: client.deadline,
                chain: compose(transport, layers),
                breaker,
                http,
            }),
        })
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ConfigError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let invalid = || ConfigError::Validation(vec![ValidationError::InvalidHeader(name.clone())]);
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        map.insert(name, value);
    }
    Ok(map)
}
