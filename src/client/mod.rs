//! Hardened HTTP client.
//!
//! # Data Flow
//! ```text
//! Client::get("/path")
//!     → resolve against the base address, add default headers
//!     → optional call deadline
//!     → middleware chain (retry → breaker → classify → transport)
//!     → HttpResponse or CallError
//! ```
//!
//! # Design Decisions
//! - A built client is immutable; clones share one pool and one breaker
//! - Dropping a call future cancels it, releasing its connection and probe slot
//! - No fallback values; every failure reaches the caller

pub mod builder;
pub mod middleware;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hyper::{HeaderMap, Method, Uri};
use tracing::Instrument;
use url::Url;

use crate::error::{CallError, TimeoutPhase};
use crate::http::{HttpResponse, OutboundRequest};
use crate::observability::metrics;
use crate::pool::{PoolStats, Target};
use crate::resilience::{CircuitBreaker, CircuitState};
use crate::transport::HttpTransport;

pub use builder::ClientBuilder;
pub use middleware::{Handler, Middleware};

/// Handle to a built client. Cheap to clone; safe to share across tasks.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    base: Url,
    default_headers: HeaderMap,
    deadline: Option<Duration>,
    chain: Box<dyn Handler>,
    breaker: Option<Arc<CircuitBreaker>>,
    http: Option<Arc<HttpTransport>>,
}

impl Client {
    pub fn builder(timeout: Duration, base_address: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(timeout, base_address)
    }

    pub fn base_address(&self) -> &Url {
        &self.inner.base
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse, CallError> {
        self.request(Method::GET, path, Bytes::new()).await
    }

    pub async fn head(&self, path: &str) -> Result<HttpResponse, CallError> {
        self.request(Method::HEAD, path, Bytes::new()).await
    }

    pub async fn delete(&self, path: &str) -> Result<HttpResponse, CallError> {
        self.request(Method::DELETE, path, Bytes::new()).await
    }

    pub async fn options(&self, path: &str) -> Result<HttpResponse, CallError> {
        self.request(Method::OPTIONS, path, Bytes::new()).await
    }

    pub async fn post(&self, path: &str, body: impl Into<Bytes>) -> Result<HttpResponse, CallError> {
        self.request(Method::POST, path, body).await
    }

    pub async fn put(&self, path: &str, body: impl Into<Bytes>) -> Result<HttpResponse, CallError> {
        self.request(Method::PUT, path, body).await
    }

    pub async fn patch(&self, path: &str, body: impl Into<Bytes>) -> Result<HttpResponse, CallError> {
        self.request(Method::PATCH, path, body).await
    }

    /// Issue `method` against `path`, resolved relative to the base address.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: impl Into<Bytes>,
    ) -> Result<HttpResponse, CallError> {
        let uri = self.resolve(path)?;
        self.send(OutboundRequest::new(method, uri).with_body(body))
            .await
    }

    /// Run a prepared request through the middleware chain.
    pub async fn send(&self, request: OutboundRequest) -> Result<HttpResponse, CallError> {
        let request = request.with_default_headers(&self.inner.default_headers);
        let span = tracing::debug_span!(
            "call",
            request_id = %request.request_id(),
            method = %request.method(),
            uri = %request.uri(),
        );

        async move {
            let start = std::time::Instant::now();
            let chain = self.inner.chain.call(&request);

            let result = match self.inner.deadline {
                Some(deadline) => match tokio::time::timeout(deadline, chain).await {
                    Ok(outcome) => outcome.into_result(),
                    Err(_) => {
                        tracing::warn!(deadline = ?deadline, "Call deadline exceeded");
                        Err(CallError::Timeout(TimeoutPhase::Deadline))
                    }
                },
                None => chain.await.into_result(),
            };

            let label = match &result {
                Ok(_) => "success",
                Err(err) => err.kind(),
            };
            metrics::record_call(request.method(), label, start);

            match &result {
                Ok(response) => tracing::debug!(status = %response.status(), "Call succeeded"),
                Err(err) => tracing::debug!(error = %err, "Call failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Breaker state, when the client has one.
    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.inner.breaker.as_ref().map(|breaker| breaker.state())
    }

    /// Pool occupancy for `target`, when the client owns the default transport.
    pub fn pool_stats(&self, target: &Target) -> Option<PoolStats> {
        self.inner.http.as_ref().map(|http| http.pool().stats(target))
    }

    /// Absolute URLs pass through; anything else is appended to the base address.
    fn resolve(&self, path: &str) -> Result<Uri, CallError> {
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            let base = self.inner.base.as_str().trim_end_matches('/');
            match path {
                "" => format!("{base}/"),
                p if p.starts_with('/') || p.starts_with('?') => format!("{base}{p}"),
                p => format!("{base}/{p}"),
            }
        };

        url.parse::<Uri>()
            .map_err(|e| CallError::InvalidRequest(format!("`{url}`: {e}")))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_address", &self.inner.base.as_str())
            .field("deadline", &self.inner.deadline)
            .field("circuit_state", &self.circuit_state())
            .finish()
    }
}
