//! Outbound request representation.
//!
//! # Responsibilities
//! - Carry method, absolute URI, headers and a buffered body
//! - Generate a unique request ID (UUID v4) unless the caller set one
//! - Convert to a hyper request in origin form for a given target

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderName, HeaderValue, HOST};
use hyper::{HeaderMap, Method, Request, Uri};
use uuid::Uuid;

use crate::error::TransportError;
use crate::pool::Target;

/// Header carrying the correlation id of a logical call.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// A request that can be sent any number of times (retries reuse it).
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    request_id: String,
}

impl OutboundRequest {
    /// Build a request to an absolute `uri`.
    pub fn new(method: Method, uri: Uri) -> Self {
        let request_id = Uuid::new_v4().to_string();
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
        Self {
            method,
            uri,
            headers,
            body: Bytes::new(),
            request_id,
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a header, replacing any previous value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if name == REQUEST_ID_HEADER {
            if let Ok(id) = value.to_str() {
                self.request_id = id.to_string();
            }
        }
        self.headers.insert(name, value);
        self
    }

    /// Add headers that are not already set on the request.
    pub fn with_default_headers(mut self, defaults: &HeaderMap) -> Self {
        for (name, value) in defaults {
            if !self.headers.contains_key(name) {
                self.headers.insert(name.clone(), value.clone());
            }
        }
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Build the hyper request for one attempt: origin-form URI plus `Host`.
    pub fn to_hyper(&self, target: &Target) -> Result<Request<Full<Bytes>>, TransportError> {
        let path = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let mut builder = Request::builder().method(self.method.clone()).uri(path);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
            if !headers.contains_key(HOST) {
                let host = HeaderValue::from_str(&target.host_header())
                    .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                headers.insert(HOST, host);
            }
        }

        builder
            .body(Full::new(self.body.clone()))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> OutboundRequest {
        OutboundRequest::new(Method::GET, "http://127.0.0.1:8080/users?page=2".parse().unwrap())
    }

    #[test]
    fn generates_request_id_header() {
        let req = request();
        assert_eq!(req.request_id().len(), 36);
        assert_eq!(req.headers()[REQUEST_ID_HEADER], req.request_id());
    }

    #[test]
    fn caller_request_id_wins() {
        let req = request().with_header(REQUEST_ID_HEADER, HeaderValue::from_static("abc"));
        assert_eq!(req.request_id(), "abc");
    }

    #[test]
    fn defaults_do_not_override_explicit_headers() {
        let mut defaults = HeaderMap::new();
        defaults.insert("accept", HeaderValue::from_static("application/json"));
        defaults.insert("user-agent", HeaderValue::from_static("default"));

        let req = request()
            .with_header(HeaderName::from_static("user-agent"), HeaderValue::from_static("mine"))
            .with_default_headers(&defaults);
        assert_eq!(req.headers()["accept"], "application/json");
        assert_eq!(req.headers()["user-agent"], "mine");
    }

    #[test]
    fn hyper_request_uses_origin_form() {
        let target = Target::from_uri(request().uri()).unwrap();
        let hyper_req = request().with_body("payload").to_hyper(&target).unwrap();
        assert_eq!(hyper_req.uri(), "/users?page=2");
        assert_eq!(hyper_req.headers()[HOST], "127.0.0.1:8080");
        assert!(hyper_req.headers().contains_key(REQUEST_ID_HEADER));
    }
}
