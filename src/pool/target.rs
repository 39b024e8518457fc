//! Pool key: the scheme, host and port a connection is bound to.

use std::fmt;

use hyper::Uri;

use crate::error::TransportError;

/// Destination of a pooled connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    scheme: String,
    host: String,
    port: u16,
}

impl Target {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// Derive the target from an absolute URI, filling in the default port.
    pub fn from_uri(uri: &Uri) -> Result<Self, TransportError> {
        let scheme = uri.scheme_str().unwrap_or("http").to_ascii_lowercase();
        let host = uri
            .host()
            .ok_or_else(|| TransportError::InvalidRequest(format!("URI `{uri}` has no host")))?;
        let port = match uri.port_u16() {
            Some(port) => port,
            None if scheme == "https" => 443,
            None => 80,
        };
        Ok(Self::new(scheme, host.trim_matches(|c| c == '[' || c == ']'), port))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` form accepted by socket connect calls.
    pub fn socket_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Value of the `Host` header for requests to this target.
    pub fn host_header(&self) -> String {
        let default_port = matches!(
            (self.scheme.as_str(), self.port),
            ("http", 80) | ("https", 443)
        );
        if default_port && !self.host.contains(':') {
            self.host.clone()
        } else {
            self.socket_address()
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.socket_address())
    }
}
