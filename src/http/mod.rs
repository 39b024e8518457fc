//! HTTP message types shared by the transport and the middleware chain.

pub mod request;

use bytes::Bytes;

pub use request::{OutboundRequest, REQUEST_ID_HEADER};

/// A response whose body has been read completely.
pub type HttpResponse = hyper::Response<Bytes>;
