//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::HeaderMap;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

/// What the handler of a programmable backend sees.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
}

/// A running mock backend on an ephemeral port.
#[derive(Clone)]
pub struct Backend {
    pub addr: SocketAddr,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    connections: Arc<Mutex<usize>>,
}

impl Backend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    /// Requests received across all paths.
    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }

    /// TCP connections accepted.
    pub fn connections(&self) -> usize {
        *self.connections.lock().unwrap()
    }
}

/// Start a keep-alive HTTP/1.1 backend answering every request with `f`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> Backend
where
    F: Fn(BackendRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = Backend {
        addr: listener.local_addr().unwrap(),
        hits: Arc::new(Mutex::new(HashMap::new())),
        connections: Arc::new(Mutex::new(0)),
    };
    let f = Arc::new(f);
    let state = backend.clone();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            *state.connections.lock().unwrap() += 1;
            let f = f.clone();
            let hits = state.hits.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let f = f.clone();
                    let hits = hits.clone();
                    async move {
                        let request = BackendRequest {
                            method: req.method().clone(),
                            path: req.uri().path().to_string(),
                            headers: req.headers().clone(),
                        };
                        *hits.lock().unwrap().entry(request.path.clone()).or_default() += 1;

                        let (status, body) = f(request).await;
                        let response = Response::builder()
                            .status(status)
                            .body(Full::new(Bytes::from(body)))
                            .unwrap();
                        Ok::<_, Infallible>(response)
                    }
                });

                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(socket), service)
                    .await;
            });
        }
    });

    backend
}

/// Start a backend that always answers `status` with `body`.
pub async fn start_mock_backend(status: u16, body: &'static str) -> Backend {
    start_programmable_backend(move |_| async move { (status, body.to_string()) }).await
}

/// An address nothing listens on.
pub async fn closed_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
