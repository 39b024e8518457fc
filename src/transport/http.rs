//! Plain HTTP/1.1 transport over pooled TCP connections.
//!
//! # Responsibilities
//! - Open connections (TCP connect + HTTP/1.1 handshake) under the connect timeout
//! - Run one exchange per lease: send under the response timeout, read the body under the read timeout
//! - Return healthy connections to the pool, drop the rest
//!
//! TLS is not handled here; `https` targets need a different [`Transport`].

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::{self, SendRequest};
use hyper::Response;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::config::PoolConfig;
use crate::error::{TimeoutPhase, TransportError};
use crate::http::{HttpResponse, OutboundRequest};
use crate::pool::{Connect, ConnectionPool, Lease, Target};
use crate::transport::timeouts::TimeoutConfig;
use crate::transport::Transport;

type Sender = SendRequest<Full<Bytes>>;

/// Opens HTTP/1.1 connections; each connection is driven by its own task.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    timeouts: TimeoutConfig,
}

impl HttpConnector {
    pub fn new(timeouts: TimeoutConfig) -> Self {
        Self { timeouts }
    }
}

fn connect_error(target: &Target, err: impl std::fmt::Display) -> TransportError {
    TransportError::Connect {
        target: target.to_string(),
        reason: err.to_string(),
    }
}

impl Connect for HttpConnector {
    type Connection = Sender;

    fn connect<'a>(
        &'a self,
        target: &'a Target,
    ) -> BoxFuture<'a, Result<Self::Connection, TransportError>> {
        Box::pin(async move {
            let handshake = async {
                let stream = TcpStream::connect(target.socket_address())
                    .await
                    .map_err(|e| connect_error(target, e))?;
                stream.set_nodelay(true).map_err(|e| connect_error(target, e))?;
                let parts = http1::handshake(TokioIo::new(stream))
                    .await
                    .map_err(|e| connect_error(target, e))?;
                Ok::<_, TransportError>(parts)
            };

            let (sender, connection) = self
                .timeouts
                .enforce(TimeoutPhase::Connect, handshake)
                .await??;

            let peer = target.to_string();
            tokio::spawn(async move {
                if let Err(err) = connection.await {
                    tracing::debug!(peer = %peer, error = %err, "Connection task ended with error");
                }
            });

            Ok(sender)
        })
    }

    fn is_open(&self, connection: &Self::Connection) -> bool {
        !connection.is_closed()
    }
}

/// Default [`Transport`]: HTTP/1.1 over a bounded connection pool.
pub struct HttpTransport {
    pool: ConnectionPool<HttpConnector>,
    timeouts: TimeoutConfig,
}

impl HttpTransport {
    pub fn new(pool_config: PoolConfig, timeouts: TimeoutConfig) -> Self {
        Self {
            pool: ConnectionPool::new(HttpConnector::new(timeouts), pool_config),
            timeouts,
        }
    }

    pub fn pool(&self) -> &ConnectionPool<HttpConnector> {
        &self.pool
    }

    async fn exchange(&self, request: &OutboundRequest) -> Result<HttpResponse, TransportError> {
        let target = Target::from_uri(request.uri())?;
        if target.scheme() != "http" {
            return Err(TransportError::InvalidRequest(format!(
                "scheme `{}` is not supported by the plain HTTP transport",
                target.scheme()
            )));
        }

        let mut lease = self.pool.acquire(&target).await?;
        self.ensure_ready(&mut lease).await?;

        let response = loop {
            let hyper_request = request.to_hyper(&target)?;
            let sent = self
                .timeouts
                .enforce(TimeoutPhase::Response, sender(&mut lease)?.send_request(hyper_request))
                .await?;
            match sent {
                Ok(response) => break response,
                Err(err) if err.is_canceled() && lease.is_reused() => {
                    tracing::debug!(
                        request_id = %request.request_id(),
                        peer = %target,
                        "Pooled connection closed before the request was sent, reconnecting"
                    );
                    self.pool.reconnect(&mut lease).await?;
                }
                Err(err) => return Err(TransportError::Io(err.to_string())),
            }
        };

        let (parts, body) = response.into_parts();
        let body = self
            .timeouts
            .enforce(TimeoutPhase::Read, body.collect())
            .await?
            .map_err(|e| TransportError::Io(e.to_string()))?
            .to_bytes();

        tracing::trace!(
            request_id = %request.request_id(),
            peer = %target,
            status = %parts.status,
            bytes = body.len(),
            "Exchange complete"
        );

        self.pool.release(lease);
        Ok(Response::from_parts(parts, body))
    }

    /// Wait until the connection accepts a request, replacing it once if a
    /// reused connection turns out to be closed.
    async fn ensure_ready(&self, lease: &mut Lease<Sender>) -> Result<(), TransportError> {
        let ready = self
            .timeouts
            .enforce(TimeoutPhase::Response, sender(lease)?.ready())
            .await?;

        match ready {
            Ok(()) => Ok(()),
            Err(_) if lease.is_reused() => {
                tracing::debug!(peer = %lease.target(), "Stale pooled connection, reconnecting");
                self.pool.reconnect(lease).await?;
                self.timeouts
                    .enforce(TimeoutPhase::Response, sender(lease)?.ready())
                    .await?
                    .map_err(|e| TransportError::Io(e.to_string()))
            }
            Err(err) => Err(TransportError::Io(err.to_string())),
        }
    }
}

fn sender(lease: &mut Lease<Sender>) -> Result<&mut Sender, TransportError> {
    lease
        .connection_mut()
        .ok_or_else(|| TransportError::Io("leased connection is gone".to_string()))
}

impl Transport for HttpTransport {
    fn execute<'a>(
        &'a self,
        request: &'a OutboundRequest,
    ) -> BoxFuture<'a, Result<HttpResponse, TransportError>> {
        Box::pin(self.exchange(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use hyper::Method;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Clone, Copy)]
    enum Script {
        /// Answer every request on the connection with `200 ok`.
        KeepAlive,
        /// Wait before sending the response head.
        DelayHead(Duration),
        /// Send the head and part of the body, then stall.
        StallBody,
        /// Answer one request, then shut the socket down.
        CloseAfterResponse,
    }

    /// Raw HTTP/1.1 backend; returns its address and an accept counter.
    async fn start_raw_backend(script: Script) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));
        let counter = accepts.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    loop {
                        let n = socket.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        if !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            continue;
                        }
                        buf.clear();

                        match script {
                            Script::KeepAlive => {
                                let _ = socket
                                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                                    .await;
                            }
                            Script::DelayHead(delay) => {
                                tokio::time::sleep(delay).await;
                                let _ = socket
                                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                                    .await;
                            }
                            Script::StallBody => {
                                let _ = socket
                                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc")
                                    .await;
                                tokio::time::sleep(Duration::from_secs(5)).await;
                                return;
                            }
                            Script::CloseAfterResponse => {
                                let _ = socket
                                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                                    .await;
                                let _ = socket.shutdown().await;
                                return;
                            }
                        }
                    }
                });
            }
        });

        (addr, accepts)
    }

    fn transport(timeout: Duration) -> HttpTransport {
        HttpTransport::new(PoolConfig::default(), TimeoutConfig::uniform(timeout))
    }

    fn get(addr: SocketAddr, path: &str) -> OutboundRequest {
        OutboundRequest::new(Method::GET, format!("http://{addr}{path}").parse().unwrap())
    }

    #[tokio::test]
    async fn reuses_pooled_connection() {
        let (addr, accepts) = start_raw_backend(Script::KeepAlive).await;
        let transport = transport(Duration::from_secs(2));

        for _ in 0..3 {
            let response = transport.execute(&get(addr, "/")).await.unwrap();
            assert_eq!(response.status(), 200);
            assert_eq!(response.body().as_ref(), b"ok");
        }

        assert_eq!(accepts.load(Ordering::SeqCst), 1);
        let target = Target::new("http", "127.0.0.1", addr.port());
        assert_eq!(transport.pool().stats(&target).idle, 1);
    }

    #[tokio::test]
    async fn closed_pooled_connection_is_replaced() {
        let (addr, accepts) = start_raw_backend(Script::CloseAfterResponse).await;
        let transport = transport(Duration::from_secs(2));

        let first = transport.execute(&get(addr, "/one")).await.unwrap();
        assert_eq!(first.status(), 200);

        // Give the connection task time to see the peer's FIN.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = transport.execute(&get(addr, "/two")).await.unwrap();
        assert_eq!(second.status(), 200);
        assert_eq!(second.body().as_ref(), b"ok");

        assert_eq!(accepts.load(Ordering::SeqCst), 2);
        let target = Target::new("http", "127.0.0.1", addr.port());
        assert_eq!(transport.pool().stats(&target).leased, 0);
    }

    #[tokio::test]
    async fn slow_response_head_times_out() {
        let (addr, _) = start_raw_backend(Script::DelayHead(Duration::from_millis(500))).await;
        let transport = transport(Duration::from_millis(100));

        let err = transport.execute(&get(addr, "/slow")).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout(TimeoutPhase::Response));

        // The timed-out connection is not returned to the pool.
        let target = Target::new("http", "127.0.0.1", addr.port());
        assert_eq!(transport.pool().stats(&target).idle, 0);
        assert_eq!(transport.pool().stats(&target).leased, 0);
    }

    #[tokio::test]
    async fn stalled_body_times_out() {
        let (addr, _) = start_raw_backend(Script::StallBody).await;
        let transport = transport(Duration::from_millis(100));

        let err = transport.execute(&get(addr, "/stall")).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout(TimeoutPhase::Read));
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = transport(Duration::from_secs(1))
            .execute(&get(addr, "/"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn https_needs_another_transport() {
        let request = OutboundRequest::new(Method::GET, "https://example.com/".parse().unwrap());
        let err = transport(Duration::from_secs(1))
            .execute(&request)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }
}
