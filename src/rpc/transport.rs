//! Persistent HTTP/1.1 connection carrying TSV-RPC exchanges

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::{self, SendRequest};
use hyper::ext::ReasonPhrase;
use hyper::header::{HeaderValue, CONTENT_TYPE, HOST};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{Error, Result};

/// Outcome of one request/response exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub status: StatusCode,
    /// Reason phrase sent by the server, or the canonical one for `status`.
    pub reason: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// One keep-alive HTTP/1.1 connection to `host:port`.
pub struct HttpTransport {
    sender: SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
    authority: HeaderValue,
    request_timeout: Option<Duration>,
}

impl HttpTransport {
    /// Opens the TCP connection and performs the HTTP/1.1 handshake.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
        request_timeout: Option<Duration>,
    ) -> Result<Self> {
        let authority = authority(host, port);
        let header = HeaderValue::from_str(&authority)
            .map_err(|_| Error::InvalidAddress(authority.clone()))?;

        let stream = within(connect_timeout, async {
            TcpStream::connect(authority.as_str()).await.map_err(Error::from)
        })
        .await?;
        stream.set_nodelay(true)?;

        let (sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("HTTP connection ended: {}", e);
            }
        });

        debug!("Connected to {}", authority);
        Ok(Self {
            sender,
            driver,
            authority: header,
            request_timeout,
        })
    }

    /// Builds `POST path` carrying `body`. Nothing is written to the wire.
    pub fn request(&self, path: &str, content_type: &str, body: Bytes) -> Result<Request<Full<Bytes>>> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(HOST, self.authority.clone())
            .header(CONTENT_TYPE, content_type)
            .body(Full::new(body))
            .map_err(|e| Error::Protocol(format!("Failed to build request: {}", e)))
    }

    /// Sends `request` and reads the whole response.
    pub async fn exchange(&mut self, request: Request<Full<Bytes>>) -> Result<Exchange> {
        let sender = &mut self.sender;
        within(self.request_timeout, async move {
            sender.ready().await?;
            let response = sender.send_request(request).await?;
            let status = response.status();
            let reason = response
                .extensions()
                .get::<ReasonPhrase>()
                .map(|r| String::from_utf8_lossy(r.as_bytes()).into_owned())
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_default();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.into_body().collect().await?.to_bytes();

            Ok::<_, Error>(Exchange {
                status,
                reason,
                content_type,
                body,
            })
        })
        .await
    }

    /// Whether both the request channel and the connection task are alive.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed() && !self.driver.is_finished()
    }

    pub fn close(&mut self) {
        self.driver.abort();
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// `host:port`, with IPv6 literals bracketed.
fn authority(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Awaits `fut`, failing with [`Error::Timeout`] once `limit` elapses.
async fn within<T, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(limit.as_millis() as u64))?,
        None => fut.await,
    }
}
