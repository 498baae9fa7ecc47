//! Native request handed to the fetch callback

use crate::error::{Error, Result};
use crate::signal::AbortSignal;
use bytes::{Bytes, BytesMut};
use http::request::Parts;
use http::{HeaderMap, Method, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::upgrade::OnUpgrade;
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;

/// Default request body limit (1 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type RequestBody = UnsyncBoxBody<Bytes, BoxError>;

/// How reading the body ended
#[derive(Debug, Clone)]
enum BodyFailure {
    TooLarge { limit: usize },
    Read(String),
}

impl From<BodyFailure> for Error {
    fn from(failure: BodyFailure) -> Self {
        match failure {
            BodyFailure::TooLarge { limit } => Error::BodyTooLarge { limit },
            BodyFailure::Read(message) => Error::Hyper(message),
        }
    }
}

/// Body read state
///
/// Frames already read stay in `buffer`, so a cancelled read picks up where
/// it stopped.
struct BodyState {
    source: Option<RequestBody>,
    buffer: BytesMut,
    outcome: Option<std::result::Result<Bytes, BodyFailure>>,
}

impl BodyState {
    fn new(body: RequestBody) -> Self {
        Self {
            source: Some(body),
            buffer: BytesMut::new(),
            outcome: None,
        }
    }

    fn finish(&mut self, outcome: std::result::Result<Bytes, BodyFailure>) {
        self.source = None;
        self.buffer = BytesMut::new();
        self.outcome = Some(outcome);
    }
}

/// An incoming request
///
/// Shared behind an `Arc` between the native dispatcher and the fetch
/// callback. The body is read at most once; its outcome, success or
/// failure, is cached.
pub struct NativeRequest {
    parts: Parts,
    body: tokio::sync::Mutex<BodyState>,
    signal: AbortSignal,
    remote_addr: Option<SocketAddr>,
    max_body_size: usize,
    upgrade: Mutex<Option<OnUpgrade>>,
    accept_key: Mutex<Option<String>>,
}

impl NativeRequest {
    pub(crate) fn from_hyper(
        mut req: hyper::Request<hyper::body::Incoming>,
        signal: AbortSignal,
        remote_addr: SocketAddr,
        max_body_size: usize,
    ) -> Self {
        let upgrade = if is_websocket_upgrade(req.method(), req.headers()) {
            Some(hyper::upgrade::on(&mut req))
        } else {
            None
        };
        let (parts, body) = req.into_parts();
        let body = body.map_err(|e| Box::new(e) as BoxError).boxed_unsync();

        Self {
            parts,
            body: tokio::sync::Mutex::new(BodyState::new(body)),
            signal,
            remote_addr: Some(remote_addr),
            max_body_size,
            upgrade: Mutex::new(upgrade),
            accept_key: Mutex::new(None),
        }
    }

    /// Build a request from an in-memory body
    ///
    /// Such requests have no connection behind them, so they can never be
    /// upgraded.
    pub fn from_bytes(req: http::Request<Bytes>, signal: AbortSignal) -> Self {
        let (parts, body) = req.into_parts();
        let body = Full::new(body)
            .map_err(|never| match never {})
            .boxed_unsync();

        Self {
            parts,
            body: tokio::sync::Mutex::new(BodyState::new(body)),
            signal,
            remote_addr: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            upgrade: Mutex::new(None),
            accept_key: Mutex::new(None),
        }
    }

    #[inline]
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    #[inline]
    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    #[inline]
    pub fn query(&self) -> Option<&str> {
        self.parts.uri.query()
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Abort signal fired when the client disconnects
    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Collect the request body
    ///
    /// Concurrent callers share a single read. Bodies larger than the
    /// configured limit fail with [`Error::BodyTooLarge`], and so does every
    /// later call.
    pub async fn bytes(&self) -> Result<Bytes> {
        let limit = self.max_body_size;
        let mut body = self.body.lock().await;

        loop {
            if let Some(outcome) = &body.outcome {
                return outcome.clone().map_err(Error::from);
            }

            let next = match body.source.as_mut() {
                Some(source) => source.frame().await,
                None => None,
            };
            match next {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        if body.buffer.len() + data.len() > limit {
                            body.finish(Err(BodyFailure::TooLarge { limit }));
                        } else {
                            body.buffer.extend_from_slice(&data);
                        }
                    }
                }
                Some(Err(err)) => body.finish(Err(BodyFailure::Read(err.to_string()))),
                None => {
                    let collected = body.buffer.split().freeze();
                    body.finish(Ok(collected));
                }
            }
        }
    }

    /// Whether the headers ask for a WebSocket upgrade
    pub fn is_websocket_upgrade(&self) -> bool {
        is_websocket_upgrade(self.method(), self.headers())
    }

    pub(crate) fn take_upgrade(&self) -> Option<OnUpgrade> {
        self.upgrade.lock().take()
    }

    pub(crate) fn set_accept_key(&self, key: String) {
        *self.accept_key.lock() = Some(key);
    }

    pub(crate) fn take_accept_key(&self) -> Option<String> {
        self.accept_key.lock().take()
    }
}

impl fmt::Debug for NativeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeRequest")
            .field("method", self.method())
            .field("uri", self.uri())
            .field("remote_addr", &self.remote_addr)
            .field("aborted", &self.signal.is_aborted())
            .finish()
    }
}

/// Check if a request is a WebSocket upgrade
pub fn is_websocket_upgrade(method: &Method, headers: &HeaderMap) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let upgrade = header("upgrade").unwrap_or("");
    let connection = header("connection").unwrap_or("");

    method == Method::GET
        && upgrade.eq_ignore_ascii_case("websocket")
        && connection.to_ascii_lowercase().contains("upgrade")
        && header("sec-websocket-key").is_some()
}
