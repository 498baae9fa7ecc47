//! Per-request context handed to every handler

use crate::compose::ContentLink;
use crate::cookie::CookieJar;
use crate::error::{Error, Result};
use crate::handler::Reply;
use crate::html::{default_renderer, Node, Renderer};
use crate::request::{Method, Request};
use crate::schema::{decode_strings, validate, Issue, Schemas};
use crate::server::PendingRequest;
use crate::socket::{Handshake, Socket, SocketError};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use squall_native::{AbortSignal, NativeResponse, SocketEvents};
use std::fmt;
use std::sync::Arc;

/// Position in the chain of same-kind content routes
#[derive(Clone)]
struct Chain {
    links: Arc<[ContentLink]>,
    index: usize,
}

/// Request context
///
/// Cheap to clone. Carries the request, the path slots captured by the
/// mount pattern, the route's contracts and, when served, the pending
/// native request needed for WebSocket upgrades.
#[derive(Clone)]
pub struct Context {
    request: Request,
    slots: Arc<[(String, String)]>,
    schemas: Arc<Schemas>,
    pending: Option<Arc<PendingRequest>>,
    chain: Option<Chain>,
    renderer: Renderer,
}

impl Context {
    pub(crate) fn new(
        request: Request,
        slots: Vec<(String, String)>,
        pending: Option<Arc<PendingRequest>>,
        renderer: Renderer,
    ) -> Self {
        Self {
            request,
            slots: slots.into(),
            schemas: Arc::new(Schemas::default()),
            pending,
            chain: None,
            renderer,
        }
    }

    /// Context for a request outside any server
    ///
    /// Useful to unit-test handlers; upgrades fail with
    /// [`SocketError::Unavailable`].
    pub fn detached(request: Request) -> Self {
        Self::new(request, Vec::new(), None, default_renderer())
    }

    /// Same context with path slots
    pub fn with_slots(mut self, slots: Vec<(String, String)>) -> Self {
        self.slots = slots.into();
        self
    }

    pub(crate) fn with_schemas(mut self, schemas: Arc<Schemas>) -> Self {
        self.schemas = schemas;
        self
    }

    pub(crate) fn with_chain(mut self, links: Arc<[ContentLink]>, index: usize) -> Self {
        if let Some(link) = links.get(index) {
            self.schemas = Arc::clone(&link.schemas);
        }
        self.chain = Some(Chain { links, index });
        self
    }

    #[inline]
    pub fn request(&self) -> &Request {
        &self.request
    }

    #[inline]
    pub fn method(&self) -> Method {
        self.request.method()
    }

    #[inline]
    pub fn path(&self) -> &str {
        self.request.path()
    }

    /// Path and query
    #[inline]
    pub fn url(&self) -> &str {
        self.request.url()
    }

    pub fn query_params(&self) -> Vec<(String, String)> {
        self.request.query_params()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    pub fn cookies(&self) -> CookieJar {
        self.request.cookies()
    }

    pub fn signal(&self) -> &AbortSignal {
        self.request.signal()
    }

    /// Raw slots as captured from the path
    pub fn slots(&self) -> &[(String, String)] {
        &self.slots
    }

    /// Percent-decoded slot value
    pub fn slot(&self, name: &str) -> Option<String> {
        self.slots
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| decode_slot(v))
    }

    /// Contracts of the route being run
    pub fn schemas(&self) -> &Schemas {
        &self.schemas
    }

    pub async fn bytes(&self) -> Result<Bytes> {
        self.request.bytes().await
    }

    pub async fn text(&self) -> Result<String> {
        self.request.text().await
    }

    /// Parse the body as JSON, checked against the payload contract
    pub async fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes = self.bytes().await?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Decode(vec![Issue::new("body", e.to_string())]))?;

        if let Some(ref schema) = self.schemas.payload {
            let issues = validate(&value, schema, "payload");
            if !issues.is_empty() {
                return Err(Error::Decode(issues));
            }
        }
        from_value(value, "payload")
    }

    /// Path slots decoded against the path-params contract
    pub fn path_params<T: DeserializeOwned>(&self) -> Result<T> {
        let pairs: Vec<(String, String)> = self
            .slots
            .iter()
            .map(|(k, v)| (k.clone(), decode_slot(v)))
            .collect();
        let value = decode_strings(self.schemas.path_params.as_ref(), &pairs, "").map_err(Error::Decode)?;
        from_value(value, "path")
    }

    /// Query decoded against the url-params contract
    pub fn url_params<T: DeserializeOwned>(&self) -> Result<T> {
        let value = decode_strings(self.schemas.url_params.as_ref(), &self.query_params(), "")
            .map_err(Error::Decode)?;
        from_value(value, "query")
    }

    /// Headers decoded against the headers contract
    ///
    /// Header names are lowercase. Values that are not visible ASCII are
    /// skipped.
    pub fn headers_as<T: DeserializeOwned>(&self) -> Result<T> {
        let pairs: Vec<(String, String)> = self
            .request
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect();
        let value = decode_strings(self.schemas.headers.as_ref(), &pairs, "").map_err(Error::Decode)?;
        from_value(value, "headers")
    }

    /// Render a node tree with the server's renderer
    pub fn render(&self, node: &Node) -> String {
        (self.renderer)(node)
    }

    pub(crate) fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Result of the next content route of the same kind
    ///
    /// Lets an outer route wrap what an inner one produces. Fails on the
    /// innermost route and outside content routes.
    pub async fn next(&self) -> Result<Reply> {
        let chain = self
            .chain
            .as_ref()
            .ok_or_else(|| Error::internal("next() called outside a content route"))?;
        let index = chain.index + 1;
        let link = chain
            .links
            .get(index)
            .ok_or_else(|| Error::internal("next() called on the innermost route"))?;

        let handler = link.handler.clone();
        let ctx = self.clone().with_chain(Arc::clone(&chain.links), index);
        handler.call(ctx).await
    }

    /// Accept a WebSocket upgrade and wait for the socket to open
    ///
    /// The request is answered with `101 Switching Protocols`; whatever the
    /// handler returns afterwards is discarded.
    pub async fn upgrade(&self) -> Result<Socket> {
        let pending = self.pending.as_ref().ok_or(SocketError::Unavailable)?;

        let handshake = Arc::new(Handshake::new());
        let events: Arc<dyn SocketEvents> = handshake.clone();
        if !pending.server().upgrade(pending.native(), events) {
            return Err(Error::Decode(vec![Issue::new(
                "headers",
                "Not a WebSocket upgrade request",
            )]));
        }

        pending.resolve(NativeResponse::new(http::StatusCode::SWITCHING_PROTOCOLS));
        Ok(Socket::open(handshake).await?)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.method())
            .field("url", &self.url())
            .field("slots", &self.slots)
            .finish()
    }
}

fn decode_slot(raw: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}

fn from_value<T: DeserializeOwned>(value: Value, path: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Decode(vec![Issue::new(path, e.to_string())]))
}
