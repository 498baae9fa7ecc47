//! Route: one method, one media kind, one handler

use crate::handler::{Handler, HttpHandler};
use crate::request::{Method, RouteMethod};
use crate::schema::Schemas;
use std::fmt;
use std::sync::Arc;

/// Response media kind of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Text,
    Html,
    Json,
    /// Middleware or terminal responder, any media
    Http,
}

impl Kind {
    /// Content kinds in negotiation priority order
    pub const PRIORITY: [Kind; 3] = [Kind::Json, Kind::Text, Kind::Html];

    /// Media type, `*` for http routes
    pub fn mime(&self) -> &'static str {
        match self {
            Kind::Text => "text/plain",
            Kind::Html => "text/html",
            Kind::Json => "application/json",
            Kind::Http => "*",
        }
    }

    /// Content-Type header value for rendered responses
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Kind::Text => Some("text/plain; charset=utf-8"),
            Kind::Html => Some("text/html; charset=utf-8"),
            Kind::Json => Some("application/json"),
            Kind::Http => None,
        }
    }

    /// Primary type ("text", "application")
    pub fn primary_type(&self) -> &'static str {
        self.mime().split('/').next().unwrap_or("*")
    }

    pub fn is_content(&self) -> bool {
        !matches!(self, Kind::Http)
    }

    /// Content kind for an exact media type
    pub fn from_mime(mime: &str) -> Option<Kind> {
        Kind::PRIORITY.into_iter().find(|k| k.mime() == mime)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// What a route runs
#[derive(Debug, Clone)]
pub enum Action {
    /// Produces a value rendered per the route's kind
    Content(Handler),
    Http(HttpHandler),
}

/// Immutable route
///
/// Builders on [`crate::RouteSet`] produce new routes; nothing mutates a
/// route once it is part of a set.
#[derive(Debug, Clone)]
pub struct Route {
    method: RouteMethod,
    kind: Kind,
    action: Action,
    schemas: Arc<Schemas>,
}

impl Route {
    /// Content route
    pub fn content(method: RouteMethod, kind: Kind, handler: Handler, schemas: Schemas) -> Self {
        debug_assert!(kind.is_content());
        Self {
            method,
            kind,
            action: Action::Content(handler),
            schemas: Arc::new(schemas),
        }
    }

    /// Http route: any method, any media
    pub fn http(handler: HttpHandler, schemas: Schemas) -> Self {
        Self {
            method: RouteMethod::Any,
            kind: Kind::Http,
            action: Action::Http(handler),
            schemas: Arc::new(schemas),
        }
    }

    #[inline]
    pub fn method(&self) -> RouteMethod {
        self.method
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[inline]
    pub fn action(&self) -> &Action {
        &self.action
    }

    #[inline]
    pub fn schemas(&self) -> &Arc<Schemas> {
        &self.schemas
    }

    /// Media type, `*` for http routes
    pub fn media(&self) -> &'static str {
        self.kind.mime()
    }

    pub fn is_content(&self) -> bool {
        self.kind.is_content()
    }

    /// Whether a request with `method` may reach this route
    pub fn accepts(&self, method: Method) -> bool {
        self.method.accepts(method)
    }

    /// True when both routes could answer the same request
    pub fn overlaps(a: &Route, b: &Route) -> bool {
        let methods = a.method == RouteMethod::Any || b.method == RouteMethod::Any || a.method == b.method;
        let media = a.media() == "*" || b.media() == "*" || a.media() == b.media();
        methods && media
    }

    /// Same route under another method; http routes keep `*`
    pub(crate) fn with_method(&self, method: Method) -> Route {
        let mut route = self.clone();
        if route.is_content() {
            route.method = RouteMethod::Only(method);
        }
        route
    }

    /// Same route with extra contracts merged in
    pub(crate) fn with_schemas(&self, schemas: &Schemas) -> Route {
        let mut route = self.clone();
        route.schemas = Arc::new(route.schemas.merge(schemas));
        route
    }
}
