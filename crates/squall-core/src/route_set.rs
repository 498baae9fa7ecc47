//! RouteSet: ordered routes sharing one mount point
//!
//! Every builder consumes the set and returns a new one. Routes are only ever
//! appended, so declaration order is evaluation order: among routes with the
//! same method and media, the first declared is the outermost.
//!
//! ```
//! use squall_core::{text, Context};
//!
//! let set = text("hello")
//!     .json(serde_json::json!({ "hello": "world" }))
//!     .http(|ctx: Context, next: squall_core::Next| async move { next.run(ctx).await });
//! assert_eq!(set.len(), 3);
//! ```

use crate::handler::{IntoHandler, IntoHttp};
use crate::negotiate::match_kind;
use crate::request::{Method, RouteMethod};
use crate::route::{Kind, Route};
use crate::schema::{Fields, Schema, Schemas};

/// Ordered, immutable collection of routes
#[derive(Debug, Clone, Default)]
pub struct RouteSet {
    routes: Vec<Route>,
    schemas: Schemas,
}

impl RouteSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    fn content<M>(self, kind: Kind, handler: impl IntoHandler<M>) -> Self {
        let route = Route::content(
            RouteMethod::Only(Method::Get),
            kind,
            handler.into_handler(),
            self.schemas.clone(),
        );
        self.push(route)
    }

    /// Append a `text/plain` route answering GET
    pub fn text<M>(self, handler: impl IntoHandler<M>) -> Self {
        self.content(Kind::Text, handler)
    }

    /// Append a `text/html` route answering GET
    pub fn html<M>(self, handler: impl IntoHandler<M>) -> Self {
        self.content(Kind::Html, handler)
    }

    /// Append an `application/json` route answering GET
    pub fn json<M>(self, handler: impl IntoHandler<M>) -> Self {
        self.content(Kind::Json, handler)
    }

    /// Append an any-method, any-media route
    ///
    /// A `(Context, Next)` closure becomes middleware around the later
    /// stages; anything else is a terminal responder.
    pub fn http<M>(self, handler: impl IntoHttp<M>) -> Self {
        let route = Route::http(handler.into_http(), self.schemas.clone());
        self.push(route)
    }

    /// Rewrite the method of every content route
    pub fn method(mut self, method: Method) -> Self {
        self.routes = self.routes.iter().map(|r| r.with_method(method)).collect();
        self
    }

    pub fn get(self) -> Self {
        self.method(Method::Get)
    }

    pub fn post(self) -> Self {
        self.method(Method::Post)
    }

    pub fn put(self) -> Self {
        self.method(Method::Put)
    }

    pub fn patch(self) -> Self {
        self.method(Method::Patch)
    }

    pub fn delete(self) -> Self {
        self.method(Method::Delete)
    }

    pub fn head(self) -> Self {
        self.method(Method::Head)
    }

    pub fn options(self) -> Self {
        self.method(Method::Options)
    }

    fn with_schemas(mut self, schemas: Schemas) -> Self {
        self.routes = self.routes.iter().map(|r| r.with_schemas(&schemas)).collect();
        self.schemas = self.schemas.merge(&schemas);
        self
    }

    /// Contract for path slots; merges field by field
    pub fn schema_path_params(self, fields: Fields) -> Self {
        self.with_schemas(Schemas {
            path_params: Some(fields),
            ..Default::default()
        })
    }

    /// Contract for query parameters; merges field by field
    pub fn schema_url_params(self, fields: Fields) -> Self {
        self.with_schemas(Schemas {
            url_params: Some(fields),
            ..Default::default()
        })
    }

    /// Contract for request headers; merges field by field
    pub fn schema_headers(self, fields: Fields) -> Self {
        self.with_schemas(Schemas {
            headers: Some(fields),
            ..Default::default()
        })
    }

    /// Contract for the JSON payload; merges as a union
    pub fn schema_payload(self, schema: Schema) -> Self {
        self.with_schemas(Schemas {
            payload: Some(schema),
            ..Default::default()
        })
    }

    pub fn schema_success(self, schema: Schema) -> Self {
        self.with_schemas(Schemas {
            success: Some(schema),
            ..Default::default()
        })
    }

    pub fn schema_error(self, schema: Schema) -> Self {
        self.with_schemas(Schemas {
            error: Some(schema),
            ..Default::default()
        })
    }

    /// Concatenate: `self`'s routes first, then `other`'s
    pub fn merge(mut self, other: RouteSet) -> Self {
        self.schemas = self.schemas.merge(&other.schemas);
        self.routes.extend(other.routes);
        self
    }

    #[inline]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    #[inline]
    pub fn schemas(&self) -> &Schemas {
        &self.schemas
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Content route chosen for an `Accept` header
    pub fn negotiate(&self, accept: &str) -> Option<&Route> {
        match_kind(&self.routes, accept)
    }
}

/// Set with a single `text/plain` GET route
pub fn text<M>(handler: impl IntoHandler<M>) -> RouteSet {
    RouteSet::new().text(handler)
}

/// Set with a single `text/html` GET route
pub fn html<M>(handler: impl IntoHandler<M>) -> RouteSet {
    RouteSet::new().html(handler)
}

/// Set with a single `application/json` GET route
pub fn json<M>(handler: impl IntoHandler<M>) -> RouteSet {
    RouteSet::new().json(handler)
}

/// Set with a single any-method, any-media route
pub fn http<M>(handler: impl IntoHttp<M>) -> RouteSet {
    RouteSet::new().http(handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaType;

    #[test]
    fn test_content_builders_default_to_get() {
        let set = text("t").html("h").json(serde_json::json!([]));
        let kinds: Vec<Kind> = set.routes().iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec![Kind::Text, Kind::Html, Kind::Json]);
        assert!(set
            .routes()
            .iter()
            .all(|r| r.method() == RouteMethod::Only(Method::Get)));
    }

    #[test]
    fn test_method_modifier_rewrites_content_only() {
        let set = text("t").http("any").post();
        assert_eq!(set.routes()[0].method(), RouteMethod::Only(Method::Post));
        assert_eq!(set.routes()[1].method(), RouteMethod::Any);
        assert_eq!(set.routes()[1].media(), "*");
    }

    #[test]
    fn test_builders_do_not_mutate() {
        let base = text("t");
        let extended = base.clone().json(serde_json::json!({}));
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
    }

    #[test]
    fn test_merge_preserves_order() {
        let a = text("a1").json(serde_json::json!(1));
        let b = html("b1");
        let merged = a.merge(b);
        let kinds: Vec<Kind> = merged.routes().iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec![Kind::Text, Kind::Json, Kind::Html]);
    }

    #[test]
    fn test_schema_builders_widen() {
        let set = json(serde_json::json!({}))
            .schema_payload(Schema::string())
            .schema_payload(Schema::number());

        let payload = set.schemas().payload.clone().unwrap();
        assert!(matches!(payload.schema_type, SchemaType::Union(ref v) if v.len() == 2));
        assert_eq!(set.routes()[0].schemas().payload, Some(payload));
    }

    #[test]
    fn test_schema_fields_merge() {
        let set = text("t")
            .schema_path_params([("id".to_string(), Schema::integer())].into())
            .schema_path_params([("slug".to_string(), Schema::string())].into());

        let fields = set.schemas().path_params.clone().unwrap();
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_later_routes_inherit_schemas() {
        let set = RouteSet::new()
            .schema_headers([("x-api-key".to_string(), Schema::string())].into())
            .text("t");
        assert!(set.routes()[0].schemas().headers.is_some());
    }
}
