//! Composition of a mounted route set into one app
//!
//! A set compiles once into nested closures:
//!
//! ```text
//! http[0]( http[1]( ... content ) )
//! ```
//!
//! The innermost stage filters content routes by method, negotiates a kind
//! from `Accept`, runs the chosen route and renders its reply. Http routes
//! fold around it in reverse, so the first declared is the outermost.
//! A terminal responder cuts off everything inside it.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::handler::{Handler, HttpHandler, Next, Reply};
use crate::html::{Html, Renderer};
use crate::negotiate::negotiate;
use crate::request::Method;
use crate::response::{Response, ResponseBuilder, StatusCode};
use crate::route::{Action, Kind, Route};
use crate::route_set::RouteSet;
use crate::schema::Schemas;
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// One stage of the pipeline
pub type App = Arc<dyn Fn(Context) -> BoxFuture<'static, Result<Response>> + Send + Sync>;

/// Content route reachable through `Context::next`
#[derive(Clone)]
pub(crate) struct ContentLink {
    pub(crate) handler: Handler,
    pub(crate) schemas: Arc<Schemas>,
}

/// Route set compiled for dispatch
pub struct CompiledSet {
    routes: RouteSet,
    app: App,
}

impl CompiledSet {
    pub fn compile(routes: RouteSet) -> Self {
        let content: Arc<[Route]> = routes
            .routes()
            .iter()
            .filter(|r| r.is_content())
            .cloned()
            .collect();

        let mut app = content_app(content);
        for route in routes.routes().iter().rev() {
            let Action::Http(handler) = route.action() else {
                continue;
            };
            app = wrap(app, handler.clone(), Arc::clone(route.schemas()));
        }

        Self { routes, app }
    }

    pub fn routes(&self) -> &RouteSet {
        &self.routes
    }

    /// Run the pipeline, turning any failure into an error response
    pub async fn handle(&self, ctx: Context) -> Response {
        let method = ctx.method();
        let path = ctx.path().to_string();

        match (self.app)(ctx).await {
            Ok(response) => response,
            Err(err) => {
                let status = err.status();
                if status.is_server_error() {
                    error!(%method, path, status = status.as_u16(), error = %err, "handler failed");
                } else {
                    debug!(%method, path, status = status.as_u16(), error = %err, "request rejected");
                }
                err.into_response()
            }
        }
    }
}

fn wrap(inner: App, handler: HttpHandler, schemas: Arc<Schemas>) -> App {
    match handler {
        HttpHandler::Middleware(middleware) => Arc::new(move |ctx: Context| {
            let ctx = ctx.with_schemas(Arc::clone(&schemas));
            middleware(ctx, Next::new(Arc::clone(&inner)))
        }),
        HttpHandler::Responder(responder) => Arc::new(move |ctx: Context| {
            let responder = responder.clone();
            let ctx = ctx.with_schemas(Arc::clone(&schemas));
            async move {
                let renderer = ctx.renderer().clone();
                let reply = responder.call(ctx).await?;
                render_reply(Kind::Http, reply, &renderer)
            }
            .boxed()
        }),
    }
}

fn content_app(routes: Arc<[Route]>) -> App {
    Arc::new(move |ctx: Context| {
        let routes = Arc::clone(&routes);
        async move { run_content(&routes, ctx).await }.boxed()
    })
}

async fn run_content(routes: &[Route], ctx: Context) -> Result<Response> {
    if routes.is_empty() {
        return Err(Error::NotAcceptable {
            path: ctx.path().to_string(),
        });
    }

    let method = ctx.method();
    let mut candidates: Vec<&Route> = routes.iter().filter(|r| r.accepts(method)).collect();
    if candidates.is_empty() && method == Method::Head {
        candidates = routes.iter().filter(|r| r.accepts(Method::Get)).collect();
    }
    if candidates.is_empty() {
        return Err(Error::MethodNotAllowed {
            method: method.to_string(),
            path: ctx.path().to_string(),
            allow: allowed_methods(routes),
        });
    }

    let kinds: Vec<Kind> = candidates.iter().map(|r| r.kind()).collect();
    let accept = ctx.header("accept").unwrap_or("");
    let kind = negotiate(&kinds, accept)
        .map(|i| kinds[i])
        .ok_or_else(|| Error::NotAcceptable {
            path: ctx.path().to_string(),
        })?;

    let links: Arc<[ContentLink]> = candidates
        .iter()
        .filter(|r| r.kind() == kind)
        .filter_map(|r| match r.action() {
            Action::Content(handler) => Some(ContentLink {
                handler: handler.clone(),
                schemas: Arc::clone(r.schemas()),
            }),
            Action::Http(_) => None,
        })
        .collect();
    let handler = links
        .first()
        .map(|link| link.handler.clone())
        .ok_or_else(|| Error::internal("negotiated kind has no route"))?;

    let renderer = ctx.renderer().clone();
    let reply = handler.call(ctx.with_chain(links, 0)).await?;
    render_reply(kind, reply, &renderer)
}

/// Methods for the `Allow` header, in declaration order
fn allowed_methods(routes: &[Route]) -> Vec<String> {
    let mut allow: Vec<String> = Vec::new();
    for route in routes {
        let method = route.method().as_str().to_string();
        if !allow.contains(&method) {
            allow.push(method);
        }
    }
    if allow.iter().any(|m| m == "GET") && !allow.iter().any(|m| m == "HEAD") {
        allow.push("HEAD".to_string());
    }
    allow
}

enum Rendered {
    Markup(String),
    Json(Value),
}

/// Render a reply for a route of `kind`
///
/// Responses pass through unchanged. Http routes render by the reply's own
/// type.
pub(crate) fn render_reply(kind: Kind, reply: Reply, renderer: &Renderer) -> Result<Response> {
    let kind = match (kind, &reply) {
        (Kind::Http, Reply::Text(_)) => Kind::Text,
        (Kind::Http, Reply::Html(_)) => Kind::Html,
        (Kind::Http, Reply::Json(_)) => Kind::Json,
        (kind, _) => kind,
    };

    let rendered = match reply {
        Reply::Response(response) => return Ok(*response),
        Reply::Empty => return Ok(Response::ok()),
        Reply::Text(s) | Reply::Html(Html::Raw(s)) => Rendered::Markup(s),
        Reply::Html(Html::Node(node)) => Rendered::Markup(renderer(&node)),
        Reply::Json(value) => Rendered::Json(value),
    };

    let body = match (kind, rendered) {
        (Kind::Json, Rendered::Markup(s)) => serde_json::to_string(&s)?,
        (Kind::Json, Rendered::Json(value)) => serde_json::to_string(&value)?,
        (_, Rendered::Markup(s)) | (_, Rendered::Json(Value::String(s))) => s,
        (_, Rendered::Json(value)) => value.to_string(),
    };

    let mut builder = ResponseBuilder::new(StatusCode::OK);
    if let Some(content_type) = kind.content_type() {
        builder = builder.header("content-type", content_type);
    }
    Ok(builder.body(body).build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Reply;
    use crate::html::{default_renderer, Node};
    use crate::request::Request;
    use crate::route_set::{html, http, json, text};
    use crate::router::Router;

    async fn run(set: RouteSet, method: Method, accept: &str) -> Response {
        let request = Request::builder(method, "/")
            .header("accept", accept)
            .build()
            .unwrap();
        CompiledSet::compile(set).handle(Context::detached(request)).await
    }

    fn wrap_with(tag: &'static str) -> RouteSet {
        http(move |ctx: Context, next: Next| async move {
            let inner = next.run(ctx).await?;
            let body = inner.body_string().unwrap_or_default();
            Ok::<_, Error>(Response::text(format!("<{tag}>{body}</{tag}>")))
        })
    }

    #[tokio::test]
    async fn test_middleware_order() {
        let router = Router::new()
            .layer(wrap_with("outer"))
            .layer(wrap_with("inner"))
            .mount("/", text("content"));

        let res = run(router.mounts()[0].routes.clone(), Method::Get, "").await;
        assert_eq!(
            res.body_string().as_deref(),
            Some("<outer><inner>content</inner></outer>")
        );
    }

    #[tokio::test]
    async fn test_layer_after_mount_not_applied() {
        let router = Router::new()
            .mount("/before", text("plain"))
            .layer(wrap_with("mw"))
            .mount("/after", text("plain"));

        let before = run(router.mounts()[0].routes.clone(), Method::Get, "").await;
        let after = run(router.mounts()[1].routes.clone(), Method::Get, "").await;
        assert_eq!(before.body_string().as_deref(), Some("plain"));
        assert_eq!(after.body_string().as_deref(), Some("<mw>plain</mw>"));
    }

    #[tokio::test]
    async fn test_render_per_kind() {
        let set = text("hi").json(serde_json::json!({"a": 1})).html(Node::element("p").child("x"));

        let res = run(set.clone(), Method::Get, "text/plain").await;
        assert_eq!(res.content_type(), Some("text/plain; charset=utf-8"));
        assert_eq!(res.body_string().as_deref(), Some("hi"));

        let res = run(set.clone(), Method::Get, "application/json").await;
        assert_eq!(res.body_string().as_deref(), Some(r#"{"a":1}"#));

        let res = run(set, Method::Get, "text/html").await;
        assert_eq!(res.content_type(), Some("text/html; charset=utf-8"));
        assert_eq!(res.body_string().as_deref(), Some("<p>x</p>"));
    }

    #[tokio::test]
    async fn test_json_route_serializes_strings() {
        let res = run(json("quoted"), Method::Get, "").await;
        assert_eq!(res.body_string().as_deref(), Some("\"quoted\""));
    }

    #[tokio::test]
    async fn test_response_passes_through() {
        let set = text(|| async { Response::redirect("/login", false) });
        let res = run(set, Method::Get, "").await;
        assert_eq!(res.status, StatusCode::FOUND);
        assert_eq!(res.header("location"), Some("/login"));
    }

    #[tokio::test]
    async fn test_not_acceptable_without_content() {
        let res = run(RouteSet::new(), Method::Get, "").await;
        assert_eq!(res.status, StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let res = run(text("t").post(), Method::Get, "").await;
        assert_eq!(res.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("allow"), Some("POST"));
    }

    #[tokio::test]
    async fn test_head_falls_back_to_get() {
        let res = run(text("t"), Method::Head, "").await;
        assert_eq!(res.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_terminal_responder_short_circuits() {
        let set = http("blocked").text("content");
        let res = run(set, Method::Delete, "").await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body_string().as_deref(), Some("blocked"));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_response() {
        let set = text(|| async { Err::<String, _>(Error::http(StatusCode::FORBIDDEN, "nope")) });
        let res = run(set, Method::Get, "").await;
        assert_eq!(res.status, StatusCode::FORBIDDEN);
        assert_eq!(res.body_string().as_deref(), Some("nope"));

        let set = text(|| async { Err::<String, _>(Error::internal("secret")) });
        let res = run(set, Method::Get, "").await;
        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body_string().as_deref(), Some("Internal Server Error"));
    }

    #[tokio::test]
    async fn test_middleware_error_caught() {
        let set = http(|_ctx: Context, _next: Next| async move {
            Err::<Response, _>(Error::http(StatusCode::UNAUTHORIZED, "login first"))
        })
        .text("content");
        let res = run(set, Method::Get, "").await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_content_layering_with_next() {
        let set = text(|ctx: Context| async move {
            match ctx.next().await? {
                Reply::Text(inner) => Ok::<_, Error>(format!("[{}]", inner)),
                _ => Err(Error::internal("unexpected reply")),
            }
        })
        .text("inner");

        let res = run(set, Method::Get, "text/plain").await;
        assert_eq!(res.body_string().as_deref(), Some("[inner]"));
    }

    #[tokio::test]
    async fn test_next_on_innermost_is_error() {
        let set = text(|ctx: Context| async move { ctx.next().await });
        let res = run(set, Method::Get, "").await;
        assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_render_empty_reply() {
        let res = render_reply(Kind::Text, Reply::Empty, &default_renderer()).unwrap();
        assert_eq!(res.status, StatusCode::OK);
        assert!(res.body_string().unwrap_or_default().is_empty());
    }
}
