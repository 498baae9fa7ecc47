//! Handler normalization
//!
//! Content routes accept a literal value, a closure with no arguments, or a
//! closure of the request [`Context`]. All of them become a [`Handler`], the
//! single canonical `Context -> Future<Result<Reply>>` shape.
//!
//! `http` routes additionally accept middleware: a closure of the context and
//! the [`Next`] stage.

use crate::compose::App;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::html::{Html, Node};
use crate::response::Response;
use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Value produced by a handler, rendered per the route's media kind
#[derive(Debug)]
pub enum Reply {
    Empty,
    Text(String),
    Html(Html),
    Json(Value),
    /// Finished response, passed through unchanged
    Response(Box<Response>),
}

impl Reply {
    /// Serialize any value as a JSON reply
    pub fn json<T: Serialize>(value: &T) -> Result<Reply> {
        Ok(Reply::Json(serde_json::to_value(value)?))
    }
}

/// Conversion into a [`Reply`]
pub trait IntoReply {
    fn into_reply(self) -> Reply;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Reply {
        self
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Reply {
        Reply::Empty
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Reply {
        Reply::Text(self.to_string())
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Reply {
        Reply::Text(self)
    }
}

impl IntoReply for Html {
    fn into_reply(self) -> Reply {
        Reply::Html(self)
    }
}

impl IntoReply for Node {
    fn into_reply(self) -> Reply {
        Reply::Html(Html::Node(self))
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> Reply {
        Reply::Json(self)
    }
}

impl IntoReply for Response {
    fn into_reply(self) -> Reply {
        Reply::Response(Box::new(self))
    }
}

/// Output of a handler future: a reply or a failed reply
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<Reply>;
}

impl<T: IntoReply> IntoOutcome for T {
    fn into_outcome(self) -> Result<Reply> {
        Ok(self.into_reply())
    }
}

impl<T, E> IntoOutcome for std::result::Result<T, E>
where
    T: IntoReply,
    E: Into<Error>,
{
    fn into_outcome(self) -> Result<Reply> {
        self.map(IntoReply::into_reply).map_err(Into::into)
    }
}

type HandlerFn = dyn Fn(Context) -> BoxFuture<'static, Result<Reply>> + Send + Sync;

/// Canonical handler
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply>> + Send + 'static,
    {
        Handler(Arc::new(move |ctx| f(ctx).boxed()))
    }

    pub fn call(&self, ctx: Context) -> BoxFuture<'static, Result<Reply>> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

/// Marker: a literal value answered on every request
pub struct Literal;
/// Marker: a closure with no arguments
pub struct Effect;
/// Marker: a closure of the request context
pub struct WithContext;
/// Marker: an already normalized handler
pub struct Canonical;

/// Anything usable as a content handler
pub trait IntoHandler<M> {
    fn into_handler(self) -> Handler;
}

impl<T> IntoHandler<Literal> for T
where
    T: IntoReply + Clone + Send + Sync + 'static,
{
    fn into_handler(self) -> Handler {
        Handler(Arc::new(move |_| {
            let reply = self.clone().into_reply();
            async move { Ok(reply) }.boxed()
        }))
    }
}

impl<F, Fut> IntoHandler<Effect> for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoOutcome,
{
    fn into_handler(self) -> Handler {
        Handler(Arc::new(move |_| {
            let fut = self();
            async move { fut.await.into_outcome() }.boxed()
        }))
    }
}

impl<F, Fut> IntoHandler<WithContext> for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoOutcome,
{
    fn into_handler(self) -> Handler {
        Handler(Arc::new(move |ctx| {
            let fut = self(ctx);
            async move { fut.await.into_outcome() }.boxed()
        }))
    }
}

impl IntoHandler<Canonical> for Handler {
    fn into_handler(self) -> Handler {
        self
    }
}

type MiddlewareFn = dyn Fn(Context, Next) -> BoxFuture<'static, Result<Response>> + Send + Sync;

/// Handler of an `http` route
#[derive(Clone)]
pub enum HttpHandler {
    /// Terminal responder; never calls the next stage
    Responder(Handler),
    /// Receives the next stage and decides whether to run it
    Middleware(Arc<MiddlewareFn>),
}

impl fmt::Debug for HttpHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpHandler::Responder(_) => f.write_str("Responder"),
            HttpHandler::Middleware(_) => f.write_str("Middleware"),
        }
    }
}

/// Marker: a `(Context, Next)` closure
pub struct Wrap;
/// Marker: a terminal responder built from any content handler
pub struct Respond<M>(std::marker::PhantomData<M>);

/// Anything usable as an `http` route
pub trait IntoHttp<M> {
    fn into_http(self) -> HttpHandler;
}

impl<F, Fut> IntoHttp<Wrap> for F
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    fn into_http(self) -> HttpHandler {
        HttpHandler::Middleware(Arc::new(move |ctx, next| self(ctx, next).boxed()))
    }
}

impl<H, M> IntoHttp<Respond<M>> for H
where
    H: IntoHandler<M>,
{
    fn into_http(self) -> HttpHandler {
        HttpHandler::Responder(self.into_handler())
    }
}

/// Remainder of the pipeline below a middleware
#[derive(Clone)]
pub struct Next {
    app: App,
}

impl Next {
    pub(crate) fn new(app: App) -> Self {
        Self { app }
    }

    /// Run the inner stages
    pub async fn run(self, ctx: Context) -> Result<Response> {
        (self.app)(ctx).await
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Method, Request};

    fn ctx() -> Context {
        Context::detached(Request::builder(Method::Get, "/").build().unwrap())
    }

    async fn reply_text<M>(handler: impl IntoHandler<M>) -> String {
        match handler.into_handler().call(ctx()).await.unwrap() {
            Reply::Text(s) => s,
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_literal_handler() {
        assert_eq!(reply_text("hello").await, "hello");
        assert_eq!(reply_text(String::from("owned")).await, "owned");
    }

    #[tokio::test]
    async fn test_effect_handler() {
        assert_eq!(reply_text(|| async { "lazy" }).await, "lazy");
    }

    #[tokio::test]
    async fn test_context_handler() {
        let handler = |ctx: Context| async move { format!("path={}", ctx.path()) };
        assert_eq!(reply_text(handler).await, "path=/");
    }

    #[tokio::test]
    async fn test_failing_handler() {
        let handler = || async { Err::<String, _>(Error::internal("boom")) };
        let err = handler.into_handler().call(ctx()).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_http_markers() {
        let responder = "static".into_http();
        assert!(matches!(responder, HttpHandler::Responder(_)));

        let middleware = (|ctx: Context, next: Next| async move { next.run(ctx).await }).into_http();
        assert!(matches!(middleware, HttpHandler::Middleware(_)));
    }

    #[test]
    fn test_reply_json() {
        #[derive(Serialize)]
        struct User {
            id: u32,
        }
        let reply = Reply::json(&User { id: 7 }).unwrap();
        assert!(matches!(reply, Reply::Json(v) if v["id"] == 7));
    }
}
