//! Server adapter
//!
//! Bridges the native server's fetch callback onto the routing pipeline.
//! Every request gets its own task. The callback waits on a one-shot channel
//! the task answers through; the request's abort signal aborts that task
//! and nothing else.
//!
//! The route table is an immutable snapshot behind an [`ArcSwap`]. Adding
//! routes compiles a new table, publishes it and reloads the native route
//! configuration. Requests already running keep the snapshot they loaded.

use crate::bundle::{bundle_routes, BundleManifest};
use crate::config::ServerConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::html::{default_renderer, Renderer};
use crate::request::Request;
use crate::route_set::RouteSet;
use crate::router::Router;
use crate::table::RouteTable;
use arc_swap::ArcSwap;
use futures_util::future::FutureExt;
use parking_lot::{Mutex, RwLock};
use squall_native::{
    FetchHandler, Listening, NativeRequest, NativeResponse, NativeRoute, NativeRoutes, NativeServer,
    ServerHandle, StaticAsset,
};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info_span, Instrument};

/// Pattern registered when there is nothing else to register
///
/// The native layer ignores a reload with an empty table. A request target
/// cannot contain a NUL byte, so no request ever matches this.
pub const PLACEHOLDER_PATTERN: &str = "/\u{0}squall-placeholder";

/// Native request waiting for its task to answer
pub struct PendingRequest {
    native: Arc<NativeRequest>,
    server: ServerHandle,
    /// Path and query
    path: String,
    resolve: Mutex<Option<oneshot::Sender<NativeResponse>>>,
}

impl PendingRequest {
    fn new(native: Arc<NativeRequest>, server: ServerHandle, tx: oneshot::Sender<NativeResponse>) -> Self {
        let path = native
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        Self {
            native,
            server,
            path,
            resolve: Mutex::new(Some(tx)),
        }
    }

    /// Answer the request; only the first call has an effect
    pub fn resolve(&self, response: NativeResponse) -> bool {
        match self.resolve.lock().take() {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolve.lock().is_none()
    }

    pub fn native(&self) -> &Arc<NativeRequest> {
        &self.native
    }

    pub fn server(&self) -> &ServerHandle {
        &self.server
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

struct Inner {
    router: Mutex<Router>,
    table: ArcSwap<RouteTable>,
    statics: Mutex<Vec<(String, StaticAsset)>>,
    renderer: RwLock<Renderer>,
    next_id: AtomicU64,
}

/// Routing server
pub struct Server {
    inner: Arc<Inner>,
    config: ServerConfig,
    native: ServerHandle,
    listener: Mutex<Option<NativeServer>>,
}

impl Server {
    /// Server with default configuration
    pub fn new(router: Router) -> Self {
        Self::with_config(router, ServerConfig::default())
    }

    pub fn with_config(router: Router, config: ServerConfig) -> Self {
        let inner = Arc::new(Inner {
            router: Mutex::new(router),
            table: ArcSwap::from_pointee(RouteTable::default()),
            statics: Mutex::new(Vec::new()),
            renderer: RwLock::new(default_renderer()),
            next_id: AtomicU64::new(1),
        });

        let fetch_inner = Arc::clone(&inner);
        let handler: FetchHandler = Arc::new(move |native: Arc<NativeRequest>, server: ServerHandle| {
            fetch(Arc::clone(&fetch_inner), native, server).boxed()
        });
        let native = NativeServer::new(config.serve_options(), handler);

        let server = Self {
            inner,
            config,
            native: native.handle(),
            listener: Mutex::new(Some(native)),
        };
        server.reload();
        server
    }

    /// Replace the renderer used for node trees in `text/html` routes
    pub fn with_renderer(self, renderer: Renderer) -> Self {
        *self.inner.renderer.write() = renderer;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Merge more mounts into the live router
    pub fn add_routes(&self, router: Router) {
        {
            let mut current = self.inner.router.lock();
            *current = current.clone().merge(router);
        }
        self.reload();
    }

    /// Mount one route set on the live router
    pub fn mount(&self, pattern: impl Into<String>, routes: RouteSet) {
        self.add_routes(Router::new().mount(pattern, routes));
    }

    /// Serve a fixed response at an exact path, without running a task
    pub fn add_static(&self, path: impl Into<String>, asset: StaticAsset) {
        self.inner.statics.lock().push((path.into(), asset));
        self.reload();
    }

    /// Serve a bundle's artifacts under `prefix`
    pub fn add_bundle(&self, prefix: &str, manifest: Arc<dyn BundleManifest>) {
        let pattern = format!("{}/[...path]", prefix.trim_end_matches('/'));
        self.mount(pattern, bundle_routes(manifest));
    }

    /// Compile the router and publish the new table
    ///
    /// Holds the router lock until published so reloads land in order.
    fn reload(&self) {
        let router = self.inner.router.lock();
        let table = RouteTable::compile(&router);

        let mut routes = NativeRoutes::new();
        for pattern in table.patterns() {
            routes.insert(pattern.clone(), NativeRoute::Fetch);
        }
        for (path, asset) in self.inner.statics.lock().iter() {
            routes.insert(path.clone(), NativeRoute::Static(asset.clone()));
        }
        if routes.is_empty() {
            routes.insert(PLACEHOLDER_PATTERN, NativeRoute::Fetch);
        }

        debug!(mounts = table.len(), native_routes = routes.len(), "publishing route table");
        self.inner.table.store(Arc::new(table));
        self.native.reload(routes);
    }

    /// Handle of the native server
    pub fn native_handle(&self) -> ServerHandle {
        self.native.clone()
    }

    /// Patterns in the native route configuration
    pub fn route_count(&self) -> usize {
        self.native.route_count()
    }

    /// Mounted patterns of the live table
    pub fn patterns(&self) -> Vec<String> {
        self.inner.table.load().patterns().to_vec()
    }

    /// Run a request through the full pipeline without a socket
    pub async fn handle(&self, request: Request) -> NativeResponse {
        self.native.respond(Arc::clone(request.native())).await
    }

    /// Bind the listener
    ///
    /// Must be called from within a tokio runtime, once.
    pub fn bind(&self) -> Result<Listening> {
        let native = self
            .listener
            .lock()
            .take()
            .ok_or_else(|| Error::internal("server already bound"))?;
        Ok(native.listen()?)
    }

    /// Serve until SIGINT or SIGTERM
    pub async fn serve(&self) -> Result<()> {
        self.bind()?.run().await?;
        Ok(())
    }

    /// Serve until `shutdown` resolves
    pub async fn serve_until(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        self.bind()?.run_until(shutdown).await?;
        Ok(())
    }
}

async fn fetch(inner: Arc<Inner>, native: Arc<NativeRequest>, server: ServerHandle) -> Option<NativeResponse> {
    let (tx, rx) = oneshot::channel();
    let pending = Arc::new(PendingRequest::new(Arc::clone(&native), server, tx));

    let request_id = inner.next_id.fetch_add(1, Ordering::Relaxed);
    let span = info_span!("request", request_id, method = %native.method(), path = pending.path());
    let table = inner.table.load_full();
    let renderer = inner.renderer.read().clone();

    let task = tokio::spawn(dispatch(table, renderer, pending).instrument(span));
    let abort = task.abort_handle();
    native.signal().on_abort(move || {
        debug!(request_id, "request aborted");
        abort.abort();
    });

    rx.await.ok()
}

async fn dispatch(table: Arc<RouteTable>, renderer: Renderer, pending: Arc<PendingRequest>) {
    let response = match Request::from_native(Arc::clone(pending.native())) {
        Err(err) => err.into_response(),
        Ok(request) => match table.lookup(request.path()) {
            Some((set, slots)) => {
                let ctx = Context::new(request, slots, Some(Arc::clone(&pending)), renderer);
                set.handle(ctx).await
            }
            None => Error::RouteNotFound {
                path: request.path().to_string(),
            }
            .into_response(),
        },
    };

    debug!(status = response.status.as_u16(), "request complete");
    pending.resolve(response.into_native());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;
    use crate::route_set::{json, text};
    use squall_native::AbortController;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    async fn body(res: NativeResponse) -> String {
        String::from_utf8(res.into_bytes().await.unwrap().to_vec()).unwrap()
    }

    fn get(url: &str) -> Request {
        Request::builder(Method::Get, url).build().unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_and_negotiate() {
        let router = Router::new().mount("/", text("hello").json(serde_json::json!({"hello": "world"})));
        let server = Server::new(router);

        let res = server.handle(get("/")).await;
        assert_eq!(res.status, http::StatusCode::OK);
        assert_eq!(body(res).await, r#"{"hello":"world"}"#);

        let request = Request::builder(Method::Get, "/")
            .header("accept", "text/plain")
            .build()
            .unwrap();
        assert_eq!(body(server.handle(request).await).await, "hello");
    }

    #[tokio::test]
    async fn test_not_found() {
        let server = Server::new(Router::new().mount("/users", text("u")));
        let res = server.handle(get("/posts")).await;
        assert_eq!(res.status, http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_slots_reach_handler() {
        let router = Router::new().mount(
            "/users/[id]",
            text(|ctx: Context| async move { format!("user {}", ctx.slot("id").unwrap_or_default()) }),
        );
        let server = Server::new(router);
        assert_eq!(body(server.handle(get("/users/42")).await).await, "user 42");
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let server = Server::new(Router::new().mount("/", text("t")));
        let native = http::Request::builder()
            .method("TRACE")
            .uri("/")
            .body(bytes::Bytes::new())
            .unwrap();
        let native = Arc::new(NativeRequest::from_bytes(native, squall_native::AbortSignal::new()));
        let res = server.native_handle().respond(native).await;
        assert_eq!(res.status, http::StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_placeholder_route() {
        let server = Server::new(Router::new());
        assert_eq!(server.route_count(), 1);
        assert!(server.patterns().is_empty());

        let res = server.handle(get("/")).await;
        assert_eq!(res.status, http::StatusCode::NOT_FOUND);
        assert!(!body(res).await.contains("placeholder"));

        // Real routes replace the placeholder
        server.mount("/", text("home"));
        assert_eq!(server.route_count(), 1);
        assert_eq!(body(server.handle(get("/")).await).await, "home");
    }

    #[tokio::test]
    async fn test_static_asset() {
        let server = Server::new(Router::new());
        server.add_static("/robots.txt", StaticAsset::new("text/plain", "User-agent: *"));

        let res = server.handle(get("/robots.txt")).await;
        assert_eq!(res.header("content-type"), Some("text/plain"));
        assert_eq!(body(res).await, "User-agent: *");
    }

    #[tokio::test]
    async fn test_add_bundle() {
        let server = Server::new(Router::new());
        let bundle = crate::bundle::MemoryBundle::new().with("app.js", "run()");
        server.add_bundle("/assets/", Arc::new(bundle));

        assert_eq!(server.patterns(), vec!["/assets/[...path]".to_string()]);
        assert_eq!(body(server.handle(get("/assets/app.js")).await).await, "run()");
        assert_eq!(
            server.handle(get("/assets/nope.js")).await.status,
            http::StatusCode::NOT_FOUND
        );
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_abort_cancels_only_that_request() {
        let started = Arc::new(Notify::new());
        let released = Arc::new(AtomicBool::new(false));

        let slow = {
            let started = Arc::clone(&started);
            let released = Arc::clone(&released);
            move || {
                let started = Arc::clone(&started);
                let released = Arc::clone(&released);
                async move {
                    let _guard = DropFlag(released);
                    started.notify_one();
                    std::future::pending::<()>().await;
                    "unreachable"
                }
            }
        };
        let router = Router::new().mount("/slow", text(slow)).mount("/fast", text("fast"));
        let server = Arc::new(Server::new(router));

        let controller = AbortController::new();
        let request = Request::builder(Method::Get, "/slow")
            .signal(controller.signal())
            .build()
            .unwrap();
        let in_flight = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.handle(request).await }
        });
        started.notified().await;

        // Unrelated requests keep working
        assert_eq!(body(server.handle(get("/fast")).await).await, "fast");

        assert!(controller.abort());
        let res = timeout(Duration::from_secs(1), in_flight).await.unwrap().unwrap();
        // Never resolved by the task; the native layer answers on its own
        assert_eq!(res.status, http::StatusCode::INTERNAL_SERVER_ERROR);

        timeout(Duration::from_secs(1), async {
            while !released.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("aborted task released its resources");

        assert_eq!(body(server.handle(get("/fast")).await).await, "fast");
    }

    #[tokio::test]
    async fn test_reload_keeps_in_flight_snapshot() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let waiting = {
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            move || {
                let started = Arc::clone(&started);
                let release = Arc::clone(&release);
                async move {
                    started.notify_one();
                    release.notified().await;
                    "old"
                }
            }
        };
        let server = Arc::new(Server::new(Router::new().mount("/", text(waiting))));

        let in_flight = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.handle(get("/")).await }
        });
        started.notified().await;

        server.mount("/new", json(serde_json::json!({"fresh": true})));
        release.notify_one();

        let res = timeout(Duration::from_secs(1), in_flight).await.unwrap().unwrap();
        assert_eq!(body(res).await, "old");
        assert_eq!(body(server.handle(get("/new")).await).await, r#"{"fresh":true}"#);
    }

    #[tokio::test]
    async fn test_resolve_once() {
        let (tx, mut rx) = oneshot::channel();
        let native = Arc::new(NativeRequest::from_bytes(
            http::Request::builder().uri("/a?b=1").body(bytes::Bytes::new()).unwrap(),
            squall_native::AbortSignal::new(),
        ));
        let server = Server::new(Router::new());
        let pending = PendingRequest::new(native, server.native_handle(), tx);

        assert_eq!(pending.path(), "/a?b=1");
        assert!(pending.resolve(NativeResponse::new(http::StatusCode::OK)));
        assert!(pending.is_resolved());
        assert!(!pending.resolve(NativeResponse::new(http::StatusCode::IM_A_TEAPOT)));
        assert_eq!(rx.try_recv().unwrap().status, http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_bind_once() {
        let config = ServerConfig::default().hostname("127.0.0.1").port(0);
        let server = Server::with_config(Router::new(), config);
        let listening = server.bind().unwrap();
        assert_ne!(listening.local_addr().port(), 0);
        assert!(server.bind().is_err());
    }
}
