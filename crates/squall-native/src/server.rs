//! Native HTTP server
//!
//! HTTP/1.1 server on hyper with:
//! - One task per connection, requests handed to a fetch callback
//! - Static assets answered without calling fetch
//! - Route table swapped atomically on reload
//! - Abort signal fired when a client disconnects mid-request
//! - SO_REUSEPORT and TCP_NODELAY on the listening socket

use crate::error::{Error, Result};
use crate::request::{NativeRequest, DEFAULT_MAX_BODY_SIZE};
use crate::response::{NativeResponse, ResponseBody};
use crate::routes::{NativeRoute, NativeRoutes};
use crate::signal::{AbortController, AbortOnDrop};
use crate::ws::{accept_key, run_socket, CloseReason, SocketEvents};
use arc_swap::ArcSwap;
use futures_util::future::BoxFuture;
use http::{Method, StatusCode};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use socket2::{Domain, Protocol, Socket, Type};
use std::convert::Infallible;
use std::future::Future;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Future returned by the fetch callback
///
/// Resolves to `None` when the request was never answered; the native
/// layer then replies 500.
pub type FetchFuture = BoxFuture<'static, Option<NativeResponse>>;

/// Request callback
pub type FetchHandler = Arc<dyn Fn(Arc<NativeRequest>, ServerHandle) -> FetchFuture + Send + Sync>;

/// Listener configuration
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub hostname: String,
    pub port: u16,
    pub max_body_size: usize,
    pub backlog: i32,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 3000,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            backlog: 1024,
        }
    }
}

impl ServeOptions {
    /// Resolve `hostname:port`
    pub fn addr(&self) -> Result<SocketAddr> {
        (self.hostname.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|_| Error::InvalidAddress(format!("{}:{}", self.hostname, self.port)))?
            .next()
            .ok_or_else(|| Error::InvalidAddress(format!("{}:{}", self.hostname, self.port)))
    }
}

struct Shared {
    routes: ArcSwap<NativeRoutes>,
    fetch: FetchHandler,
    tracker: ConnectionTracker,
    options: ServeOptions,
}

/// Handle passed to every fetch call
///
/// Cheap to clone. Gives access to reload and WebSocket upgrade.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// Replace the route table
    ///
    /// Requests already dispatched keep the snapshot they loaded. An empty
    /// table is ignored and the previous one stays in place.
    pub fn reload(&self, routes: NativeRoutes) {
        if routes.is_empty() {
            debug!("reload with empty route table ignored");
            return;
        }
        info!(routes = routes.len(), "route table reloaded");
        self.shared.routes.store(Arc::new(routes));
    }

    /// Number of patterns in the live table
    pub fn route_count(&self) -> usize {
        self.shared.routes.load().len()
    }

    /// Snapshot of the live table
    pub fn routes(&self) -> Arc<NativeRoutes> {
        self.shared.routes.load_full()
    }

    pub fn options(&self) -> &ServeOptions {
        &self.shared.options
    }

    /// Active connection count
    pub fn connections(&self) -> u64 {
        self.shared.tracker.count()
    }

    /// Accept a WebSocket handshake
    ///
    /// On success the pending fetch call is answered with
    /// `101 Switching Protocols` whatever it resolves to, and `events`
    /// receives the connection lifecycle. Returns false when the request is
    /// not an upgrade or was already upgraded.
    pub fn upgrade(&self, request: &NativeRequest, events: Arc<dyn SocketEvents>) -> bool {
        if !request.is_websocket_upgrade() {
            return false;
        }
        let Some(key) = request.header("sec-websocket-key") else {
            return false;
        };
        let accept = accept_key(key);
        let Some(on_upgrade) = request.take_upgrade() else {
            return false;
        };
        request.set_accept_key(accept);

        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => run_socket(upgraded, events).await,
                Err(err) => {
                    debug!(error = %err, "websocket upgrade failed");
                    events.on_close(CloseReason::abnormal());
                }
            }
        });
        true
    }

    /// Answer one request: static assets directly, everything else via fetch
    pub async fn respond(&self, request: Arc<NativeRequest>) -> NativeResponse {
        if let Some(NativeRoute::Static(asset)) = self.shared.routes.load().lookup(request.path()) {
            return asset.to_response();
        }

        let resolved = (self.shared.fetch)(Arc::clone(&request), self.clone()).await;

        if let Some(accept) = request.take_accept_key() {
            return NativeResponse::switching_protocols(&accept);
        }

        match resolved {
            Some(response) => response,
            None => {
                warn!(method = %request.method(), path = request.path(), "fetch did not resolve");
                NativeResponse::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }
}

/// Native server before it starts listening
pub struct NativeServer {
    handle: ServerHandle,
}

impl NativeServer {
    pub fn new(options: ServeOptions, fetch: FetchHandler) -> Self {
        let shared = Shared {
            routes: ArcSwap::from_pointee(NativeRoutes::new()),
            fetch,
            tracker: ConnectionTracker::new(),
            options,
        };
        Self {
            handle: ServerHandle {
                shared: Arc::new(shared),
            },
        }
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Bind the listening socket
    ///
    /// Must be called from within a tokio runtime.
    pub fn listen(self) -> Result<Listening> {
        let options = &self.handle.shared.options;
        let addr = options.addr()?;
        let socket = create_optimized_socket(&addr, options.backlog)?;
        socket.set_nonblocking(true)?;
        let listener = TcpListener::from_std(socket.into())?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "listening");
        Ok(Listening {
            listener,
            handle: self.handle,
            local_addr,
        })
    }
}

/// Bound server
pub struct Listening {
    listener: TcpListener,
    handle: ServerHandle,
    local_addr: SocketAddr,
}

impl Listening {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Serve until SIGINT or SIGTERM
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then drain open connections
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let Listening {
            listener, handle, ..
        } = self;
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };
                    let _ = stream.set_nodelay(true);
                    tasks.spawn(serve_connection(handle.clone(), stream, remote_addr, stop_rx.clone()));
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        handle.shared.tracker.start_shutdown();
        let _ = stop_tx.send(true);
        while tasks.join_next().await.is_some() {}

        info!("server stopped");
        Ok(())
    }
}

async fn serve_connection(
    handle: ServerHandle,
    stream: tokio::net::TcpStream,
    remote_addr: SocketAddr,
    mut stop: watch::Receiver<bool>,
) {
    // Accepted just before the drain started; close without serving
    if handle.shared.tracker.is_shutting_down() {
        debug!(peer = %remote_addr, "connection refused during shutdown");
        return;
    }

    let tracker_handle = handle.clone();
    tracker_handle.shared.tracker.increment();

    let svc = service_fn(move |req| {
        let handle = handle.clone();
        async move { Ok::<_, Infallible>(dispatch(handle, req, remote_addr).await) }
    });

    let conn = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), svc)
        .with_upgrades();
    tokio::pin!(conn);

    let res = tokio::select! {
        res = conn.as_mut() => res,
        _ = stop.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = res {
        debug!(peer = %remote_addr, "connection error: {e}");
    }

    tracker_handle.shared.tracker.decrement();
}

async fn dispatch(
    handle: ServerHandle,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> hyper::Response<ResponseBody> {
    let controller = AbortController::new();
    // Fires if hyper drops this future before we return
    let mut guard = AbortOnDrop::new(controller.clone());

    let head = req.method() == Method::HEAD;
    let max_body_size = handle.shared.options.max_body_size;
    let request = Arc::new(NativeRequest::from_hyper(
        req,
        controller.signal(),
        remote_addr,
        max_body_size,
    ));

    let response = handle.respond(request).await;
    guard.disarm();
    response.into_hyper(head)
}

/// Create a TCP socket with optimizations
pub fn create_optimized_socket(addr: &SocketAddr, backlog: i32) -> std::io::Result<Socket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // SO_REUSEADDR - allow binding to address in TIME_WAIT
    socket.set_reuse_address(true)?;

    // SO_REUSEPORT - enable kernel load balancing across processes
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    // TCP_NODELAY - disable Nagle's algorithm for lower latency
    socket.set_nodelay(true)?;

    socket.bind(&(*addr).into())?;
    socket.listen(backlog)?;

    Ok(socket)
}

/// Resolves on the first SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}

/// Tracks active connections for graceful shutdown
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    active: AtomicU64,
    shutting_down: AtomicBool,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn decrement(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Signal that shutdown is in progress
    pub fn start_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}
