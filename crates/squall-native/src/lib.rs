//! squall-native: callback-style HTTP server
//!
//! The server knows nothing about routes, media types or negotiation. It
//! accepts connections, hands each request to a fetch callback together
//! with a [`ServerHandle`], and writes back whatever the callback resolves
//! to. The handle reloads the route table and upgrades WebSockets.
//!
//! ## Example
//! ```no_run
//! use futures_util::FutureExt;
//! use squall_native::{NativeResponse, NativeServer, ServeOptions};
//! use std::sync::Arc;
//!
//! # async fn run() -> squall_native::Result<()> {
//! let server = NativeServer::new(
//!     ServeOptions::default(),
//!     Arc::new(|req: Arc<squall_native::NativeRequest>, _server: squall_native::ServerHandle| {
//!         let path = req.path().to_string();
//!         async move { Some(NativeResponse::text(http::StatusCode::OK, path)) }.boxed()
//!     }),
//! );
//! server.listen()?.run().await
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod error;
pub mod request;
pub mod response;
pub mod routes;
pub mod server;
pub mod signal;
pub mod ws;

pub use error::{Error, Result};
pub use request::{is_websocket_upgrade, NativeRequest, DEFAULT_MAX_BODY_SIZE};
pub use response::{stream_from_chunks, BodyStream, NativeBody, NativeResponse, ResponseBody};
pub use routes::{NativeRoute, NativeRoutes, StaticAsset};
pub use server::{
    create_optimized_socket, shutdown_signal, ConnectionTracker, FetchFuture, FetchHandler,
    Listening, NativeServer, ServeOptions, ServerHandle,
};
pub use signal::{AbortController, AbortSignal};
pub use ws::{accept_key, CloseReason, Message, NativeSocket, Outgoing, SocketEvents};
