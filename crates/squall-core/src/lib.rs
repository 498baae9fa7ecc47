//! squall-core: route composition and content negotiation
//!
//! Routes are keyed by method and response media kind. A [`RouteSet`] is
//! mounted on a path pattern of a [`Router`]; at request time the set's
//! content routes are negotiated against `Accept`, and its `http` routes
//! wrap the result as middleware. [`Server`] runs the whole thing on
//! squall-native, one task per request.
//!
//! ## Example
//! ```no_run
//! use squall_core::{http, text, Context, Error, Next, Router, Server};
//!
//! # async fn run() -> squall_core::Result<()> {
//! let router = Router::new()
//!     .layer(http(|ctx: Context, next: Next| async move {
//!         tracing::info!(path = ctx.path(), "request");
//!         next.run(ctx).await
//!     }))
//!     .mount("/", text("hello").json(serde_json::json!({ "hello": "world" })))
//!     .mount(
//!         "/users/[id]",
//!         text(|ctx: Context| async move {
//!             Ok::<_, Error>(format!("user {}", ctx.slot("id").unwrap_or_default()))
//!         }),
//!     );
//!
//! Server::new(router).serve().await
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod bundle;
pub mod compose;
pub mod config;
pub mod context;
pub mod cookie;
pub mod error;
pub mod handler;
pub mod html;
pub mod negotiate;
pub mod request;
pub mod response;
pub mod route;
pub mod route_set;
pub mod router;
pub mod schema;
pub mod server;
pub mod socket;
pub mod table;

pub use bundle::{bundle_routes, mime_for_path, BundleManifest, DirectoryBundle, MemoryBundle};
pub use compose::{App, CompiledSet};
pub use config::ServerConfig;
pub use context::Context;
pub use cookie::{Cookie, CookieJar, SameSite};
pub use error::{Error, Result};
pub use handler::{Handler, HttpHandler, IntoHandler, IntoHttp, IntoOutcome, IntoReply, Next, Reply};
pub use html::{default_renderer, render_to_string, Html, Node, Renderer};
pub use negotiate::{match_kind, parse_accept, MediaRange};
pub use request::{Method, Request, RequestBuilder, RouteMethod};
pub use response::{Body, Response, ResponseBuilder, StatusCode};
pub use route::{Action, Kind, Route};
pub use route_set::{html, http, json, text, RouteSet};
pub use router::{Mount, Router};
pub use schema::{Fields, Issue, Schema, SchemaType, Schemas, StringFormat};
pub use server::{PendingRequest, Server, PLACEHOLDER_PATTERN};
pub use socket::{Socket, SocketError};
pub use table::RouteTable;

// Native types handlers see directly
pub use squall_native::{AbortController, AbortSignal, CloseReason, Message, StaticAsset};
