//! Minimal server: `cargo run -p squall-core --example hello`
//!
//! Log level follows `RUST_LOG` (default `info`).

use squall_core::{http, json, text, Context, Error, Message, Next, Router, Server, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> squall_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let router = Router::new()
        .layer(http(|ctx: Context, next: Next| async move {
            let started = std::time::Instant::now();
            let res = next.run(ctx.clone()).await;
            tracing::info!(path = ctx.path(), elapsed_us = started.elapsed().as_micros() as u64, "served");
            res
        }))
        .mount("/", text("Hello from squall").json(serde_json::json!({ "hello": "squall" })))
        .mount(
            "/users/[id]",
            json(|ctx: Context| async move {
                Ok::<_, Error>(serde_json::json!({ "id": ctx.slot("id") }))
            }),
        )
        .mount(
            "/ws",
            http(|ctx: Context| async move {
                let socket = ctx.upgrade().await?;
                socket
                    .run(|message| {
                        if let Message::Text(text) = message {
                            let _ = socket.send(text);
                        }
                        async {}
                    })
                    .await;
                Ok::<_, Error>(())
            }),
        );

    Server::with_config(router, ServerConfig::from_env()?).serve().await
}
