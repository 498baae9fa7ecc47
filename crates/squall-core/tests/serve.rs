//! End-to-end tests over real sockets

use futures_util::{SinkExt, StreamExt};
use squall_core::{http, text, Context, Error, Message, Next, Response, Router, Server, ServerConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;

struct Running {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl Running {
    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = timeout(Duration::from_secs(5), self.task).await;
    }
}

fn start(router: Router) -> Running {
    let config = ServerConfig::default().hostname("127.0.0.1").port(0);
    let server = Server::with_config(router, config);
    let listening = server.bind().unwrap();
    let addr = listening.local_addr();

    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        // Keep the server (and its route table) alive while serving
        let _server = server;
        let _ = listening
            .run_until(async {
                let _ = stopped.await;
            })
            .await;
    });

    Running {
        addr,
        stop: Some(stop),
        task,
    }
}

async fn raw(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .unwrap()
        .unwrap();
    String::from_utf8_lossy(&buf).into_owned()
}

async fn get(addr: SocketAddr, path: &str, accept: &str) -> String {
    raw(
        addr,
        &format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nAccept: {}\r\nConnection: close\r\n\r\n",
            path, accept
        ),
    )
    .await
}

#[tokio::test]
async fn test_negotiation_over_tcp() {
    let router = Router::new().mount("/", text("plain").json(serde_json::json!({"kind": "json"})));
    let running = start(router);

    let res = get(running.addr, "/", "").await;
    assert!(res.starts_with("HTTP/1.1 200 OK"));
    assert!(res.contains("content-type: application/json"));
    assert!(res.ends_with(r#"{"kind":"json"}"#));

    let res = get(running.addr, "/", "text/plain, application/json;q=0.5").await;
    assert!(res.contains("content-type: text/plain"));
    assert!(res.contains("content-length: 5"));
    assert!(res.ends_with("plain"));

    running.stop().await;
}

#[tokio::test]
async fn test_status_codes_over_tcp() {
    let router = Router::new()
        .mount("/only-post", text("t").post())
        .mount("/empty", http(|ctx: Context, next: Next| async move { next.run(ctx).await }));
    let running = start(router);

    assert!(get(running.addr, "/missing", "").await.starts_with("HTTP/1.1 404"));
    assert!(get(running.addr, "/empty", "").await.starts_with("HTTP/1.1 406"));

    let res = get(running.addr, "/only-post", "").await;
    assert!(res.starts_with("HTTP/1.1 405"));
    assert!(res.contains("allow: POST"));

    running.stop().await;
}

#[tokio::test]
async fn test_head_is_bodiless() {
    let running = start(Router::new().mount("/", text("body text")));

    let res = raw(
        running.addr,
        "HEAD / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(res.starts_with("HTTP/1.1 200 OK"));
    assert!(!res.contains("body text"));

    running.stop().await;
}

#[tokio::test]
async fn test_middleware_over_tcp() {
    let router = Router::new()
        .layer(http(|ctx: Context, next: Next| async move {
            let mut res = next.run(ctx).await?;
            res.headers.push(("x-layer".to_string(), "1".to_string()));
            Ok::<Response, Error>(res)
        }))
        .mount("/", text("hi"));
    let running = start(router);

    let res = get(running.addr, "/", "").await;
    assert!(res.contains("x-layer: 1"));
    assert!(res.ends_with("hi"));

    running.stop().await;
}

#[tokio::test]
async fn test_websocket_echo() {
    let router = Router::new().mount(
        "/ws",
        http(|ctx: Context| async move {
            let socket = ctx.upgrade().await?;
            socket
                .run(|message| {
                    let reply = match message {
                        Message::Text(text) => Message::Text(format!("echo: {}", text)),
                        other => other,
                    };
                    let _ = socket.send(reply);
                    async {}
                })
                .await;
            Ok::<_, Error>(())
        }),
    );
    let running = start(router);

    let stream = TcpStream::connect(running.addr).await.unwrap();
    let url = format!("ws://{}/ws", running.addr);
    let (mut ws, response) = tokio_tungstenite::client_async(url.as_str(), stream).await.unwrap();
    assert_eq!(response.status(), 101);

    ws.send(WsMessage::text("one")).await.unwrap();
    ws.send(WsMessage::text("two")).await.unwrap();

    for expected in ["echo: one", "echo: two"] {
        let reply = timeout(Duration::from_secs(5), ws.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(reply.into_text().unwrap().as_str(), expected);
    }

    ws.close(None).await.unwrap();
    running.stop().await;
}

#[tokio::test]
async fn test_websocket_closed_when_handler_returns() {
    let router = Router::new().mount(
        "/ws",
        http(|ctx: Context| async move {
            let socket = ctx.upgrade().await?;
            socket.send("hi")?;
            Ok::<_, Error>(())
        }),
    );
    let running = start(router);

    let stream = TcpStream::connect(running.addr).await.unwrap();
    let url = format!("ws://{}/ws", running.addr);
    let (mut ws, _) = tokio_tungstenite::client_async(url.as_str(), stream).await.unwrap();

    let first = timeout(Duration::from_secs(5), ws.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(first.into_text().unwrap().as_str(), "hi");

    for text in ["a", "b", "c"] {
        let _ = ws.send(WsMessage::text(text)).await;
    }

    let next = timeout(Duration::from_secs(3), ws.next()).await.unwrap().unwrap().unwrap();
    match next {
        WsMessage::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1000),
        other => panic!("expected a close frame, got {:?}", other),
    }

    running.stop().await;
}

#[tokio::test]
async fn test_upgrade_rejected_without_handshake() {
    let router = Router::new().mount(
        "/ws",
        http(|ctx: Context| async move {
            ctx.upgrade().await?;
            Ok::<_, Error>(())
        }),
    );
    let running = start(router);

    let res = get(running.addr, "/ws", "").await;
    assert!(res.starts_with("HTTP/1.1 400"));
    assert!(res.contains("DecodeError"));

    running.stop().await;
}
