//! Shared helpers for the network tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;

/// Call `check` until it returns `Some` or the deadline passes
pub fn wait_for<T>(timeout: Duration, mut check: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(value) = check() {
            return Some(value);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    None
}

/// One request as seen by [`HttpStub`]
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Canned response: status line, content type and body
pub struct Reply {
    pub status: &'static str,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: "200 OK",
            content_type: "application/json",
            body: body.into(),
        }
    }

    pub fn sse(events: &[&str]) -> Self {
        let body = events
            .iter()
            .map(|e| format!("data: {}\n\n", e))
            .collect::<String>();
        Self {
            status: "200 OK",
            content_type: "text/event-stream",
            body,
        }
    }

    pub fn error(status: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.into(),
        }
    }
}

type Route = Arc<dyn Fn(&Request) -> Reply + Send + Sync>;

/// Minimal HTTP/1.1 server answering every connection with `route`
pub struct HttpStub {
    pub addr: SocketAddr,
    pub requests: crossbeam_channel::Receiver<Request>,
}

impl HttpStub {
    pub fn start(runtime: &Runtime, route: impl Fn(&Request) -> Reply + Send + Sync + 'static) -> Self {
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .expect("bind stub");
        let addr = listener.local_addr().expect("stub address");
        let (tx, requests) = crossbeam_channel::unbounded();
        let route: Route = Arc::new(route);

        runtime.spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let route = Arc::clone(&route);
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(request) = serve(stream, route).await {
                        let _ = tx.send(request);
                    }
                });
            }
        });

        Self { addr, requests }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }
}

async fn serve(mut stream: TcpStream, route: Route) -> Option<Request> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while raw.len() < header_end + content_length {
        let n = stream.read(&mut buf).await.ok()?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
    }

    let mut request_line = head.lines().next()?.split_whitespace();
    let request = Request {
        method: request_line.next()?.to_string(),
        path: request_line.next()?.to_string(),
        body: String::from_utf8_lossy(&raw[header_end..]).to_string(),
    };

    let reply = route(&request);
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reply.content_type,
        reply.body.len(),
        reply.body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
    Some(request)
}
