//! A throwaway HTTP endpoint that answers `GET /TAP/sync` like the archive does.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub struct Reply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Handler = Arc<dyn Fn(&str, &str) -> Reply + Send + Sync>;

pub struct FakeTap {
    pub url: String,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeTap {
    /// `handler` receives the decoded `query` and `format` parameters
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str, &str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);

        let seen = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(handle_connection(stream, handler.clone(), seen.clone()));
            }
        });

        Self {
            url: format!("http://{}/TAP", addr),
            requests,
        }
    }

    /// Every `(query, format)` pair received so far
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    handler: Handler,
    requests: Arc<Mutex<Vec<(String, String)>>>,
) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    while !buffer.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
        }
    }

    let request = String::from_utf8_lossy(&buffer).to_string();
    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let (path, params) = target.split_once('?').unwrap_or((target, ""));
    let mut query = String::new();
    let mut format = String::new();
    for pair in params.split('&') {
        match pair.split_once('=') {
            Some(("query", v)) => query = decode(v),
            Some(("format", v)) => format = decode(v),
            _ => {}
        }
    }

    let reply = if path.ends_with("/sync") {
        requests.lock().unwrap().push((query.clone(), format.clone()));
        handler(&query, &format)
    } else {
        Reply::status(404, "not found")
    };

    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }

    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        if reply.status < 400 { "OK" } else { "Error" },
        reply.body.len(),
        reply.body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                match u8::from_str_radix(&raw[i + 1..i + 3], 16) {
                    Ok(b) => out.push(b),
                    Err(_) => out.extend_from_slice(&bytes[i..i + 3]),
                }
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).to_string()
}

pub const PLANETS_JSON: &str = r#"[
    {"pl_name": "Kepler-22 b", "pl_rade": 2.1, "pl_bmasse": 9.1},
    {"pl_name": "TRAPPIST-1 e", "pl_rade": 0.92, "pl_bmasse": 0.69},
    {"pl_name": "K2-18 b", "pl_rade": 2.61, "pl_bmasse": 8.63}
]"#;
