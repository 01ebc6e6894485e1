//! Shared helpers for the relay integration tests

use std::fs;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use mcp_relay::mcp::Dispatcher;
use mcp_relay::server::{build_router, AppState, RelaySettings, SessionRegistry};

/// Answers every request with `{"result":"pong"}`; `notifications/*` get nothing.
#[allow(dead_code)]
pub struct PongDispatcher;

#[async_trait]
impl Dispatcher for PongDispatcher {
    async fn dispatch(&self, message: &str) -> Option<Value> {
        let value: Value = serde_json::from_str(message).unwrap_or(Value::Null);
        let is_notification = value
            .get("method")
            .and_then(Value::as_str)
            .map(|method| method.starts_with("notifications/"))
            .unwrap_or(false);
        if is_notification {
            None
        } else {
            Some(serde_json::json!({"result": "pong"}))
        }
    }
}

/// A relay listening on an ephemeral local port
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<SessionRegistry>,
    handle: JoinHandle<()>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Poll until the registry holds `expected` sessions or `deadline` passes.
    pub async fn wait_for_sessions(&self, expected: usize, deadline: Duration) -> bool {
        let start = tokio::time::Instant::now();
        while start.elapsed() < deadline {
            if self.registry.len() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.registry.len() == expected
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[allow(dead_code)]
pub async fn spawn_server(state: AppState) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("listener has no address");
    let registry = Arc::clone(&state.registry);
    let router = build_router(state);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).into_future().await;
    });
    TestServer {
        addr,
        registry,
        handle,
    }
}

/// Server backed by [`PongDispatcher`]
#[allow(dead_code)]
pub async fn spawn_pong_server(settings: RelaySettings) -> TestServer {
    spawn_server(AppState::new(
        Arc::new(SessionRegistry::new()),
        Arc::new(PongDispatcher),
        settings,
    ))
    .await
}

/// One parsed event-stream frame
#[allow(dead_code)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: Option<String>,
    pub comment: Option<String>,
}

impl SseFrame {
    fn parse(raw: &str) -> Self {
        let mut frame = SseFrame::default();
        let mut data_lines: Vec<&str> = Vec::new();
        for line in raw.split('\n') {
            let line = line.trim_end_matches('\r');
            if let Some(rest) = line.strip_prefix(':') {
                frame.comment = Some(rest.trim_start().to_string());
            } else if let Some(rest) = line.strip_prefix("event:") {
                frame.event = Some(rest.trim_start().to_string());
            } else if let Some(rest) = line.strip_prefix("data:") {
                data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
            }
        }
        if !data_lines.is_empty() {
            frame.data = Some(data_lines.join("\n"));
        }
        frame
    }
}

/// Incremental frame reader over a streaming response body
#[allow(dead_code)]
pub struct SseReader {
    body: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: String,
}

#[allow(dead_code)]
impl SseReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            body: Box::pin(response.bytes_stream()),
            buffer: String::new(),
        }
    }

    /// Next complete frame; `None` when the stream ends or `deadline` passes.
    pub async fn next_frame(&mut self, deadline: Duration) -> Option<SseFrame> {
        tokio::time::timeout(deadline, self.read_frame())
            .await
            .ok()
            .flatten()
    }

    async fn read_frame(&mut self) -> Option<SseFrame> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let raw: String = self.buffer.drain(..end + 2).collect();
                return Some(SseFrame::parse(&raw));
            }
            let chunk = self.body.next().await?.ok()?;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
