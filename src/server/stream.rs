//! `GET /mcp`: the session event stream
//!
//! Each accepted request registers a session and holds it open for as long
//! as the response body lives. The first event tells the client where to
//! POST; every later event carries one relayed message, in queue order.
//! Idle periods are filled with comment lines so intermediaries keep the
//! connection open.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use futures::stream::{self, Stream, StreamExt};
use url::Url;

use super::registry::{SessionGuard, SessionId, SessionReceiver};
use super::{AppState, MCP_PATH, SESSION_QUERY_PARAM};
use crate::error::RelayError;

pub const ENDPOINT_EVENT: &str = "endpoint";
pub const MESSAGE_EVENT: &str = "message";
pub const KEEP_ALIVE_COMMENT: &str = "keep-alive";

/// How long an idle stream waits before writing a keep-alive comment.
///
/// Slightly shorter than `keep_alive`, so any window of that length on an
/// idle stream contains at least one comment.
pub fn idle_wait(keep_alive: Duration) -> Duration {
    keep_alive - keep_alive / 10
}

/// Absolute URL a client must POST to for `id`.
pub fn endpoint_url(base: &Url, id: &SessionId) -> Url {
    let mut url = base.clone();
    let path = format!("{}{}", base.path().trim_end_matches('/'), MCP_PATH);
    url.set_path(&path);
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair(SESSION_QUERY_PARAM, id.as_str());
    url
}

pub async fn open_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, RelayError> {
    let base = state.settings.base_url(&headers)?;
    let (guard, receiver) = state.registry.open();
    let endpoint = endpoint_url(&base, guard.id());

    tracing::info!(session_id = %guard.id(), endpoint = %endpoint, "session stream opened");

    let events = session_events(endpoint, guard, receiver, state.settings.keep_alive);
    Ok((
        [(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        )],
        Sse::new(events),
    ))
}

/// Bootstrap event followed by the session's messages.
///
/// The session guard lives inside the stream, so the registry entry goes
/// away whenever the stream is dropped, whatever the reason.
pub fn session_events(
    endpoint: Url,
    guard: SessionGuard,
    receiver: SessionReceiver,
    keep_alive: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    let bootstrap = Event::default()
        .event(ENDPOINT_EVENT)
        .data(endpoint.as_str());

    let session = SessionStream {
        guard,
        receiver,
        pending: VecDeque::new(),
        idle_wait: idle_wait(keep_alive),
        finished: false,
    };

    stream::once(async move { Ok::<_, Infallible>(bootstrap) }).chain(stream::unfold(
        session,
        |mut session| async move {
            let event = session.next_event().await?;
            Some((Ok(event), session))
        },
    ))
}

struct SessionStream {
    guard: SessionGuard,
    receiver: SessionReceiver,
    pending: VecDeque<String>,
    idle_wait: Duration,
    finished: bool,
}

impl SessionStream {
    async fn next_event(&mut self) -> Option<Event> {
        if let Some(message) = self.pending.pop_front() {
            return Some(message_event(&message));
        }

        match tokio::time::timeout(self.idle_wait, self.receiver.recv()).await {
            Ok(Some(message)) => {
                while let Some(next) = self.receiver.try_recv() {
                    self.pending.push_back(next);
                }
                tracing::debug!(
                    session_id = %self.guard.id(),
                    queued = self.pending.len(),
                    "relaying message"
                );
                Some(message_event(&message))
            }
            Ok(None) => {
                tracing::debug!(session_id = %self.guard.id(), "session queue closed");
                self.finished = true;
                None
            }
            Err(_) => Some(Event::default().comment(KEEP_ALIVE_COMMENT)),
        }
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        if !self.finished {
            let error = RelayError::ConnectionLost(self.guard.id().to_string());
            tracing::debug!(%error, "stream dropped");
        }
    }
}

fn message_event(payload: &str) -> Event {
    // Event::data rejects carriage returns; line feeds become extra `data:` lines.
    if payload.contains('\r') {
        let normalized = payload.replace("\r\n", "\n").replace('\r', "\n");
        Event::default().event(MESSAGE_EVENT).data(normalized)
    } else {
        Event::default().event(MESSAGE_EVENT).data(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::registry::{SessionRegistry, SessionState};
    use std::sync::Arc;

    fn base() -> Url {
        Url::parse("http://localhost:3001").unwrap()
    }

    async fn render(event: Event) -> String {
        let body = Sse::new(stream::iter(vec![Ok::<_, Infallible>(event)])).into_response();
        let bytes = axum::body::to_bytes(body.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_endpoint_url_format() {
        let id = SessionId::generate();
        let url = endpoint_url(&base(), &id);
        assert_eq!(
            url.as_str(),
            format!("http://localhost:3001/mcp?sessionId={}", id)
        );
    }

    #[test]
    fn test_endpoint_url_keeps_base_path() {
        let id = SessionId::generate();
        let base = Url::parse("https://relay.example.com/tenant/?x=1#frag").unwrap();
        let url = endpoint_url(&base, &id);
        assert_eq!(
            url.as_str(),
            format!("https://relay.example.com/tenant/mcp?sessionId={}", id)
        );
    }

    #[tokio::test]
    async fn test_message_event_normalizes_carriage_returns() {
        let text = render(message_event("a\r\nb\rc")).await;
        assert_eq!(text, "event: message\ndata: a\ndata: b\ndata: c\n\n");
    }

    #[tokio::test]
    async fn test_bootstrap_then_messages_in_order() {
        let registry = Arc::new(SessionRegistry::new());
        let (guard, receiver) = registry.open();
        let id = guard.id().clone();
        let queue = registry.lookup(id.as_str()).unwrap();
        for i in 0..3 {
            queue.push(format!("{{\"n\":{}}}", i)).unwrap();
        }

        let endpoint = endpoint_url(&base(), &id);
        let events = session_events(endpoint, guard, receiver, Duration::from_secs(5));
        let rendered: Vec<String> = {
            let mut out = Vec::new();
            let mut events = Box::pin(events.take(4));
            while let Some(Ok(event)) = events.next().await {
                out.push(render(event).await);
            }
            out
        };

        assert_eq!(
            rendered[0],
            format!(
                "event: endpoint\ndata: http://localhost:3001/mcp?sessionId={}\n\n",
                id
            )
        );
        for (i, text) in rendered[1..].iter().enumerate() {
            assert_eq!(text, &format!("event: message\ndata: {{\"n\":{}}}\n\n", i));
        }
    }

    #[tokio::test]
    async fn test_idle_stream_emits_keep_alive() {
        let registry = Arc::new(SessionRegistry::new());
        let (guard, receiver) = registry.open();
        let endpoint = endpoint_url(&base(), guard.id());
        let mut events = Box::pin(session_events(
            endpoint,
            guard,
            receiver,
            Duration::from_millis(50),
        ));

        let _bootstrap = events.next().await;
        let keep_alive = events.next().await.unwrap().unwrap();
        assert_eq!(render(keep_alive).await, ": keep-alive\n\n");
    }

    #[test]
    fn test_idle_wait_is_inside_the_interval() {
        assert_eq!(idle_wait(Duration::from_secs(5)), Duration::from_millis(4500));
        assert_eq!(idle_wait(Duration::from_millis(100)), Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_first_keep_alive_arrives_within_one_interval() {
        let registry = Arc::new(SessionRegistry::new());
        let (guard, receiver) = registry.open();
        let endpoint = endpoint_url(&base(), guard.id());
        let keep_alive = Duration::from_secs(1);
        let mut events = Box::pin(session_events(endpoint, guard, receiver, keep_alive));

        let _bootstrap = events.next().await;
        let started = tokio::time::Instant::now();
        let event = events.next().await.unwrap().unwrap();
        assert!(started.elapsed() < keep_alive);
        assert_eq!(render(event).await, ": keep-alive\n\n");
    }

    #[tokio::test]
    async fn test_dropping_stream_removes_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (guard, receiver) = registry.open();
        let id = guard.id().clone();
        let endpoint = endpoint_url(&base(), &id);
        let mut events = Box::pin(session_events(
            endpoint,
            guard,
            receiver,
            Duration::from_secs(5),
        ));
        let _bootstrap = events.next().await;
        assert_eq!(registry.state(id.as_str()), SessionState::Open);

        drop(events);
        assert_eq!(registry.state(id.as_str()), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_unpolled_stream_still_cleans_up() {
        let registry = Arc::new(SessionRegistry::new());
        let (guard, receiver) = registry.open();
        let id = guard.id().clone();
        let events = session_events(
            endpoint_url(&base(), &id),
            guard,
            receiver,
            Duration::from_secs(5),
        );
        drop(events);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_stream_ends_when_session_deleted_externally() {
        let registry = Arc::new(SessionRegistry::new());
        let (guard, receiver) = registry.open();
        let id = guard.id().clone();
        let mut events = Box::pin(session_events(
            endpoint_url(&base(), &id),
            guard,
            receiver,
            Duration::from_secs(5),
        ));
        let _bootstrap = events.next().await;

        registry.delete(id.as_str());
        assert!(events.next().await.is_none());
    }
}
