//! `POST /mcp`: message ingress
//!
//! A message addressed to a live session is dispatched and its result queued
//! on that session's stream; the POST itself is answered with `202`.
//! Without a session, or with one that is no longer open, the result is
//! returned in the POST response.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

use super::registry::{SessionId, SessionRegistry};
use super::AppState;
use crate::error::RelayError;
use crate::mcp::types::{JsonRpcError, JsonRpcResponse};
use crate::mcp::Dispatcher;

#[derive(Debug, Default, Deserialize)]
pub struct IngressQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// What happened to one ingress message.
#[derive(Debug, Clone, PartialEq)]
pub enum IngressOutcome {
    /// Result to send back on the POST response
    Reply(Value),
    /// Nothing to send anywhere (notification)
    Acknowledged,
    /// Result appended to the named session's queue
    Enqueued(SessionId),
}

/// Dispatch `body` and route the result.
///
/// A body that is not valid UTF-8 never reaches the dispatcher; it is
/// answered with a JSON-RPC parse error, routed like any other result.
///
/// # Errors
///
/// Returns [`RelayError::EmptyRequest`] for an empty or blank body; the
/// dispatcher is not invoked in that case.
pub async fn relay_message(
    registry: &SessionRegistry,
    dispatcher: &dyn Dispatcher,
    session_id: Option<&str>,
    body: &[u8],
) -> Result<IngressOutcome, RelayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(RelayError::EmptyRequest);
    }

    let queue = session_id
        .and_then(|id| registry.lookup(id))
        .filter(|queue| !queue.is_closed());
    if let (Some(id), None) = (session_id, &queue) {
        tracing::debug!(session_id = %id, "no open session, answering synchronously");
    }

    let response = match std::str::from_utf8(body) {
        Ok(message) => dispatcher.dispatch(message).await,
        Err(e) => {
            tracing::debug!(error = %e, "request body is not valid UTF-8");
            Some(
                JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::parse_error(format!("request body is not valid UTF-8: {}", e)),
                )
                .into_value(),
            )
        }
    };
    let Some(response) = response else {
        return Ok(IngressOutcome::Acknowledged);
    };

    let Some(queue) = queue else {
        return Ok(IngressOutcome::Reply(response));
    };

    match queue.push(response.to_string()) {
        Ok(()) => {
            tracing::debug!(session_id = %queue.id(), "response queued");
            Ok(IngressOutcome::Enqueued(queue.id().clone()))
        }
        Err(e) => {
            tracing::warn!(error = %e, "session closed during dispatch, answering synchronously");
            Ok(IngressOutcome::Reply(response))
        }
    }
}

pub async fn handle_post(
    State(state): State<AppState>,
    Query(query): Query<IngressQuery>,
    body: Bytes,
) -> Result<Response, RelayError> {
    let outcome = relay_message(
        &state.registry,
        state.dispatcher.as_ref(),
        query.session_id.as_deref(),
        &body,
    )
    .await?;

    Ok(match outcome {
        IngressOutcome::Reply(value) => (StatusCode::OK, Json(value)).into_response(),
        IngressOutcome::Acknowledged | IngressOutcome::Enqueued(_) => {
            StatusCode::ACCEPTED.into_response()
        }
    })
}
