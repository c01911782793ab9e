use axum::Router;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

use super::AppState;
use super::auth::CallerIdentity;

/// Broadcast to connected dashboards whenever a resource changes, so list
/// views refresh without polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChangeEvent {
    pub resource_type: ResourceType,
    pub change_type: ChangeType,
    pub resource_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Agent,
    Knowledge,
    Conversation,
}

impl ResourceType {
    pub fn as_sse_event(self) -> &'static str {
        match self {
            ResourceType::Agent => "agent_change",
            ResourceType::Knowledge => "knowledge_change",
            ResourceType::Conversation => "conversation_change",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

pub(crate) async fn stream_changes(
    State(state): State<AppState>,
    _caller: CallerIdentity,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.changes_tx.subscribe();
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse_event_name = event.resource_type.as_sse_event();
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event(sse_event_name).data(data));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "changes SSE subscriber lagged");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)))
}

/// Fire-and-forget change notification; nobody listening is fine.
pub fn notify(
    state: &AppState,
    resource_type: ResourceType,
    change_type: ChangeType,
    resource_id: impl Into<String>,
) {
    let _ = state.changes_tx.send(ResourceChangeEvent {
        resource_type,
        change_type,
        resource_id: resource_id.into(),
        timestamp: chrono::Utc::now(),
    });
}

pub fn router() -> Router<AppState> {
    Router::new().route("/changes", get(stream_changes))
}
