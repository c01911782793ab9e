use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::auth::CallerIdentity;
use crate::api::changes::{ChangeType, ResourceType, notify};
use crate::conversations::{ConversationRecord, make_title};
use crate::error::ApiError;
use crate::runs::Message;
use crate::runs::coordinator::{TurnOutcome, TurnRequest};

#[derive(Deserialize)]
pub(crate) struct TurnBody {
    #[serde(default)]
    messages: Vec<Message>,
    agent: AgentPayload,
    #[serde(default, rename = "threadId")]
    thread_id: Option<String>,
}

/// The agent as the client submits it. Only the backend identity and the
/// optional overrides matter here; the id ties the history record back to
/// the stored agent.
#[derive(Deserialize)]
pub(crate) struct AgentPayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    openai_assistant_id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    instructions: Option<String>,
}

/// POST /api/conversation — drive one turn to completion and return the
/// updated transcript plus the thread id to resubmit next turn.
#[tracing::instrument(skip_all, fields(caller = %caller.subject))]
pub(crate) async fn converse(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<TurnBody>,
) -> Result<Json<Value>, ApiError> {
    let thread_id = body.thread_id.filter(|t| !t.is_empty());

    // Serialize overlapping turns on the same thread. First turns have no
    // thread yet and nothing to contend on.
    let _guard = match &thread_id {
        Some(id) => Some(state.thread_locks.acquire(id).await),
        None => None,
    };

    let outcome = state
        .coordinator
        .run_turn(TurnRequest {
            messages: body.messages,
            assistant_id: body.agent.openai_assistant_id,
            model: body.agent.model,
            instructions: body.agent.instructions,
            thread_id,
        })
        .await?;

    // History upkeep is best-effort; a failed save must not fail the turn
    // the caller already paid for.
    if let Err(e) = upsert_record(&state, body.agent.id.as_deref(), &outcome).await {
        tracing::warn!(error = %e, thread_id = %outcome.thread_id, "failed to update conversation record");
    }

    Ok(Json(json!({
        "conversation": outcome.conversation,
        "threadId": outcome.thread_id,
    })))
}

async fn upsert_record(
    state: &AppState,
    agent_id: Option<&str>,
    outcome: &TurnOutcome,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let (record, change) = match state.conversation_repo.find_by_thread(&outcome.thread_id).await {
        Some(mut existing) => {
            existing.message_count = outcome.conversation.len() as u64;
            existing.updated_at = now;
            (existing, ChangeType::Updated)
        }
        None => {
            let title = outcome
                .conversation
                .first()
                .map(|m| make_title(&m.content))
                .unwrap_or_default();
            let record = ConversationRecord {
                id: Uuid::new_v4().to_string(),
                agent_id: agent_id.unwrap_or_default().to_string(),
                thread_id: outcome.thread_id.clone(),
                title,
                message_count: outcome.conversation.len() as u64,
                created_at: now,
                updated_at: now,
            };
            (record, ChangeType::Created)
        }
    };

    let id = record.id.clone();
    state.conversation_repo.save(record).await?;
    notify(state, ResourceType::Conversation, change, id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use crate::api::auth::issue_token;
    use crate::api::{AppState, create_app};
    use crate::backend::testing::ScriptedBackend;
    use crate::backend::{ChatRole, ContentSegment, RunStatus, ThreadMessage};
    use crate::conversations::file_repository::FileConversationRepository;
    use crate::conversations::repository::ConversationRepository;
    use crate::runs::coordinator::RunCoordinator;
    use crate::runs::locks::ThreadLocks;

    const SECRET: &str = "test-secret";

    struct TestApp {
        app: Router,
        backend: Arc<ScriptedBackend>,
        conversation_repo: Arc<FileConversationRepository>,
        _tmp: tempfile::TempDir,
    }

    fn test_app(backend: ScriptedBackend) -> TestApp {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(backend);
        let conversation_repo = Arc::new(FileConversationRepository::new(tmp.path()));
        let (changes_tx, _) = tokio::sync::broadcast::channel(16);

        let state = AppState {
            agent_repo: Arc::new(crate::agents::file_repository::FileAgentRepository::new(
                tmp.path(),
            )),
            knowledge_repo: Arc::new(
                crate::knowledge::file_repository::FileKnowledgeRepository::new(tmp.path()),
            ),
            conversation_repo: conversation_repo.clone(),
            coordinator: Arc::new(RunCoordinator {
                backend: backend.clone(),
                poll_interval: Duration::from_millis(1),
                poll_deadline: Duration::from_secs(5),
                max_polls: 10,
            }),
            thread_locks: Arc::new(ThreadLocks::new()),
            changes_tx,
            jwt_secret: SECRET.to_string(),
        };

        TestApp { app: create_app(state), backend, conversation_repo, _tmp: tmp }
    }

    fn turn_request(authorized: bool, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/conversation")
            .header(header::CONTENT_TYPE, "application/json");
        if authorized {
            builder = builder.header(
                header::AUTHORIZATION,
                format!("Bearer {}", issue_token(SECRET, "user_1")),
            );
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn hello_backend() -> ScriptedBackend {
        ScriptedBackend::new(vec![RunStatus::Completed]).with_transcript(vec![
            ThreadMessage {
                role: ChatRole::Assistant,
                segments: vec![ContentSegment::Text("hello".to_string())],
            },
            ThreadMessage {
                role: ChatRole::User,
                segments: vec![ContentSegment::Text("hi".to_string())],
            },
        ])
    }

    fn hello_body() -> serde_json::Value {
        serde_json::json!({
            "messages": [ { "role": "user", "content": "hi" } ],
            "agent": { "id": "agent-1", "openai_assistant_id": "asst_1" }
        })
    }

    #[tokio::test]
    async fn test_missing_identity_means_no_backend_calls() {
        let test = test_app(hello_backend());
        let response = test.app.oneshot(turn_request(false, hello_body())).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(test.backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_bad_token_rejected() {
        let test = test_app(hello_backend());
        let request = Request::builder()
            .method("POST")
            .uri("/api/conversation")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::from(hello_body().to_string()))
            .unwrap();

        let response = test.app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(test.backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_round_trip_creates_thread_and_record() {
        let test = test_app(hello_backend());
        let response = test.app.oneshot(turn_request(true, hello_body())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(
            json["conversation"],
            serde_json::json!([
                { "role": "user", "content": "hi" },
                { "role": "assistant", "content": "hello" }
            ])
        );
        let thread_id = json["threadId"].as_str().unwrap();
        assert!(!thread_id.is_empty());

        // History record upserted against the new thread
        let record = test.conversation_repo.find_by_thread(thread_id).await.unwrap();
        assert_eq!(record.title, "hi");
        assert_eq!(record.message_count, 2);
        assert_eq!(record.agent_id, "agent-1");
    }

    #[tokio::test]
    async fn test_supplied_thread_id_round_trips() {
        let test = test_app(hello_backend());
        let mut body = hello_body();
        body["threadId"] = serde_json::json!("thread_existing");

        let response = test.app.oneshot(turn_request(true, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["threadId"], "thread_existing");
        assert_eq!(test.backend.created_threads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_messages_is_bad_request() {
        let test = test_app(hello_backend());
        let body = serde_json::json!({
            "messages": [],
            "agent": { "openai_assistant_id": "asst_1" }
        });

        let response = test.app.oneshot(turn_request(true, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(test.backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_assistant_id_is_bad_request() {
        let test = test_app(hello_backend());
        let body = serde_json::json!({
            "messages": [ { "role": "user", "content": "hi" } ],
            "agent": { "id": "agent-1" }
        });

        let response = test.app.oneshot(turn_request(true, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_failed_run_is_internal_error_with_status() {
        let test = test_app(ScriptedBackend::new(vec![RunStatus::Failed]));
        let response = test.app.oneshot(turn_request(true, hello_body())).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("failed"));
    }

    #[tokio::test]
    async fn test_poll_exhaustion_is_gateway_timeout() {
        let test = test_app(ScriptedBackend::new(vec![RunStatus::InProgress]));
        let response = test.app.oneshot(turn_request(true, hello_body())).await.unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
