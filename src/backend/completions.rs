use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    BackendError, ChatRole, ContentSegment, ModelBackend, Run, RunStatus, RunTarget, ThreadMessage,
};

/// Chat-completions provider adapted to the thread/run interface. The API
/// has no server-side thread store, so threads live in process memory and a
/// run executes the completion inline: by the time the coordinator polls,
/// the run is already terminal.
pub struct CompletionsBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
    threads: RwLock<HashMap<String, Vec<ThreadMessage>>>,
    /// Terminal status per run id, recorded at creation.
    runs: RwLock<HashMap<String, RunStatus>>,
}

impl CompletionsBackend {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            threads: RwLock::new(HashMap::new()),
            runs: RwLock::new(HashMap::new()),
        }
    }

    async fn complete(
        &self,
        target: &RunTarget,
        history: &[ThreadMessage],
    ) -> Result<String, BackendError> {
        let mut messages = Vec::new();
        if let Some(instructions) = &target.instructions {
            messages.push(json!({ "role": "system", "content": instructions }));
        }
        for msg in history {
            let role = match msg.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            let content: Vec<&str> = msg
                .segments
                .iter()
                .filter_map(|s| match s {
                    ContentSegment::Text(t) => Some(t.as_str()),
                    ContentSegment::Unsupported => None,
                })
                .collect();
            messages.push(json!({ "role": role, "content": content.join(" ") }));
        }

        let model = target.model.as_deref().unwrap_or(&self.default_model);
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": model, "messages": messages }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status: status.as_u16(), body });
        }

        let completion: CompletionResponse = response.json().await?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok(text)
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl ModelBackend for CompletionsBackend {
    async fn create_thread(&self) -> Result<String, BackendError> {
        let id = format!("thread_{}", Uuid::new_v4().simple());
        self.threads.write().await.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn append_message(
        &self,
        thread_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<(), BackendError> {
        let mut threads = self.threads.write().await;
        let thread = threads.get_mut(thread_id).ok_or(BackendError::NotFound)?;
        thread.push(ThreadMessage {
            role,
            segments: vec![ContentSegment::Text(content.to_string())],
        });
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, target: &RunTarget) -> Result<Run, BackendError> {
        let history = {
            let threads = self.threads.read().await;
            threads.get(thread_id).ok_or(BackendError::NotFound)?.clone()
        };

        let reply = self.complete(target, &history).await?;
        self.threads
            .write()
            .await
            .get_mut(thread_id)
            .ok_or(BackendError::NotFound)?
            .push(ThreadMessage {
                role: ChatRole::Assistant,
                segments: vec![ContentSegment::Text(reply)],
            });

        let run_id = format!("run_{}", Uuid::new_v4().simple());
        self.runs.write().await.insert(run_id.clone(), RunStatus::Completed);
        Ok(Run { id: run_id, status: RunStatus::Completed })
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> Result<Run, BackendError> {
        let runs = self.runs.read().await;
        let status = runs.get(run_id).ok_or(BackendError::NotFound)?.clone();
        Ok(Run { id: run_id.to_string(), status })
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, BackendError> {
        let threads = self.threads.read().await;
        let thread = threads.get(thread_id).ok_or(BackendError::NotFound)?;
        // Stored chronologically; the trait contract is newest first.
        Ok(thread.iter().rev().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> CompletionsBackend {
        CompletionsBackend::new(reqwest::Client::new(), server.uri(), "sk-test", "gpt-4o-mini")
    }

    fn target() -> RunTarget {
        RunTarget {
            assistant_id: "asst_local".to_string(),
            model: None,
            instructions: Some("You are terse.".to_string()),
        }
    }

    #[tokio::test]
    async fn test_unknown_thread_not_found() {
        let server = MockServer::start().await;
        let backend = backend(&server);
        let err = backend
            .append_message("thread_missing", ChatRole::User, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound));
    }

    #[tokio::test]
    async fn test_run_completes_inline_and_appends_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "messages": [
                    { "role": "system", "content": "You are terse." },
                    { "role": "user", "content": "hi" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [ { "message": { "role": "assistant", "content": "hello" } } ]
            })))
            .mount(&server)
            .await;

        let backend = backend(&server);
        let thread_id = backend.create_thread().await.unwrap();
        backend.append_message(&thread_id, ChatRole::User, "hi").await.unwrap();

        let run = backend.create_run(&thread_id, &target()).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);

        // get_run observes the stored terminal status
        let polled = backend.get_run(&thread_id, &run.id).await.unwrap();
        assert_eq!(polled.status, RunStatus::Completed);

        // Newest first: assistant reply leads
        let messages = backend.list_messages(&thread_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::Assistant);
        assert_eq!(messages[0].segments, vec![ContentSegment::Text("hello".to_string())]);
    }

    #[tokio::test]
    async fn test_completion_api_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let backend = backend(&server);
        let thread_id = backend.create_thread().await.unwrap();
        backend.append_message(&thread_id, ChatRole::User, "hi").await.unwrap();

        let err = backend.create_run(&thread_id, &target()).await.unwrap_err();
        assert!(matches!(err, BackendError::Api { status: 429, .. }));
    }
}
