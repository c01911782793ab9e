use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{
    BackendError, ChatRole, ContentSegment, ModelBackend, Run, RunStatus, RunTarget, ThreadMessage,
};

/// OpenAI assistants v2 adapter. Threads, messages and runs are all
/// backend-held; this client only shuttles JSON.
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{path}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status: status.as_u16(), body });
        }
        Ok(response)
    }
}

#[derive(Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Deserialize)]
struct RunObject {
    id: String,
    status: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
}

#[derive(Deserialize)]
struct MessageObject {
    role: String,
    #[serde(default)]
    content: Vec<ContentObject>,
}

#[derive(Deserialize)]
struct ContentObject {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<TextObject>,
}

#[derive(Deserialize)]
struct TextObject {
    value: String,
}

impl MessageObject {
    fn into_thread_message(self) -> ThreadMessage {
        let role = match self.role.as_str() {
            "user" => ChatRole::User,
            _ => ChatRole::Assistant,
        };
        let segments = self
            .content
            .into_iter()
            .map(|c| match (c.kind.as_str(), c.text) {
                ("text", Some(t)) => ContentSegment::Text(t.value),
                _ => ContentSegment::Unsupported,
            })
            .collect();
        ThreadMessage { role, segments }
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    async fn create_thread(&self) -> Result<String, BackendError> {
        let response = self
            .request(reqwest::Method::POST, "/threads")
            .json(&json!({}))
            .send()
            .await?;
        let thread: ThreadObject = Self::check(response).await?.json().await?;
        tracing::debug!(thread_id = %thread.id, "created thread");
        Ok(thread.id)
    }

    async fn append_message(
        &self,
        thread_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<(), BackendError> {
        let role = match role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        let response = self
            .request(reqwest::Method::POST, &format!("/threads/{thread_id}/messages"))
            .json(&json!({ "role": role, "content": content }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, target: &RunTarget) -> Result<Run, BackendError> {
        let mut body = json!({ "assistant_id": target.assistant_id });
        if let Some(model) = &target.model {
            body["model"] = json!(model);
        }
        if let Some(instructions) = &target.instructions {
            body["instructions"] = json!(instructions);
        }
        let response = self
            .request(reqwest::Method::POST, &format!("/threads/{thread_id}/runs"))
            .json(&body)
            .send()
            .await?;
        let run: RunObject = Self::check(response).await?.json().await?;
        tracing::debug!(thread_id, run_id = %run.id, status = %run.status, "created run");
        Ok(Run { id: run.id, status: RunStatus::parse(&run.status) })
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, BackendError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/threads/{thread_id}/runs/{run_id}"))
            .send()
            .await?;
        let run: RunObject = Self::check(response).await?.json().await?;
        Ok(Run { id: run.id, status: RunStatus::parse(&run.status) })
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, BackendError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/threads/{thread_id}/messages"))
            .send()
            .await?;
        let list: MessageList = Self::check(response).await?.json().await?;
        // Backend-native order (newest first) is preserved; callers reverse.
        Ok(list.data.into_iter().map(MessageObject::into_thread_message).collect())
    }
}
