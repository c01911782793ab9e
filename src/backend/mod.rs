pub mod completions;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures crossing the model-backend boundary.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The referenced thread or run does not exist on the backend side.
    #[error("not found")]
    NotFound,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One content segment of a backend message. Anything that isn't plain text
/// is carried as `Unsupported` and rendered as a placeholder downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSegment {
    Text(String),
    Unsupported,
}

/// A message as the backend stores it, before transcript shaping.
#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub role: ChatRole,
    pub segments: Vec<ContentSegment>,
}

/// Run status as observed by the coordinator. Known backend states get a
/// variant; anything else lands in `Other` and is treated as still-working.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
    RequiresAction,
    Incomplete,
    Other(String),
}

impl RunStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "cancelling" => RunStatus::Cancelling,
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            "cancelled" => RunStatus::Cancelled,
            "expired" => RunStatus::Expired,
            "requires_action" => RunStatus::RequiresAction,
            "incomplete" => RunStatus::Incomplete,
            other => RunStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Expired => "expired",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Other(s) => s,
        }
    }

    /// Whether the run can make no further progress. `requires_action`
    /// counts: this coordinator never submits tool outputs, so waiting on it
    /// cannot help. Unknown statuses are assumed to still be working; the
    /// poll deadline bounds them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::Cancelled
                | RunStatus::Expired
                | RunStatus::RequiresAction
                | RunStatus::Incomplete
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
}

/// What `create_run` needs to know about the agent: the backend identity it
/// targets plus optional per-run overrides.
#[derive(Debug, Clone)]
pub struct RunTarget {
    pub assistant_id: String,
    pub model: Option<String>,
    pub instructions: Option<String>,
}

/// The minimal thread/message/run surface the coordinator drives. One
/// implementation per provider; the coordinator never sees past this trait.
///
/// `list_messages` returns backend-native ordering: newest first.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn create_thread(&self) -> Result<String, BackendError>;
    async fn append_message(
        &self,
        thread_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<(), BackendError>;
    async fn create_run(&self, thread_id: &str, target: &RunTarget) -> Result<Run, BackendError>;
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, BackendError>;
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, BackendError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for raw in ["queued", "in_progress", "completed", "failed", "cancelled", "expired"] {
            assert_eq!(RunStatus::parse(raw).as_str(), raw);
        }
    }

    #[test]
    fn test_unknown_status_is_not_terminal() {
        let status = RunStatus::parse("warming_up");
        assert_eq!(status, RunStatus::Other("warming_up".to_string()));
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(RunStatus::Expired.is_terminal());
        assert!(RunStatus::RequiresAction.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(!RunStatus::Cancelling.is_terminal());
    }
}
