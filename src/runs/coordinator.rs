use std::sync::Arc;
use std::time::Duration;

use crate::backend::{BackendError, ChatRole, ContentSegment, ModelBackend, RunStatus, RunTarget};
use crate::config::Config;
use crate::error::ApiError;

use super::{Message, UNSUPPORTED_CONTENT};

/// One conversational turn, as the endpoint receives it.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Prior turns plus the new user utterance as the last element.
    pub messages: Vec<Message>,
    /// Backend assistant identity the run targets. Validated non-empty here.
    pub assistant_id: Option<String>,
    pub model: Option<String>,
    pub instructions: Option<String>,
    /// Existing thread to continue; absent on the first turn.
    pub thread_id: Option<String>,
}

/// Successful turn: full transcript (oldest first) plus the thread id the
/// caller must resubmit on the next turn.
#[derive(Debug)]
pub struct TurnOutcome {
    pub conversation: Vec<Message>,
    pub thread_id: String,
}

/// Drives one turn to completion: thread acquisition, message append, run
/// creation, bounded status polling, transcript assembly. Holds no state
/// between turns; everything thread-shaped lives on the backend.
pub struct RunCoordinator {
    pub backend: Arc<dyn ModelBackend>,
    pub poll_interval: Duration,
    pub poll_deadline: Duration,
    pub max_polls: u32,
}

impl RunCoordinator {
    pub fn new(backend: Arc<dyn ModelBackend>, config: &Config) -> Self {
        Self {
            backend,
            poll_interval: config.poll_interval,
            poll_deadline: config.poll_deadline,
            max_polls: config.max_polls,
        }
    }

    #[tracing::instrument(skip_all, fields(thread_id, run_id))]
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnOutcome, ApiError> {
        let Some(last) = request.messages.last() else {
            return Err(ApiError::Validation("messages must not be empty".to_string()));
        };
        let assistant_id = match request.assistant_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return Err(ApiError::Validation(
                    "agent has no backend assistant id".to_string(),
                ));
            }
        };

        // Reuse the supplied thread verbatim; a stale id surfaces at the
        // append below, not via an up-front existence check.
        let supplied = request.thread_id.is_some();
        let thread_id = match request.thread_id {
            Some(id) => id,
            None => self.backend.create_thread().await?,
        };
        tracing::Span::current().record("thread_id", thread_id.as_str());

        self.backend
            .append_message(&thread_id, ChatRole::User, &last.content)
            .await
            .map_err(|e| stale_thread(e, supplied, &thread_id))?;

        let target = RunTarget {
            assistant_id,
            model: request.model.filter(|m| !m.is_empty()),
            instructions: request.instructions.filter(|i| !i.is_empty()),
        };
        let run = self
            .backend
            .create_run(&thread_id, &target)
            .await
            .map_err(|e| stale_thread(e, supplied, &thread_id))?;
        tracing::Span::current().record("run_id", run.id.as_str());

        let status = self.poll_until_terminal(&thread_id, &run.id).await?;
        if status != RunStatus::Completed {
            tracing::warn!(thread_id, status = %status, "run did not complete");
            return Err(ApiError::RunFailed { status: status.as_str().to_string() });
        }

        let raw = self.backend.list_messages(&thread_id).await?;
        let conversation = assemble_transcript(raw);
        tracing::info!(thread_id, messages = conversation.len(), "turn completed");
        Ok(TurnOutcome { conversation, thread_id })
    }

    /// Fetch run status at a fixed interval until it stops progressing.
    /// Bounded two ways: a hard cap on fetches and a wall-clock deadline
    /// checked before each re-fetch.
    async fn poll_until_terminal(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<RunStatus, ApiError> {
        let started = tokio::time::Instant::now();
        let mut polls: u32 = 0;
        loop {
            let run = self.backend.get_run(thread_id, run_id).await?;
            polls += 1;
            if run.status.is_terminal() {
                tracing::debug!(thread_id, run_id, polls, status = %run.status, "run reached terminal status");
                return Ok(run.status);
            }
            if polls >= self.max_polls {
                tracing::warn!(thread_id, run_id, polls, "run poll budget exhausted");
                return Err(ApiError::Timeout(self.poll_deadline));
            }
            tokio::time::sleep(self.poll_interval).await;
            if started.elapsed() >= self.poll_deadline {
                tracing::warn!(thread_id, run_id, polls, "run poll deadline exceeded");
                return Err(ApiError::Timeout(self.poll_deadline));
            }
        }
    }
}

fn stale_thread(err: BackendError, supplied: bool, thread_id: &str) -> ApiError {
    match err {
        BackendError::NotFound if supplied => {
            ApiError::NotFound(format!("unknown thread {thread_id}"))
        }
        other => ApiError::Backend(other),
    }
}

/// Reverse the backend's newest-first listing to chronological order and
/// flatten each message's segments into one string: text segments joined by
/// a single space, anything else as the placeholder.
fn assemble_transcript(raw: Vec<crate::backend::ThreadMessage>) -> Vec<Message> {
    raw.into_iter()
        .rev()
        .map(|msg| {
            let content = msg
                .segments
                .iter()
                .map(|segment| match segment {
                    ContentSegment::Text(text) => text.as_str(),
                    ContentSegment::Unsupported => UNSUPPORTED_CONTENT,
                })
                .collect::<Vec<_>>()
                .join(" ");
            Message { role: msg.role, content }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ThreadMessage;
    use crate::backend::testing::ScriptedBackend;
    use std::sync::atomic::Ordering;

    fn coordinator(backend: Arc<ScriptedBackend>) -> RunCoordinator {
        RunCoordinator {
            backend,
            poll_interval: Duration::from_secs(2),
            poll_deadline: Duration::from_secs(120),
            max_polls: 60,
        }
    }

    fn user_turn(content: &str) -> TurnRequest {
        TurnRequest {
            messages: vec![Message { role: ChatRole::User, content: content.to_string() }],
            assistant_id: Some("asst_1".to_string()),
            model: None,
            instructions: None,
            thread_id: None,
        }
    }

    fn text_message(role: ChatRole, text: &str) -> ThreadMessage {
        ThreadMessage { role, segments: vec![ContentSegment::Text(text.to_string())] }
    }

    #[tokio::test]
    async fn test_round_trip_first_poll_completed() {
        let backend = Arc::new(
            ScriptedBackend::new(vec![RunStatus::Completed]).with_transcript(vec![
                text_message(ChatRole::Assistant, "hello"),
                text_message(ChatRole::User, "hi"),
            ]),
        );
        let outcome = coordinator(backend.clone())
            .run_turn(user_turn("hi"))
            .await
            .unwrap();

        assert_eq!(
            outcome.conversation,
            vec![
                Message { role: ChatRole::User, content: "hi".to_string() },
                Message { role: ChatRole::Assistant, content: "hello".to_string() },
            ]
        );
        assert!(!outcome.thread_id.is_empty());
        assert_eq!(backend.created_threads.load(Ordering::SeqCst), 1);
        assert_eq!(backend.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_supplied_thread_id_returned_verbatim() {
        let backend = Arc::new(ScriptedBackend::new(vec![RunStatus::Completed]));
        let mut request = user_turn("again");
        request.thread_id = Some("thread_existing".to_string());

        let outcome = coordinator(backend.clone()).run_turn(request).await.unwrap();
        assert_eq!(outcome.thread_id, "thread_existing");
        assert_eq!(backend.created_threads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_once_per_transition_with_fixed_delay() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            RunStatus::Queued,
            RunStatus::InProgress,
            RunStatus::Completed,
        ]));
        let started = tokio::time::Instant::now();
        coordinator(backend.clone()).run_turn(user_turn("hi")).await.unwrap();

        assert_eq!(backend.polls.load(Ordering::SeqCst), 3);
        // Two sleeps of the fixed interval between the three fetches
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_failed_stops_polling_and_carries_status() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            RunStatus::Queued,
            RunStatus::Failed,
            RunStatus::Completed,
        ]));
        let mut coordinator = coordinator(backend.clone());
        coordinator.poll_interval = Duration::from_millis(1);

        let err = coordinator.run_turn(user_turn("hi")).await.unwrap_err();
        match err {
            ApiError::RunFailed { status } => assert_eq!(status, "failed"),
            other => panic!("unexpected error: {other:?}"),
        }
        // Exited on the failed observation, never saw the scripted completed
        assert_eq!(backend.polls.load(Ordering::SeqCst), 2);
        assert_eq!(backend.listed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_is_fatal() {
        let backend = Arc::new(ScriptedBackend::new(vec![RunStatus::Cancelled]));
        let err = coordinator(backend).run_turn(user_turn("hi")).await.unwrap_err();
        match err {
            ApiError::RunFailed { status } => assert_eq!(status, "cancelled"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_messages_rejected_without_backend_calls() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let mut request = user_turn("ignored");
        request.messages.clear();

        let err = coordinator(backend.clone()).run_turn(request).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_assistant_id_rejected_without_backend_calls() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let mut request = user_turn("hi");
        request.assistant_id = Some(String::new());

        let err = coordinator(backend.clone()).run_turn(request).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_cap_times_out() {
        let backend = Arc::new(ScriptedBackend::new(vec![RunStatus::InProgress]));
        let mut coordinator = coordinator(backend.clone());
        coordinator.max_polls = 5;

        let err = coordinator.run_turn(user_turn("hi")).await.unwrap_err();
        assert!(matches!(err, ApiError::Timeout(_)));
        assert_eq!(backend.polls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_times_out() {
        let backend = Arc::new(ScriptedBackend::new(vec![RunStatus::Queued]));
        let mut coordinator = coordinator(backend.clone());
        coordinator.poll_deadline = Duration::from_secs(5);

        let err = coordinator.run_turn(user_turn("hi")).await.unwrap_err();
        assert!(matches!(err, ApiError::Timeout(_)));
        // Fetches at t=0, 2, 4; the sleep landing on t=6 crosses the deadline
        assert_eq!(backend.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_text_segments_render_placeholder() {
        let backend = Arc::new(
            ScriptedBackend::new(vec![RunStatus::Completed]).with_transcript(vec![ThreadMessage {
                role: ChatRole::Assistant,
                segments: vec![
                    ContentSegment::Text("see attached".to_string()),
                    ContentSegment::Unsupported,
                ],
            }]),
        );
        let outcome = coordinator(backend).run_turn(user_turn("hi")).await.unwrap();
        assert_eq!(
            outcome.conversation[0].content,
            format!("see attached {UNSUPPORTED_CONTENT}")
        );
    }

    #[tokio::test]
    async fn test_stale_supplied_thread_maps_to_not_found() {
        let mut backend = ScriptedBackend::new(vec![]);
        backend.fail_append_not_found = true;
        let backend = Arc::new(backend);

        let mut request = user_turn("hi");
        request.thread_id = Some("thread_expired".to_string());

        let err = coordinator(backend).run_turn(request).await.unwrap_err();
        match err {
            ApiError::NotFound(msg) => assert!(msg.contains("thread_expired")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_not_found_on_fresh_thread_stays_backend_error() {
        let mut backend = ScriptedBackend::new(vec![]);
        backend.fail_append_not_found = true;
        let backend = Arc::new(backend);

        // No thread supplied: the coordinator created it, so NotFound is a
        // backend fault, not a caller error
        let err = coordinator(backend).run_turn(user_turn("hi")).await.unwrap_err();
        assert!(matches!(err, ApiError::Backend(BackendError::NotFound)));
    }
}
