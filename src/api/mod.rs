pub mod agents;
pub mod auth;
pub mod changes;
pub mod conversations;
pub mod knowledge;
pub mod middleware;
mod routes;

use std::sync::Arc;

use axum::Router;
use tokio::sync::broadcast;

use crate::agents::repository::AgentRepository;
use crate::api::changes::ResourceChangeEvent;
use crate::conversations::repository::ConversationRepository;
use crate::knowledge::repository::KnowledgeRepository;
use crate::runs::coordinator::RunCoordinator;
use crate::runs::locks::ThreadLocks;

/// Everything a request handler can reach. Constructed once in `main` and
/// cloned per request; no module-level state anywhere.
#[derive(Clone)]
pub struct AppState {
    pub agent_repo: Arc<dyn AgentRepository>,
    pub knowledge_repo: Arc<dyn KnowledgeRepository>,
    pub conversation_repo: Arc<dyn ConversationRepository>,
    pub coordinator: Arc<RunCoordinator>,
    pub thread_locks: Arc<ThreadLocks>,
    pub changes_tx: broadcast::Sender<ResourceChangeEvent>,
    /// HS256 secret caller tokens must verify against.
    pub jwt_secret: String,
}

pub fn create_app(state: AppState) -> Router {
    routes::build_router(state)
}
