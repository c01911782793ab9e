use anyhow::Result;
use async_trait::async_trait;

use super::ConversationRecord;

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn list(&self) -> Vec<ConversationRecord>;
    async fn get(&self, id: &str) -> Option<ConversationRecord>;
    /// Look up the record tracking a given backend thread, if any.
    async fn find_by_thread(&self, thread_id: &str) -> Option<ConversationRecord>;
    async fn save(&self, record: ConversationRecord) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<bool>;
    async fn load_all(&self) -> Result<()>;
}
