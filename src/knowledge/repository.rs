use anyhow::Result;
use async_trait::async_trait;

use super::KnowledgeDoc;

#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    async fn list(&self) -> Vec<KnowledgeDoc>;
    async fn get(&self, id: &str) -> Option<KnowledgeDoc>;
    async fn save(&self, doc: KnowledgeDoc) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<bool>;
    async fn load_all(&self) -> Result<()>;
}
