use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ConversationRecord;
use super::repository::ConversationRepository;

/// File-based store for conversation history records, JSON files at
/// `<data_dir>/conversations/`.
pub struct FileConversationRepository {
    records: RwLock<HashMap<String, ConversationRecord>>,
    dir: PathBuf,
}

impl FileConversationRepository {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            dir: base_dir.as_ref().join("conversations"),
        }
    }
}

#[async_trait]
impl ConversationRepository for FileConversationRepository {
    async fn list(&self) -> Vec<ConversationRecord> {
        self.records.read().await.values().cloned().collect()
    }

    async fn get(&self, id: &str) -> Option<ConversationRecord> {
        self.records.read().await.get(id).cloned()
    }

    async fn find_by_thread(&self, thread_id: &str) -> Option<ConversationRecord> {
        self.records
            .read()
            .await
            .values()
            .find(|r| r.thread_id == thread_id)
            .cloned()
    }

    async fn save(&self, record: ConversationRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.json", record.id));
        let content = serde_json::to_string_pretty(&record)?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &path)?;

        self.records.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let existed = self.records.write().await.remove(id).is_some();
        let path = self.dir.join(format!("{id}.json"));
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(existed)
    }

    async fn load_all(&self) -> Result<()> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir)?;
            return Ok(());
        }

        let mut map = HashMap::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<ConversationRecord>(&content) {
                    Ok(record) => {
                        map.insert(record.id.clone(), record);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to parse conversation file");
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read conversation file");
                }
            }
        }

        tracing::info!(count = map.len(), "loaded conversation records");
        *self.records.write().await = map;
        Ok(())
    }
}
