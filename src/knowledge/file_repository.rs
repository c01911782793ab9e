use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::KnowledgeDoc;
use super::repository::KnowledgeRepository;

/// File-based CRUD store for knowledge documents, same shape as
/// `FileAgentRepository`: `RwLock<HashMap>` over JSON files at
/// `<data_dir>/knowledge/`.
pub struct FileKnowledgeRepository {
    docs: RwLock<HashMap<String, KnowledgeDoc>>,
    dir: PathBuf,
}

impl FileKnowledgeRepository {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            dir: base_dir.as_ref().join("knowledge"),
        }
    }
}

#[async_trait]
impl KnowledgeRepository for FileKnowledgeRepository {
    async fn list(&self) -> Vec<KnowledgeDoc> {
        self.docs.read().await.values().cloned().collect()
    }

    async fn get(&self, id: &str) -> Option<KnowledgeDoc> {
        self.docs.read().await.get(id).cloned()
    }

    async fn save(&self, doc: KnowledgeDoc) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.json", doc.id));
        let content = serde_json::to_string_pretty(&doc)?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &path)?;

        self.docs.write().await.insert(doc.id.clone(), doc);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let existed = self.docs.write().await.remove(id).is_some();
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
                Ok(content) => match serde_json::from_str::<KnowledgeDoc>(&content) {
                    Ok(doc) => {
                        map.insert(doc.id.clone(), doc);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to parse knowledge file");
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read knowledge file");
                }
            }
        }

        tracing::info!(count = map.len(), "loaded knowledge documents");
        *self.docs.write().await = map;
        Ok(())
    }
}
