use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Agent;
use super::repository::AgentRepository;

/// File-based CRUD store for agents: in-memory `RwLock<HashMap>` backed by
/// JSON files at `<data_dir>/agents/`.
pub struct FileAgentRepository {
    agents: RwLock<HashMap<String, Agent>>,
    dir: PathBuf,
}

impl FileAgentRepository {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            dir: base_dir.as_ref().join("agents"),
        }
    }
}

#[async_trait]
impl AgentRepository for FileAgentRepository {
    async fn list(&self) -> Vec<Agent> {
        self.agents.read().await.values().cloned().collect()
    }

    async fn get(&self, id: &str) -> Option<Agent> {
        self.agents.read().await.get(id).cloned()
    }

    async fn save(&self, agent: Agent) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.json", agent.id));
        let content = serde_json::to_string_pretty(&agent)?;

        // Atomic write via temp file + rename
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &path)?;

        self.agents.write().await.insert(agent.id.clone(), agent);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let existed = self.agents.write().await.remove(id).is_some();
        let path = self.dir.join(format!("{id}.json"));
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(existed)
    }

    /// Load all agent JSON files from disk into the in-memory map.
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
                Ok(content) => match serde_json::from_str::<Agent>(&content) {
                    Ok(agent) => {
                        map.insert(agent.id.clone(), agent);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to parse agent file");
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read agent file");
                }
            }
        }

        tracing::info!(count = map.len(), "loaded agents");
        *self.agents.write().await = map;
        Ok(())
    }
}
