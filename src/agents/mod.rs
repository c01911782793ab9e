pub mod file_repository;
pub mod repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An agent definition — the persona a conversation runs against. The
/// `assistant_id` ties it to the model backend; everything else is dashboard
/// metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// System instructions passed to the backend as a per-run override.
    #[serde(default)]
    pub instructions: String,
    /// Model identifier, e.g. "gpt-4o". Empty means the backend default.
    #[serde(default)]
    pub model: String,
    /// Backend assistant identity this agent targets. Conversations require
    /// it; a freshly created agent may not have one yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}
