pub mod coordinator;
pub mod locks;

use serde::{Deserialize, Serialize};

use crate::backend::ChatRole;

/// A transcript message as the API exchanges it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: ChatRole,
    pub content: String,
}

/// Rendered in place of message segments that aren't plain text (images,
/// file attachments).
pub const UNSUPPORTED_CONTENT: &str = "[unsupported content]";
