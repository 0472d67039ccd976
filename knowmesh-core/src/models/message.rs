use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
}

/// One entry of a conversation transcript. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub is_system: bool,
}

impl Message {
    fn new(sender: Sender, text: impl Into<String>, is_system: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            text: text.into(),
            timestamp: Utc::now(),
            is_system,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text, false)
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Sender::Bot, text, false)
    }

    /// Bot-side status line (search notes, sync notices).
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::Bot, text, true)
    }
}
