use serde::{Deserialize, Serialize};

use crate::models::KnowledgeKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum KnowMeshRequest {
    Ping,
    Status,
    /// One conversational turn through the resolution engine.
    Chat {
        text: String,
    },
    List {
        #[serde(default)]
        filter: Option<String>,
    },
    Resolve {
        query: String,
    },
    Insert {
        pattern: String,
        response: String,
        #[serde(default)]
        kind: KnowledgeKind,
    },
    Update {
        id: i64,
        pattern: String,
        response: String,
    },
    /// Destructive; refused unless `confirm` is set.
    Reset {
        #[serde(default)]
        confirm: bool,
    },
    Evaluate {
        expression: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KnowMeshResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl KnowMeshResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
