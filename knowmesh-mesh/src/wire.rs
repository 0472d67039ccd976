//! Replication wire shape and the validating parse of remote nodes.
//!
//! Published: `{customId, pattern, response, type, created_at}`. Received nodes
//! come from arbitrary peers, so every field is checked before a
//! [`KnowledgeRecord`] is built; a node either parses completely or is rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use knowmesh_core::{IdGenerator, KnowledgeKind, KnowledgeRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    #[serde(rename = "customId")]
    pub custom_id: i64,
    pub pattern: String,
    pub response: String,
    #[serde(rename = "type")]
    pub kind: KnowledgeKind,
    pub created_at: DateTime<Utc>,
}

impl From<&KnowledgeRecord> for WireRecord {
    fn from(record: &KnowledgeRecord) -> Self {
        Self {
            custom_id: record.id,
            pattern: record.pattern.clone(),
            response: record.response.clone(),
            kind: record.kind,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRejection {
    NotAnObject,
    MissingPattern,
    MissingResponse,
}

impl std::fmt::Display for RemoteRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "payload is not an object"),
            Self::MissingPattern => write!(f, "missing or empty pattern"),
            Self::MissingResponse => write!(f, "missing or empty response"),
        }
    }
}

/// Validate a remote node.
///
/// Pattern and response must be non-empty strings after trimming. A missing or
/// non-numeric `customId` is replaced by a fresh id from `ids`, an unknown
/// `type` falls back to general and a missing `created_at` to now.
pub fn parse_remote(
    payload: &Value,
    ids: &dyn IdGenerator,
) -> Result<KnowledgeRecord, RemoteRejection> {
    let node = payload.as_object().ok_or(RemoteRejection::NotAnObject)?;

    let text = |field: &str| {
        node.get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let pattern = text("pattern").ok_or(RemoteRejection::MissingPattern)?;
    let response = text("response").ok_or(RemoteRejection::MissingResponse)?;

    let id = node
        .get("customId")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or_else(|| ids.next_id());

    let kind = node
        .get("type")
        .and_then(Value::as_str)
        .and_then(KnowledgeKind::from_str_loose)
        .unwrap_or_default();

    let created_at = node
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Ok(KnowledgeRecord {
        id,
        pattern,
        response,
        kind,
        created_at,
    })
}
