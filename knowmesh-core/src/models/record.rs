use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Informational tag on a record. Never consulted by matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeKind {
    #[default]
    General,
    Math,
    Chat,
}

impl KnowledgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Math => "math",
            Self::Chat => "chat",
        }
    }

    /// Parse from a string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "general" => Some(Self::General),
            "math" => Some(Self::Math),
            "chat" => Some(Self::Chat),
            _ => None,
        }
    }
}

impl std::fmt::Display for KnowledgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single learned fact. Persisted as `{id, pattern, response, type, created_at}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: i64,
    pub pattern: String,
    pub response: String,
    #[serde(rename = "type")]
    pub kind: KnowledgeKind,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeRecord {
    /// Same fact under the content key: case-insensitive pattern and exact response.
    pub fn same_content(&self, pattern: &str, response: &str) -> bool {
        self.pattern.to_lowercase() == pattern.to_lowercase() && self.response == response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_persisted_field_names() {
        let record = KnowledgeRecord {
            id: 42,
            pattern: "su formülü".to_string(),
            response: "H2O".to_string(),
            kind: KnowledgeKind::Math,
            created_at: DateTime::from_timestamp(1_704_067_200, 0).unwrap(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], 42);
        assert_eq!(value["type"], "math");
        assert_eq!(value["created_at"], "2024-01-01T00:00:00Z");
        assert!(value.get("kind").is_none());
    }

    #[test]
    fn test_record_reads_browser_timestamps() {
        let raw = r#"{"id":1700000000000,"pattern":"selam","response":"Selam!","type":"chat","created_at":"2024-05-01T10:20:30.123Z"}"#;
        let record: KnowledgeRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.kind, KnowledgeKind::Chat);
        assert_eq!(record.created_at.timestamp_subsec_millis(), 123);
    }

    #[test]
    fn test_kind_from_str_loose() {
        assert_eq!(KnowledgeKind::from_str_loose(" MATH "), Some(KnowledgeKind::Math));
        assert_eq!(KnowledgeKind::from_str_loose("poem"), None);
    }

    #[test]
    fn test_same_content_is_case_insensitive_on_pattern_only() {
        let record = KnowledgeRecord {
            id: 1,
            pattern: "Zebra Nedir".to_string(),
            response: "bir hayvan".to_string(),
            kind: KnowledgeKind::General,
            created_at: Utc::now(),
        };
        assert!(record.same_content("zebra nedir", "bir hayvan"));
        assert!(!record.same_content("zebra nedir", "Bir hayvan"));
    }
}
