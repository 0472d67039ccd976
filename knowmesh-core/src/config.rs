use config::{Config, File};
use serde::Deserialize;

use crate::error::KnowMeshError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KnowMeshConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub mesh: MeshConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/knowmesh.sock".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: String,
    pub namespace_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: "~/.local/share/knowmesh".to_string(),
            namespace_key: "sql_ai_local_v2".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MeshConfig {
    pub enabled: bool,
    pub channel: String,
    /// Relay endpoints handed to the transport as-is.
    pub peers: Vec<String>,
    pub connect_delay_ms: u64,
    pub inbound_capacity: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: "knowledge_mesh_v1".to_string(),
            peers: Vec::new(),
            connect_delay_ms: 1500,
            inbound_capacity: 256,
        }
    }
}

/// What the learning state does with an answer that trims to nothing.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyAnswerPolicy {
    /// Stay in learning mode and ask again.
    #[default]
    Reprompt,
    /// Leave learning mode; the store declines the empty record.
    Store,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub empty_answer: EmptyAnswerPolicy,
    pub math_label: String,
    pub divide_by_zero: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            empty_answer: EmptyAnswerPolicy::Reprompt,
            math_label: "P2P Hesaplama Sonucu".to_string(),
            divide_by_zero: "Sıfıra bölünemez.".to_string(),
        }
    }
}

impl KnowMeshConfig {
    pub fn load(path: &str) -> Result<Self, KnowMeshError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        Ok(s.try_deserialize()?)
    }
}
