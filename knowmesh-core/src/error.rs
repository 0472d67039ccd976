use thiserror::Error;

#[derive(Error, Debug)]
pub enum KnowMeshError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Byte store error: {0}")]
    ByteStore(#[from] ByteStoreError),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

/// Failures of the durable key/value collaborator underneath the store.
#[derive(Error, Debug)]
pub enum ByteStoreError {
    #[error("IO error on key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}
