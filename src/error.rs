// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Application-level result, as used by the REPL and startup code.
pub type Result<T> = anyhow::Result<T>;

/// Fatal startup problems. Any of these ends the process with a non-zero code.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("key file {0} not found")]
    MissingKeySource(PathBuf),

    #[error("failed to read key file {path}: {source}")]
    UnreadableKeySource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no valid keys in {0}")]
    NoKeys(String),

    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: String, value: String },
}

/// Why a model catalog query could not produce a model id.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("model catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model catalog returned status {0}")]
    Status(u16),

    #[error("malformed model catalog: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("no model supports generateContent")]
    EmptyCatalog,
}
