//! Error types for TestRelay

use thiserror::Error;

/// Result type alias using TestRelay Error
pub type Result<T> = std::result::Result<T, Error>;

/// TestRelay error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing environment variable {var}: {hint}")]
    MissingEnv { var: String, hint: String },

    #[error("Run metadata not found at {0}")]
    MetadataNotFound(String),

    #[error("Unknown project \"{requested}\". Valid: {valid}")]
    UnknownProject { requested: String, valid: String },
}

impl From<tempfile::PersistError> for Error {
    fn from(e: tempfile::PersistError) -> Self {
        Error::Io(e.error)
    }
}
