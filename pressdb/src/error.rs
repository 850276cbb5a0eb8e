use thiserror::Error;

#[derive(Error, Debug)]
pub enum PressDbError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Storage mount failed:\n{0}")]
    Mount(String),

    #[error("Failed to parse '{key}': {cause}")]
    Parse {
        key: String,
        #[source]
        cause: Box<PressDbError>,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Integrity version mismatch: artifact is '{found}', expected '{expected}'")]
    IntegrityMismatch { expected: String, found: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl PressDbError {
    /// Wrap an error as a parse failure for a specific storage key.
    pub fn parse(key: impl Into<String>, cause: PressDbError) -> Self {
        PressDbError::Parse {
            key: key.into(),
            cause: Box::new(cause),
        }
    }
}

pub type Result<T> = std::result::Result<T, PressDbError>;
