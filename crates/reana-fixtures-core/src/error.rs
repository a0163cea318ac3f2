use thiserror::Error;

/// Core error type for fixture setup, use and teardown.
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Secret store error: {0}")]
    Secret(String),

    #[error("Fixture error: {0}")]
    Fixture(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Teardown failed for {fixture}: {message}")]
    Teardown { fixture: String, message: String },
}

impl From<serde_json::Error> for FixtureError {
    fn from(e: serde_json::Error) -> Self {
        FixtureError::Serialization(e.to_string())
    }
}

impl From<base64::DecodeError> for FixtureError {
    fn from(e: base64::DecodeError) -> Self {
        FixtureError::Secret(format!("invalid base64 secret value: {}", e))
    }
}

/// Result type alias using FixtureError.
pub type Result<T> = std::result::Result<T, FixtureError>;
