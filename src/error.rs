use thiserror::Error;

#[derive(Error, Debug)]
pub enum CanopyError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Duplicate label '{label}' under {parent}")]
    DuplicateLabel { parent: String, label: String },
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, CanopyError>;

// Helper conversions
impl From<rusqlite::Error> for CanopyError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}
impl From<config::ConfigError> for CanopyError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
impl From<serde_json::Error> for CanopyError {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation(e.to_string())
    }
}
