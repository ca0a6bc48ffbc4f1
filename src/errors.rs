/// Domain-specific error types for pgbm25
///
/// Every variant names the unmet precondition so operators can fix the
/// environment (missing extension, old server, wrong index) instead of
/// guessing from a planner error.

use crate::capability::MissingCapability;

#[derive(Debug, thiserror::Error)]
pub enum Bm25Error {
    /// The probing queries themselves failed (permissions, broken connection).
    #[error("Capability probe failed: {0}")]
    Capability(String),

    #[error("Unsupported server: {}", describe_missing(.missing))]
    UnsupportedServer {
        missing: Vec<MissingCapability>
    },

    #[error("Invalid field '{field}' on {table}: {reason}")]
    InvalidField {
        field: String,
        table: String,
        reason: String,
    },

    #[error("Invalid index '{index}': {reason}")]
    InvalidIndex {
        index: String,
        reason: String,
    },

    #[error("Score decode error: {0}")]
    ScoreDecode(String),

    #[error("Table not found: {table}")]
    UnknownTable {
        table: String
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for Bm25Error {
    fn from(e: sqlx::Error) -> Self {
        Bm25Error::Storage(e.to_string())
    }
}

impl Bm25Error {
    /// Helper to create validation errors with field names
    ///
    /// Example:
    /// ```
    /// use pgbm25::errors::Bm25Error;
    /// let err = Bm25Error::validation("threshold", "Threshold must be a number");
    /// ```
    pub fn validation(field: &str, message: &str) -> Self {
        Bm25Error::Validation {
            message: message.to_string(),
            field: Some(field.to_string()),
        }
    }
}

fn describe_missing(missing: &[MissingCapability]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
