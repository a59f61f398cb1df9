//! Store error types.

use thiserror::Error;

/// Errors from the persistence gateway.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity name (`account`, `route`, `action`).
        entity: &'static str,
        /// The missing identifier.
        id: String,
    },

    /// A stored status string failed to parse.
    #[error("corrupt status column: {0}")]
    CorruptStatus(String),

    /// A stored identifier failed to parse.
    #[error("corrupt id column: {0}")]
    CorruptId(String),

    /// A parameter blob failed to serialize or deserialize.
    #[error("params: {0}")]
    Params(#[from] serde_json::Error),

    /// The backend failed. Conflicting concurrent updates surface here.
    #[error("backend: {0}")]
    Backend(String),
}

impl StoreError {
    /// A not-found error for the given entity and id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Wrap a backend failure.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}
