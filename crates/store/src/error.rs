use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint was violated (e.g. a duplicate email).
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A row referenced by the operation does not exist.
    #[error("{entity} {id} does not exist")]
    MissingRow { entity: &'static str, id: i64 },

    /// A stored value could not be mapped back into a domain record.
    #[error("Corrupt value in column {column}: {reason}")]
    Corrupt { column: &'static str, reason: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if this error is a unique violation of `constraint`.
    pub fn is_unique_violation(&self, constraint: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint: c } if c == constraint)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
