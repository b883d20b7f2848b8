/// All errors that can be returned by a MarketStorage implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// No row with the given primary key exists in `table`.
    #[error("{table} not found: {id}")]
    NotFound { table: &'static str, id: String },

    /// A row with this primary key already exists in `table`.
    #[error("{table} already exists: {id}")]
    AlreadyExists { table: &'static str, id: String },

    /// A UNIQUE constraint other than the primary key was violated
    /// (e.g. a second response for the same query).
    #[error("unique constraint violated on {table}.{column} = {value}")]
    UniqueViolation {
        table: &'static str,
        column: &'static str,
        value: String,
    },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub(crate) fn not_found(table: &'static str, id: &str) -> Self {
        StorageError::NotFound {
            table,
            id: id.to_string(),
        }
    }

    pub(crate) fn already_exists(table: &'static str, id: &str) -> Self {
        StorageError::AlreadyExists {
            table,
            id: id.to_string(),
        }
    }
}
