//! Error types for row, table, session and blob operations.

/// Errors surfaced by `htables`.
///
/// The first group is the normalized taxonomy callers are expected to match
/// on. Backend failures with no normalized meaning are passed through
/// unchanged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `get`, `find_first` or `find_single` matched no row.
    #[error("no row in '{table}'{}", .id.map(|id| format!(" with id={id}")).unwrap_or_default())]
    RowNotFound {
        /// Physical table name.
        table: String,
        /// The id that was looked up, when the lookup was by id.
        id: Option<i64>,
    },

    /// `find_single` matched more than one row.
    #[error("more than one row in '{table}' matches the filter")]
    MultipleRowsFound {
        /// Physical table name.
        table: String,
    },

    /// The backend reported that the relation does not exist.
    #[error("{0}")]
    MissingTable(String),

    /// Blob storage is not available for this database configuration.
    #[error("blobs are not supported by this database")]
    BlobsNotSupported,

    /// The in-memory blob store has no entry with this id.
    #[error("no blob with id {0}")]
    BlobNotFound(String),

    /// The session's connection was already returned to its pool.
    #[error("trying to use an expired database session")]
    ExpiredSession,

    /// The connection address could not be parsed.
    #[error("can't parse connection URI {0:?}")]
    InvalidUri(String),

    /// Table names must be plain SQL identifiers.
    #[error("invalid table name {0:?}")]
    InvalidTableName(String),

    /// Debug mode rejected a non-string value.
    #[error("value for key {key:?} is not a string")]
    InvalidRowData {
        /// The offending key.
        key: String,
    },

    /// A PostgreSQL error with no normalized meaning.
    #[error("postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    /// A SQLite error with no normalized meaning.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Checking a connection out of the pool failed.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Stored row data could not be encoded or decoded.
    #[error("row serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading a blob source failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand for results carrying [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
