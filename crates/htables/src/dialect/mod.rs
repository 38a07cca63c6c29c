//! Backend-specific SQL generation and error classification.
//!
//! Every table is one relation with two columns: an auto-incrementing `id`
//! and a `data` payload. PostgreSQL stores the payload as a native `hstore`;
//! SQLite stores it as JSON text. Callers only ever see [`RowData`], the
//! encoding stays inside the dialect.

mod postgres;
mod sqlite;

pub use self::postgres::PostgresDialect;
pub use self::sqlite::{register_functions, SqliteDialect};

use crate::error::{Error, Result};
use crate::filter::{Filter, Select};
use crate::row::RowData;

/// Operations a storage backend provides to [`Table`](crate::Table).
///
/// Errors matching the backend's "relation does not exist" message are
/// reported as [`Error::MissingTable`]; other backend errors are returned
/// unchanged.
pub trait Dialect {
    /// Creates the relation if it does not exist.
    fn create_table(&mut self, name: &str) -> Result<()>;

    /// Drops the relation if it exists.
    fn drop_table(&mut self, name: &str) -> Result<()>;

    /// Inserts a row and returns its generated id.
    fn insert(&mut self, name: &str, data: &RowData) -> Result<i64>;

    fn select_by_id(&mut self, name: &str, id: i64) -> Result<Option<RowData>>;

    /// Runs a filtered, ordered and paged scan.
    fn select(&mut self, name: &str, select: &Select<'_>) -> Result<Vec<(i64, RowData)>>;

    /// Counts rows matching `filter`.
    fn count(&mut self, name: &str, filter: &Filter) -> Result<u64>;

    fn update(&mut self, name: &str, id: i64, data: &RowData) -> Result<()>;

    /// Deletes by id. A missing id is not an error.
    fn delete(&mut self, name: &str, id: i64) -> Result<()>;
}

/// Table names are spliced into SQL text, so only plain identifiers pass.
pub(crate) fn check_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(Error::InvalidTableName(name.to_string()))
    }
}

fn to_sql_count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
