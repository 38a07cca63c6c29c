//! Document rows on top of relational databases.
//!
//! Every table is a relation with an integer `id` and a string-keyed payload.
//! PostgreSQL stores the payload in an `hstore` column and keeps blobs as
//! large objects; SQLite stores it as JSON text, with an in-memory blob store
//! for `:memory:` databases.
//!
//! Work happens inside a [`Session`] obtained from a [`SessionPool`]: either
//! [`PostgresDb`], [`SqliteDb`], or [`Database`] which picks one from a
//! configured address.
//!
//! # Design decisions
//!
//! - **Implicit transactions**: a session opens a transaction before its
//!   first statement. Nothing is durable until [`Session::commit`], and
//!   returning a session rolls back whatever was left uncommitted on its
//!   connection. Sessions of an in-memory SQLite database share a single
//!   connection, so returning one of them leaves the transaction open.
//! - **Lazy sessions**: `get_session(true)` defers the pool checkout until the
//!   first operation, so request handlers that never touch the database
//!   never hold a connection.
//! - **Normalized errors**: a missing relation is reported as
//!   [`Error::MissingTable`] on both backends; other backend errors pass
//!   through unchanged.
//!
//! # Usage
//!
//! ```rust,ignore
//! use htables::{op, SessionPool, SqliteDb};
//!
//! let db = SqliteDb::in_memory()?;
//! let session = db.session()?;
//! let people = session.table("person");
//! people.create_table()?;
//! people.new([("name", "Joe"), ("city", "Bucharest")])?;
//! session.commit()?;
//!
//! for row in people.find([("name", op::re("^J"))]) {
//!     println!("{:?}", row?);
//! }
//! ```

mod blob;
mod config;
mod dialect;
mod error;
mod filter;
pub mod logging;
mod pool;
mod row;
mod schema;
mod session;
mod table;
mod uri;

pub use blob::{Blob, BlobChunks, BlobId, BLOB_CHUNK_SIZE};
pub use config::{load_config, Config, ConfigError, DatabaseConfig, LoggingConfig};
pub use dialect::{Dialect, PostgresDialect, SqliteDialect};
pub use error::{Error, Result};
pub use filter::{op, Filter, Predicate, Select};
pub use pool::{Database, PooledSession, PostgresDb, SessionPool, SqliteDb};
pub use row::{row_data, Row, RowData};
pub use schema::{Schema, TableShape};
pub use session::Session;
pub use table::{Query, Rows, Table};
pub use uri::{Address, ConnectionUri, MEMORY};

#[cfg(test)]
mod tests;
