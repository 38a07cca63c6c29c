//! Sessions: one physical connection plus table and blob access.
//!
//! A session's connection is always in one of three states. `Eager` holds a
//! live connection. `Lazy` defers checkout until the first operation that
//! needs the backend. `Expired` means the connection went back to its pool;
//! every later operation fails with [`Error::ExpiredSession`].
//!
//! Work runs inside an implicit transaction that is opened before the first
//! statement and ended by [`Session::commit`] or [`Session::rollback`].
//! Releasing a session rolls back whatever was not committed.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use postgres::{Client, NoTls};
use r2d2::ManageConnection;
use r2d2_postgres::PostgresConnectionManager;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::blob::{Blob, BlobBackend, BlobId};
use crate::dialect::{Dialect, PostgresDialect, SqliteDialect};
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::table::Table;

pub(crate) type PgPool = r2d2::Pool<PostgresConnectionManager<NoTls>>;
type PgConnection = r2d2::PooledConnection<PostgresConnectionManager<NoTls>>;
pub(crate) type SharedConnection = Arc<Mutex<Connection>>;

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How a session obtains its physical connection.
#[derive(Clone)]
pub(crate) enum Connector {
    Postgres(PgPool),
    SqliteShared(SharedConnection),
    SqliteFile(Arc<SqliteConnectionManager>),
}

impl Connector {
    fn connect(&self) -> Result<Conn> {
        match self {
            Connector::Postgres(pool) => Ok(Conn::Postgres {
                client: pool.get()?,
                in_transaction: false,
            }),
            Connector::SqliteShared(shared) => Ok(Conn::SqliteShared(Arc::clone(shared))),
            Connector::SqliteFile(manager) => Ok(Conn::SqliteOwned(manager.connect()?)),
        }
    }
}

/// A realized connection.
enum Conn {
    Postgres {
        client: PgConnection,
        in_transaction: bool,
    },
    SqliteOwned(Connection),
    SqliteShared(SharedConnection),
}

impl Conn {
    fn begin(&mut self) -> Result<()> {
        match self {
            Conn::Postgres {
                client,
                in_transaction,
            } => {
                if !*in_transaction {
                    client.batch_execute("BEGIN")?;
                    *in_transaction = true;
                }
            }
            Conn::SqliteOwned(conn) => sqlite_begin(conn)?,
            Conn::SqliteShared(shared) => sqlite_begin(&lock(shared))?,
        }
        Ok(())
    }

    fn finish(&mut self, statement: &str) -> Result<()> {
        match self {
            Conn::Postgres {
                client,
                in_transaction,
            } => {
                if *in_transaction {
                    *in_transaction = false;
                    client.batch_execute(statement)?;
                }
            }
            Conn::SqliteOwned(conn) => sqlite_finish(conn, statement)?,
            Conn::SqliteShared(shared) => sqlite_finish(&lock(shared), statement)?,
        }
        Ok(())
    }
}

fn sqlite_begin(conn: &Connection) -> rusqlite::Result<()> {
    if conn.is_autocommit() {
        conn.execute_batch("BEGIN")?;
    }
    Ok(())
}

fn sqlite_finish(conn: &Connection, statement: &str) -> rusqlite::Result<()> {
    if !conn.is_autocommit() {
        conn.execute_batch(statement)?;
    }
    Ok(())
}

enum ConnState {
    Lazy,
    Eager(Conn),
    Expired,
}

/// Settings a database hands to each of its sessions.
#[derive(Clone)]
pub(crate) struct SessionSettings {
    pub schema: Arc<Schema>,
    pub debug: bool,
    pub scan_page_size: u32,
}

/// One checked-out connection and the tables and blobs reached through it.
///
/// A session is confined to one thread at a time. Obtain it from a
/// [`SessionPool`](crate::SessionPool) and hand it back with
/// [`put_session`](crate::SessionPool::put_session), or use the scoped
/// [`session`](crate::SessionPool::session) guard.
pub struct Session {
    state: RefCell<ConnState>,
    connector: Connector,
    blobs: BlobBackend,
    settings: SessionSettings,
}

impl Session {
    pub(crate) fn open(
        connector: Connector,
        blobs: BlobBackend,
        settings: SessionSettings,
        lazy: bool,
    ) -> Result<Self> {
        let state = if lazy {
            ConnState::Lazy
        } else {
            ConnState::Eager(connector.connect()?)
        };
        tracing::debug!(lazy, "session opened");
        Ok(Self {
            state: RefCell::new(state),
            connector,
            blobs,
            settings,
        })
    }

    /// Looks up a table by logical name.
    ///
    /// Names absent from the schema resolve to a relation of the same name;
    /// whether it exists is only discovered when an operation reaches the
    /// backend.
    pub fn table(&self, name: &str) -> Table<'_> {
        Table::bind(self, Rc::new(self.settings.schema.shape(name)))
    }

    /// Commits the current transaction.
    pub fn commit(&self) -> Result<()> {
        self.with_conn(|conn| conn.finish("COMMIT"))?;
        tracing::debug!("session committed");
        Ok(())
    }

    /// Discards uncommitted work.
    pub fn rollback(&self) -> Result<()> {
        self.with_conn(|conn| conn.finish("ROLLBACK"))?;
        tracing::debug!("session rolled back");
        Ok(())
    }

    /// True until the session is returned to its pool.
    pub fn is_live(&self) -> bool {
        !matches!(*self.state.borrow(), ConnState::Expired)
    }

    /// True once a physical connection has been checked out.
    pub fn is_connected(&self) -> bool {
        matches!(*self.state.borrow(), ConnState::Eager(_))
    }

    /// Allocates an empty blob.
    pub fn allocate_blob(&self) -> Result<BlobId> {
        self.ensure_live()?;
        let id = self.blobs.allocate(self)?;
        tracing::debug!(blob = %id, "blob allocated");
        Ok(id)
    }

    /// Allocates an empty blob and returns a handle to it.
    pub fn new_blob(&self) -> Result<Blob<'_>> {
        Ok(Blob::new(self, self.allocate_blob()?))
    }

    /// Handle to an existing blob; existence is checked on first use.
    pub fn open_blob(&self, id: BlobId) -> Blob<'_> {
        Blob::new(self, id)
    }

    pub fn delete_blob(&self, id: &BlobId) -> Result<()> {
        self.ensure_live()?;
        self.blobs.delete(self, id)?;
        tracing::debug!(blob = %id, "blob deleted");
        Ok(())
    }

    /// Deletes every blob in the database.
    pub fn delete_all_blobs(&self) -> Result<()> {
        self.ensure_live()?;
        let removed = self.blobs.delete_all(self)?;
        tracing::debug!(removed, "all blobs deleted");
        Ok(())
    }

    /// Creates every table declared in the schema, then commits.
    pub fn create_all(&self) -> Result<()> {
        for shape in self.settings.schema.declared() {
            self.with_dialect(|dialect| dialect.create_table(&shape.name))?;
        }
        self.commit()
    }

    /// Drops every declared table and every blob, then commits.
    pub fn drop_all(&self) -> Result<()> {
        for shape in self.settings.schema.declared() {
            self.with_dialect(|dialect| dialect.drop_table(&shape.name))?;
        }
        if !matches!(self.blobs, BlobBackend::Unsupported) {
            self.delete_all_blobs()?;
        }
        self.commit()
    }

    pub(crate) fn debug(&self) -> bool {
        self.settings.debug
    }

    pub(crate) fn scan_page_size(&self) -> u32 {
        self.settings.scan_page_size.max(1)
    }

    pub(crate) fn blob_backend(&self) -> &BlobBackend {
        &self.blobs
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(Error::ExpiredSession)
        }
    }

    /// Runs `f` on the realized connection, checking it out if still lazy.
    fn with_conn<T>(&self, f: impl FnOnce(&mut Conn) -> Result<T>) -> Result<T> {
        let mut state = self.state.borrow_mut();
        if let ConnState::Lazy = *state {
            tracing::debug!("lazy session acquiring connection");
            *state = ConnState::Eager(self.connector.connect()?);
        }
        match &mut *state {
            ConnState::Eager(conn) => f(conn),
            _ => Err(Error::ExpiredSession),
        }
    }

    /// Runs `f` against this session's dialect inside the open transaction.
    pub(crate) fn with_dialect<T>(&self, f: impl FnOnce(&mut dyn Dialect) -> Result<T>) -> Result<T> {
        self.with_conn(|conn| {
            conn.begin()?;
            match conn {
                Conn::Postgres { client, .. } => f(&mut PostgresDialect::new(client)),
                Conn::SqliteOwned(conn) => f(&mut SqliteDialect::new(conn)),
                Conn::SqliteShared(shared) => {
                    let conn = lock(shared);
                    let mut dialect = SqliteDialect::new(&conn);
                    f(&mut dialect)
                }
            }
        })
    }

    /// Runs `f` on the PostgreSQL client inside the open transaction.
    pub(crate) fn with_client<T>(&self, f: impl FnOnce(&mut Client) -> Result<T>) -> Result<T> {
        self.with_conn(|conn| {
            conn.begin()?;
            match conn {
                Conn::Postgres { client, .. } => f(client),
                Conn::SqliteOwned(_) | Conn::SqliteShared(_) => Err(Error::BlobsNotSupported),
            }
        })
    }

    /// Expires the session, rolling back and dropping its connection.
    ///
    /// Returns whether a physical connection had been checked out. Dropping
    /// it returns a pooled PostgreSQL connection to its pool and closes an
    /// owned SQLite connection. A shared SQLite connection is left untouched.
    pub(crate) fn release(&self) -> bool {
        let previous = self.state.replace(ConnState::Expired);
        match previous {
            ConnState::Eager(Conn::SqliteShared(_)) => true,
            ConnState::Eager(mut conn) => {
                if let Err(e) = conn.finish("ROLLBACK") {
                    tracing::warn!(error = %e, "rollback on session release failed");
                }
                true
            }
            ConnState::Lazy | ConnState::Expired => false,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
