//! Database handles that hand out and reclaim sessions.

use std::ops::Deref;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use postgres::NoTls;
use r2d2::{ManageConnection, Pool};
use r2d2_postgres::PostgresConnectionManager;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;

use crate::blob::{BlobBackend, SharedBlobs};
use crate::config::DatabaseConfig;
use crate::dialect::register_functions;
use crate::error::Result;
use crate::schema::Schema;
use crate::session::{Connector, PgPool, Session, SessionSettings};
use crate::uri::{Address, ConnectionUri, MEMORY};

/// Common contract of every database handle.
pub trait SessionPool {
    /// Opens a session. A lazy session checks out its connection on first
    /// use instead of now.
    fn get_session(&self, lazy: bool) -> Result<Session>;

    /// Returns the session's connection and expires the session.
    ///
    /// Uncommitted work on a connection of its own is rolled back. A lazy
    /// session that never connected has nothing to return.
    fn put_session(&self, session: &Session);

    /// Opens an eager session that is returned when the guard drops.
    fn session(&self) -> Result<PooledSession<'_, Self>>
    where
        Self: Sized,
    {
        Ok(PooledSession {
            pool: self,
            session: self.get_session(false)?,
        })
    }
}

/// Scoped session from [`SessionPool::session`].
///
/// Dropping the guard calls [`SessionPool::put_session`], whether the scope
/// ends normally, through `?`, or by unwinding.
pub struct PooledSession<'p, P: SessionPool> {
    pool: &'p P,
    session: Session,
}

impl<P: SessionPool> Deref for PooledSession<'_, P> {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl<P: SessionPool> Drop for PooledSession<'_, P> {
    fn drop(&mut self) {
        self.pool.put_session(&self.session);
    }
}

fn settings(config: &DatabaseConfig, schema: Schema) -> SessionSettings {
    SessionSettings {
        schema: Arc::new(schema),
        debug: config.debug,
        scan_page_size: config.scan_page_size,
    }
}

/// PostgreSQL database backed by a bounded `r2d2` pool.
///
/// The pool starts empty and grows on demand up to
/// [`DatabaseConfig::pool_max_size`] connections.
pub struct PostgresDb {
    pool: PgPool,
    settings: SessionSettings,
}

impl PostgresDb {
    /// Builds the pool without opening any connection.
    pub fn new(uri: &ConnectionUri, config: &DatabaseConfig, schema: Schema) -> Result<Self> {
        let manager = PostgresConnectionManager::new(uri.to_config(), NoTls);
        let pool = Pool::builder()
            .min_idle(Some(0))
            .max_size(config.pool_max_size.max(1))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .build_unchecked(manager);

        tracing::info!(
            host = %uri.host,
            database = %uri.database,
            max_size = pool.max_size(),
            "postgres pool created"
        );

        Ok(Self {
            pool,
            settings: settings(config, schema),
        })
    }

    /// Parses `uri` and builds the pool with default settings.
    pub fn connect(uri: &str) -> Result<Self> {
        Self::new(&ConnectionUri::parse(uri)?, &DatabaseConfig::new(uri), Schema::new())
    }

    /// Connection counts of the underlying pool.
    pub fn pool_state(&self) -> r2d2::State {
        self.pool.state()
    }
}

impl SessionPool for PostgresDb {
    fn get_session(&self, lazy: bool) -> Result<Session> {
        Session::open(
            Connector::Postgres(self.pool.clone()),
            BlobBackend::LargeObjects,
            self.settings.clone(),
            lazy,
        )
    }

    fn put_session(&self, session: &Session) {
        let returned = session.release();
        tracing::debug!(returned, "postgres session put back");
    }
}

/// Opens SQLite connections with the busy timeout, journal mode and the
/// `regexp` function every session relies on.
fn sqlite_manager(manager: SqliteConnectionManager, busy_timeout_ms: u64) -> SqliteConnectionManager {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    manager.with_flags(flags).with_init(move |conn| {
        // In-memory databases report "memory" which is expected and acceptable.
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        if journal_mode != "wal" && journal_mode != "memory" {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!(
                    "failed to set WAL journal mode, got: {}",
                    journal_mode
                )),
            ));
        }
        conn.execute_batch(&format!("PRAGMA busy_timeout = {};", busy_timeout_ms))?;
        register_functions(conn)
    })
}

/// SQLite database.
///
/// `:memory:` keeps a single connection for the lifetime of the handle and
/// shares it between all sessions, together with an in-memory blob store.
/// Those sessions share one transaction; putting one back only expires it.
/// A file path opens a fresh connection for every session and closes it
/// when the session is put back; such databases cannot store blobs.
pub struct SqliteDb {
    connector: Connector,
    blobs: BlobBackend,
    settings: SessionSettings,
}

impl SqliteDb {
    /// Opens `path`, or a private in-memory database for `:memory:`.
    pub fn new(path: &str, config: &DatabaseConfig, schema: Schema) -> Result<Self> {
        let settings = settings(config, schema);
        if path == MEMORY {
            let manager = sqlite_manager(SqliteConnectionManager::memory(), config.busy_timeout_ms);
            let conn = manager.connect()?;
            tracing::info!("sqlite in-memory database opened");
            return Ok(Self {
                connector: Connector::SqliteShared(Arc::new(Mutex::new(conn))),
                blobs: BlobBackend::Memory(SharedBlobs::default()),
                settings,
            });
        }

        let manager = sqlite_manager(SqliteConnectionManager::file(path), config.busy_timeout_ms);
        // Fail now rather than on the first session if the file is unusable.
        drop(manager.connect()?);
        tracing::info!(path, "sqlite file database opened");
        Ok(Self {
            connector: Connector::SqliteFile(Arc::new(manager)),
            blobs: BlobBackend::Unsupported,
            settings,
        })
    }

    /// A private in-memory database with default settings.
    pub fn in_memory() -> Result<Self> {
        Self::new(MEMORY, &DatabaseConfig::default(), Schema::new())
    }

    /// A file database with default settings.
    pub fn open(path: &str) -> Result<Self> {
        Self::new(path, &DatabaseConfig::new(path), Schema::new())
    }

    pub fn supports_blobs(&self) -> bool {
        !matches!(self.blobs, BlobBackend::Unsupported)
    }
}

impl SessionPool for SqliteDb {
    fn get_session(&self, lazy: bool) -> Result<Session> {
        Session::open(
            self.connector.clone(),
            self.blobs.clone(),
            self.settings.clone(),
            lazy,
        )
    }

    fn put_session(&self, session: &Session) {
        let closed = session.release();
        tracing::debug!(closed, "sqlite session put back");
    }
}

/// Either backend, chosen from the configured address.
pub enum Database {
    Postgres(PostgresDb),
    Sqlite(SqliteDb),
}

impl Database {
    /// Builds the handle described by `config` with no declared tables.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::with_schema(config, Schema::new())
    }

    /// Builds the handle described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUri`](crate::Error::InvalidUri) for a malformed
    /// PostgreSQL address before any connection is attempted.
    pub fn with_schema(config: &DatabaseConfig, schema: Schema) -> Result<Self> {
        match Address::parse(&config.uri)? {
            Address::Postgres(uri) => Ok(Database::Postgres(PostgresDb::new(&uri, config, schema)?)),
            Address::SqliteMemory => Ok(Database::Sqlite(SqliteDb::new(MEMORY, config, schema)?)),
            Address::SqliteFile(path) => Ok(Database::Sqlite(SqliteDb::new(&path, config, schema)?)),
        }
    }
}

impl SessionPool for Database {
    fn get_session(&self, lazy: bool) -> Result<Session> {
        match self {
            Database::Postgres(db) => db.get_session(lazy),
            Database::Sqlite(db) => db.get_session(lazy),
        }
    }

    fn put_session(&self, session: &Session) {
        match self {
            Database::Postgres(db) => db.put_session(session),
            Database::Sqlite(db) => db.put_session(session),
        }
    }
}
