//! Connection address parsing.
//!
//! PostgreSQL addresses have the form
//! `postgresql://[user[:password]@]host[:port]/database`. Anything that does
//! not carry a PostgreSQL scheme is treated as a SQLite path, with `:memory:`
//! selecting a private in-memory database.

use std::fmt;

use crate::error::{Error, Result};

/// Token selecting an in-memory SQLite database.
pub const MEMORY: &str = ":memory:";

const SCHEMES: [&str; 2] = ["postgresql://", "postgres://"];

/// A parsed database address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// A PostgreSQL server.
    Postgres(ConnectionUri),
    /// A single in-memory SQLite database.
    SqliteMemory,
    /// A SQLite database file.
    SqliteFile(String),
}

impl Address {
    /// Classifies and parses `uri`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUri`] for a PostgreSQL address that does not
    /// match the expected form, or for an empty string.
    pub fn parse(uri: &str) -> Result<Self> {
        if SCHEMES.iter().any(|scheme| uri.starts_with(scheme)) {
            return ConnectionUri::parse(uri).map(Address::Postgres);
        }
        match uri {
            "" => Err(Error::InvalidUri(uri.to_string())),
            MEMORY => Ok(Address::SqliteMemory),
            path => Ok(Address::SqliteFile(path.to_string())),
        }
    }
}

/// Components of a PostgreSQL connection address.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionUri {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
}

impl fmt::Debug for ConnectionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionUri")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

impl ConnectionUri {
    /// Parses a `postgresql://` address without contacting the server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUri`] if the scheme, host or database part is
    /// missing, or if the port is not a number.
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = || Error::InvalidUri(uri.to_string());

        let rest = SCHEMES
            .iter()
            .find_map(|scheme| uri.strip_prefix(scheme))
            .ok_or_else(invalid)?;

        let (authority, database) = rest.split_once('/').ok_or_else(invalid)?;
        if database.is_empty() || database.contains('/') {
            return Err(invalid());
        }

        let (credentials, host_port) = match authority.rsplit_once('@') {
            Some((credentials, host_port)) => (Some(credentials), host_port),
            None => (None, authority),
        };

        let (user, password) = match credentials {
            Some(credentials) => match credentials.split_once(':') {
                Some((user, password)) => (user, Some(password.to_string())),
                None => (credentials, None),
            },
            None => ("", None),
        };

        let (host, port) = match host_port.split_once(':') {
            Some((host, port)) => (host, Some(port.parse::<u16>().map_err(|_| invalid())?)),
            None => (host_port, None),
        };
        if host.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            user: (!user.is_empty()).then(|| user.to_string()),
            password,
            host: host.to_string(),
            port,
            database: database.to_string(),
        })
    }

    /// Builds a `postgres` client configuration.
    ///
    /// A missing user falls back to the `USER` environment variable, the
    /// same default `libpq` applies.
    pub fn to_config(&self) -> postgres::Config {
        let mut config = postgres::Config::new();
        config.host(&self.host).dbname(&self.database);
        if let Some(port) = self.port {
            config.port(port);
        }
        match self.user.clone().or_else(|| std::env::var("USER").ok()) {
            Some(user) => {
                config.user(&user);
            }
            None => tracing::debug!("no user in connection URI or environment"),
        }
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }
}
