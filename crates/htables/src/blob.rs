//! Streaming byte storage addressed by an opaque id.
//!
//! PostgreSQL sessions use server-side large objects. In-memory SQLite
//! databases keep blobs in a map shared by every session of the database
//! and lost when it is dropped. File-backed SQLite databases have no blob
//! storage and answer [`Error::BlobsNotSupported`].

use std::collections::HashMap;
use std::fmt;
use std::io::{ErrorKind, Read};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::session::{lock, Session};

/// Bytes moved per read or write round trip.
pub const BLOB_CHUNK_SIZE: usize = 1 << 14;

// Large-object open modes from libpq-fs.h.
const INV_WRITE: i32 = 0x0002_0000;
const INV_READ: i32 = 0x0004_0000;

/// Identity of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlobId {
    /// PostgreSQL large-object OID.
    Oid(u32),
    /// Random token assigned by an in-memory store.
    Token(String),
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobId::Oid(oid) => write!(f, "{oid}"),
            BlobId::Token(token) => f.write_str(token),
        }
    }
}

pub(crate) type SharedBlobs = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// Where a session's blobs live.
#[derive(Clone)]
pub(crate) enum BlobBackend {
    LargeObjects,
    Memory(SharedBlobs),
    Unsupported,
}

impl BlobBackend {
    pub(crate) fn allocate(&self, session: &Session) -> Result<BlobId> {
        match self {
            BlobBackend::LargeObjects => session.with_client(|client| {
                let oid: u32 = client.query_one("SELECT lo_create(0)", &[])?.get(0);
                Ok(BlobId::Oid(oid))
            }),
            BlobBackend::Memory(blobs) => {
                let mut blobs = lock(blobs);
                let token = loop {
                    let candidate = uuid::Uuid::new_v4().simple().to_string();
                    if !blobs.contains_key(&candidate) {
                        break candidate;
                    }
                };
                blobs.insert(token.clone(), Vec::new());
                Ok(BlobId::Token(token))
            }
            BlobBackend::Unsupported => Err(Error::BlobsNotSupported),
        }
    }

    pub(crate) fn delete(&self, session: &Session, id: &BlobId) -> Result<()> {
        match (self, id) {
            (BlobBackend::LargeObjects, BlobId::Oid(oid)) => session.with_client(|client| {
                client.query_one("SELECT lo_unlink($1)", &[oid])?;
                Ok(())
            }),
            (BlobBackend::Memory(blobs), BlobId::Token(token)) => lock(blobs)
                .remove(token)
                .map(drop)
                .ok_or_else(|| Error::BlobNotFound(id.to_string())),
            (BlobBackend::Unsupported, _) => Err(Error::BlobsNotSupported),
            _ => Err(Error::BlobNotFound(id.to_string())),
        }
    }

    /// Removes every blob; returns how many were removed.
    pub(crate) fn delete_all(&self, session: &Session) -> Result<usize> {
        match self {
            BlobBackend::LargeObjects => session.with_client(|client| {
                let oids: Vec<u32> = client
                    .query("SELECT oid FROM pg_largeobject_metadata", &[])?
                    .iter()
                    .map(|row| row.get(0))
                    .collect();
                for oid in &oids {
                    client.query_one("SELECT lo_unlink($1)", &[oid])?;
                }
                Ok(oids.len())
            }),
            BlobBackend::Memory(blobs) => {
                let mut blobs = lock(blobs);
                let removed = blobs.len();
                blobs.clear();
                Ok(removed)
            }
            BlobBackend::Unsupported => Err(Error::BlobsNotSupported),
        }
    }
}

/// Handle to one blob. Existence is only checked when data is moved.
pub struct Blob<'s> {
    session: &'s Session,
    id: BlobId,
}

impl<'s> Blob<'s> {
    pub(crate) fn new(session: &'s Session, id: BlobId) -> Self {
        Self { session, id }
    }

    pub fn id(&self) -> &BlobId {
        &self.id
    }

    /// Replaces the blob's contents with everything `source` yields.
    ///
    /// The source is read in [`BLOB_CHUNK_SIZE`] chunks until an empty read.
    /// A PostgreSQL descriptor opened here is closed on every exit path.
    pub fn save_from<R: Read>(&self, mut source: R) -> Result<()> {
        self.session.ensure_live()?;
        tracing::debug!(blob = %self.id, "saving blob");
        match (self.session.blob_backend(), &self.id) {
            (BlobBackend::LargeObjects, BlobId::Oid(oid)) => {
                write_large_object(self.session, *oid, &mut source)
            }
            (BlobBackend::Memory(blobs), BlobId::Token(token)) => {
                if !lock(blobs).contains_key(token) {
                    return Err(Error::BlobNotFound(self.id.to_string()));
                }
                let mut contents = Vec::new();
                let mut buf = vec![0u8; BLOB_CHUNK_SIZE];
                loop {
                    let n = read_chunk(&mut source, &mut buf)?;
                    if n == 0 {
                        break;
                    }
                    contents.extend_from_slice(&buf[..n]);
                }
                let mut blobs = lock(blobs);
                let slot = blobs
                    .get_mut(token)
                    .ok_or_else(|| Error::BlobNotFound(self.id.to_string()))?;
                *slot = contents;
                Ok(())
            }
            (BlobBackend::Unsupported, _) => Err(Error::BlobsNotSupported),
            _ => Err(Error::BlobNotFound(self.id.to_string())),
        }
    }

    /// Streams the blob's contents as a sequence of chunks.
    pub fn iter_data(&self) -> Result<BlobChunks<'s>> {
        self.session.ensure_live()?;
        let source = match (self.session.blob_backend(), &self.id) {
            (BlobBackend::LargeObjects, BlobId::Oid(oid)) => {
                let fd = self.session.with_client(|client| {
                    Ok(client
                        .query_one("SELECT lo_open($1, $2)", &[oid, &INV_READ])?
                        .get::<_, i32>(0))
                })?;
                ChunkSource::LargeObject {
                    session: self.session,
                    fd: Some(fd),
                }
            }
            (BlobBackend::Memory(blobs), BlobId::Token(token)) => {
                let data = lock(blobs)
                    .get(token)
                    .cloned()
                    .ok_or_else(|| Error::BlobNotFound(self.id.to_string()))?;
                ChunkSource::Memory { data, pos: 0 }
            }
            (BlobBackend::Unsupported, _) => return Err(Error::BlobsNotSupported),
            _ => return Err(Error::BlobNotFound(self.id.to_string())),
        };
        Ok(BlobChunks { source })
    }

    /// Reads the whole blob into memory.
    pub fn read_to_vec(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for chunk in self.iter_data()? {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}

/// Forward-only chunk iterator returned by [`Blob::iter_data`].
///
/// A PostgreSQL descriptor is closed once the data is exhausted, after an
/// error, or when the iterator is dropped early.
pub struct BlobChunks<'s> {
    source: ChunkSource<'s>,
}

enum ChunkSource<'s> {
    LargeObject { session: &'s Session, fd: Option<i32> },
    Memory { data: Vec<u8>, pos: usize },
}

impl Iterator for BlobChunks<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            ChunkSource::LargeObject { session, fd } => {
                let open = (*fd)?;
                let chunk = session.with_client(|client| {
                    Ok(client
                        .query_one("SELECT loread($1, $2)", &[&open, &(BLOB_CHUNK_SIZE as i32)])?
                        .get::<_, Vec<u8>>(0))
                });
                match chunk {
                    Ok(chunk) if !chunk.is_empty() => Some(Ok(chunk)),
                    Ok(_) => {
                        *fd = None;
                        close_large_object(session, open).err().map(Err)
                    }
                    Err(e) => {
                        *fd = None;
                        Some(Err(e))
                    }
                }
            }
            ChunkSource::Memory { data, pos } => {
                if *pos >= data.len() {
                    return None;
                }
                let end = (*pos + BLOB_CHUNK_SIZE).min(data.len());
                let chunk = data[*pos..end].to_vec();
                *pos = end;
                Some(Ok(chunk))
            }
        }
    }
}

impl Drop for BlobChunks<'_> {
    fn drop(&mut self) {
        if let ChunkSource::LargeObject {
            session,
            fd: Some(fd),
        } = self.source
        {
            if let Err(e) = close_large_object(session, fd) {
                tracing::debug!(error = %e, "closing abandoned large object failed");
            }
        }
    }
}

fn close_large_object(session: &Session, fd: i32) -> Result<()> {
    session.with_client(|client| {
        client.query_one("SELECT lo_close($1)", &[&fd])?;
        Ok(())
    })
}

/// Rewrites a large object from `source`.
///
/// The session's connection is only borrowed around each server call, never
/// while `source` is read, so the source may itself read blobs of the same
/// session.
fn write_large_object(session: &Session, oid: u32, source: &mut dyn Read) -> Result<()> {
    let fd = session.with_client(|client| {
        Ok(client
            .query_one("SELECT lo_open($1, $2)", &[&oid, &INV_WRITE])?
            .get::<_, i32>(0))
    })?;
    let written = copy_into_large_object(session, fd, source);
    let closed = close_large_object(session, fd);
    written?;
    closed
}

fn copy_into_large_object(session: &Session, fd: i32, source: &mut dyn Read) -> Result<()> {
    session.with_client(|client| {
        client.query_one("SELECT lo_truncate($1, 0)", &[&fd])?;
        Ok(())
    })?;
    let mut buf = vec![0u8; BLOB_CHUNK_SIZE];
    loop {
        let n = read_chunk(source, &mut buf)?;
        if n == 0 {
            return Ok(());
        }
        let chunk: &[u8] = &buf[..n];
        session.with_client(|client| {
            client.query_one("SELECT lowrite($1, $2)", &[&fd, &chunk])?;
            Ok(())
        })?;
    }
}

/// One `read` call, retried on interruption. Zero means end of stream.
fn read_chunk(source: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    loop {
        match source.read(buf) {
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
