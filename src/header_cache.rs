//! The header-cache collaborator (§9 design notes, §6 persisted state).
//!
//! The cache's storage engine is out of scope: the core only needs
//! `open/fetch/store/delete/close` and an opaque blob. The blob carries a
//! format version (so an `Email` layout change invalidates old entries
//! instead of misinterpreting them) and a `tv_sec` timestamp used for
//! staleness detection against the file's mtime.

use std::path::Path;

use crate::Result;

/// The current on-disk blob layout. Bump when [`crate::email::Email`]'s
/// cached fields change shape, so stale entries are treated as misses
/// rather than misread.
pub const BLOB_FORMAT_VERSION: u64 = 1;

/// An opaque, versioned, timestamped cache entry.
///
/// `payload` is produced and consumed only by the embedder's
/// email-(de)serializer; this crate never inspects its bytes.
#[derive(Clone, Debug)]
pub struct CachedHeader {
    pub format_version: u64,
    pub tv_sec: i64,
    pub payload: Vec<u8>,
}

impl CachedHeader {
    pub fn new(tv_sec: i64, payload: Vec<u8>) -> Self {
        Self {
            format_version: BLOB_FORMAT_VERSION,
            tv_sec,
            payload,
        }
    }

    /// A blob is usable only if it was written under the current format.
    pub fn is_current_version(&self) -> bool {
        self.format_version == BLOB_FORMAT_VERSION
    }
}

/// Key/value store for parsed-header blobs, keyed by the canonical
/// filename (4.E.a): the full numeric name for MH, or the
/// flag-suffix-stripped basename for Maildir.
///
/// A cache is opened once per sync and closed at its end (§5); callers
/// must not share a handle across syncs.
pub trait HeaderCache {
    fn open(&mut self, path: &Path) -> Result<()>;

    /// A miss is reported via `Ok(None)`, not an error — the caller falls
    /// back to re-parsing the message in full.
    fn fetch(&mut self, key: &str) -> Result<Option<CachedHeader>>;

    fn store(&mut self, key: &str, entry: &CachedHeader) -> Result<()>;

    fn delete(&mut self, key: &str) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// A cache that never hits, for embedders that don't want one. `store` and
/// `delete` are silently accepted so callers need no special-casing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullHeaderCache;

impl HeaderCache for NullHeaderCache {
    fn open(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn fetch(&mut self, _key: &str) -> Result<Option<CachedHeader>> {
        Ok(None)
    }

    fn store(&mut self, _key: &str, _entry: &CachedHeader) -> Result<()> {
        Ok(())
    }

    fn delete(&mut self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
