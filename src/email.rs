//! The in-memory message record and the headers-parsing collaborator.
//!
//! RFC 822/MIME parsing itself is out of scope (spec §1): this crate only
//! needs a stable place to put the handful of fields the storage engine
//! reads and writes, plus a seam ([`HeaderParser`]) the embedder fills in
//! with a real parser.

use std::{io::Read, path::PathBuf};

use crate::Result;

/// A single message, as tracked by the storage engine.
///
/// `path` is always relative to the owning mailbox's root. Flags are the
/// engine's own bookkeeping; `maildir_flags` preserves any Maildir flag
/// letters this crate doesn't interpret (custom/experimental flags), so a
/// rewrite never silently drops them.
#[derive(Clone, Debug, Default)]
pub struct Email {
    pub path: PathBuf,

    pub read: bool,
    pub flagged: bool,
    pub replied: bool,
    pub deleted: bool,
    pub old: bool,

    /// Mirrors the on-disk trashed state (Maildir `T` flag, or MH `,n`
    /// tombstone), as last observed at scan/sync time.
    pub trash: bool,

    /// Set when the embedder has modified flags in memory but a sync
    /// hasn't yet written them out. Reconciliation in `check` will not
    /// clobber an email whose `changed` bit is set.
    pub changed: bool,

    /// Queues an attachment-stripping rewrite on the next sync.
    pub attach_del: bool,
    pub xlabel_changed: bool,
    pub refs_changed: bool,
    pub irt_changed: bool,

    /// Byte offset of the message content (headers end / body starts).
    pub content_offset: u64,
    pub content_length: u64,

    /// Unix timestamp the message was received, if known.
    pub received: i64,

    /// Any Maildir flag letters outside `FRST`, preserved verbatim.
    pub maildir_flags: Option<String>,

    /// Position in the owning mailbox's email array, refreshed after each
    /// compaction (`update-tables`, sync).
    pub index: usize,
}

impl Email {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// The out-of-scope RFC 822 header parser. The engine calls this once per
/// message that needs a content pass (§4.E) and trusts the returned
/// `content_offset`/`received` to compute the rest.
pub trait HeaderParser {
    fn parse_headers(&self, reader: &mut dyn Read) -> Result<ParsedHeaders>;
}

/// What the embedder's parser must produce for the engine to finish
/// populating an [`Email`].
#[derive(Clone, Debug, Default)]
pub struct ParsedHeaders {
    pub content_offset: u64,
    pub received: i64,
}
