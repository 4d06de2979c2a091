//! Process-wide settings, reified as an explicit record.
//!
//! The original engine this crate generalizes reads these as global mutable
//! state (`check_new`, `maildir_trash`, ...). Here they are a plain value
//! threaded through the call tree, constructed once by the embedder.

/// Stable ordering used when presenting a mailbox's messages.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum SortOrder {
    /// MH natural order: ascending by message number.
    #[default]
    Natural,
    /// Preserve whatever order the directory scan produced.
    Discovery,
}

/// The three configurable `.mh_sequences` sequence names that map onto
/// [`crate::flags::UNSEEN`], [`crate::flags::FLAGGED`] and
/// [`crate::flags::REPLIED`]. Any other sequence name found on disk is
/// preserved verbatim across a rewrite.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub struct SequenceNames {
    pub unseen: String,
    pub flagged: String,
    pub replied: String,
}

impl Default for SequenceNames {
    fn default() -> Self {
        Self {
            unseen: "unseen".into(),
            flagged: "flagged".into(),
            replied: "replied".into(),
        }
    }
}

/// Engine-wide configuration, passed by reference through scan, parse,
/// check and sync rather than read from global state.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "derive",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub struct Config {
    /// Whether `check` should look for new mail at all (some embedders poll
    /// only for flag changes on otherwise-static mailboxes).
    pub check_new: bool,

    /// Maildir: encode `deleted` as the `T` flag and leave the file in
    /// place, instead of unlinking it on sync.
    pub maildir_trash: bool,

    /// MH: unlink soft-deleted (`,n`) files on sync instead of leaving the
    /// tombstone behind.
    pub mh_purge: bool,

    /// Trust the header cache's timestamp without re-parsing when the file
    /// mtime is older than the cached timestamp.
    pub header_cache_verify: bool,

    /// A `T`-flagged Maildir message that is also `F`-flagged is *not*
    /// treated as user-deleted (it survived being flagged after trashing).
    pub flag_safe: bool,

    /// Mark freshly scanned `new/` messages `old` so a later sync moves
    /// them into `cur/` even if they are never read.
    pub mark_old: bool,

    /// Ordering applied after a scan/parse pass and after reconciliation.
    pub sort: SortOrder,

    /// `.mh_sequences` sequence names.
    pub sequence_names: SequenceNames,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check_new: true,
            maildir_trash: true,
            mh_purge: false,
            header_cache_verify: true,
            flag_safe: false,
            mark_old: false,
            sort: SortOrder::default(),
            sequence_names: SequenceNames::default(),
        }
    }
}
