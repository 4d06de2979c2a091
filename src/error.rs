use std::{io, path::PathBuf, result, time};

use thiserror::Error;

/// Errors produced by the mailbox engine.
///
/// Per-entry scan failures are logged and skipped rather than surfaced here
/// (see [`crate::scan`]); everything that reaches this type is either fatal
/// for the enclosing operation or a caller-visible recoverable condition.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    SystemTime(#[from] time::SystemTimeError),

    /// A cooperative cancellation token fired mid-scan or mid-parse.
    #[error("operation aborted")]
    Aborted,

    /// `.mh_sequences` (or another sidecar format) could not be parsed.
    #[error("cannot parse {0}: {1}")]
    FormatError(PathBuf, String),

    /// A header-cache miss, or a sequence file that does not exist yet.
    /// Treated as "empty" by callers, never propagated as a hard failure.
    #[error("recoverable miss: {0}")]
    RecoverableMiss(String),

    /// A rename failed partway through a sync, for a reason other than
    /// `EEXIST` (which is retried). The mailbox may be left with a message
    /// under a temporary or stale name.
    #[error("rename from {from} to {to} failed: {source}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Commit could not allocate a free message id after exhausting
    /// retries.
    #[error("cannot allocate a free message id under {0}")]
    AllocationExhausted(PathBuf),

    #[error("rename would cross filesystems: {0}")]
    CrossDevice(PathBuf),

    /// A required compressed-mailbox command template is missing.
    #[error("compressed mailbox is missing the `{0}` command template")]
    MissingTemplate(&'static str),

    /// A compressed-mailbox command template without both %f and %t.
    #[error("command template `{0}` must reference both %f and %t")]
    InvalidTemplate(String),

    /// A shell command invoked by the compressed wrapper exited non-zero.
    #[error("command `{cmd}` exited with status {status}")]
    ShellFailed { cmd: String, status: i32 },

    #[error("cannot lock {0}")]
    LockFailed(PathBuf),

    #[error("header cache error: {0}")]
    HeaderCache(String),

    #[error("mailbox unlocatable: {0}")]
    Fatal(String),
}

pub type Result<T> = result::Result<T, Error>;
