//! A local-mailbox storage engine for the Maildir and MH on-disk formats,
//! plus a transparent compressed-mailbox wrapper that stages an on-disk
//! compressed container through a plaintext working copy.
//!
//! This crate owns directory scanning and incremental reconciliation,
//! crash-safe flag and message persistence, and the compressed-container
//! wrapper. RFC 822/MIME parsing, thread sorting, IMAP/POP/NNTP/notmuch
//! backends, configuration parsing and the hook registry are external
//! collaborators the embedder supplies (see [`email::HeaderParser`],
//! [`header_cache::HeaderCache`], [`compressed::ShellRunner`]).
//!
//! The three load-bearing subsystems, by module:
//!
//! - scan ([`scan`]) and incremental reconciliation ([`mailbox::Mailbox::check`]);
//! - flag/message persistence ([`maildir`], [`mh`], [`alloc`]);
//! - the compressed wrapper ([`compressed`]).

pub mod alloc;
pub mod cancel;
pub mod compressed;
pub mod config;
pub mod email;
mod error;
pub mod flags;
pub mod header_cache;
pub mod mailbox;
pub mod maildir;
pub mod mh;
pub mod parse;
pub mod path;
pub mod scan;
pub mod sort;

#[doc(inline)]
pub use crate::error::{Error, Result};
#[doc(inline)]
pub use crate::mailbox::{Mailbox, MailboxKind, Status};
