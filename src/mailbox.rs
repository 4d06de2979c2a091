//! §3 Mailbox record, plus the collaborator seams and status codes shared
//! by 4.F (open), 4.G (check) and 4.H (sync).

use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
};

use crate::{
    cancel::CancellationToken,
    config::Config,
    email::{Email, HeaderParser},
    header_cache::HeaderCache,
    maildir, mh, Result,
};

/// Per-format private state (§3): identical shape for Maildir and MH —
/// only the watched node differs (`cur/`'s mtime vs `.mh_sequences`'s).
#[derive(Clone, Copy, Debug, Default)]
pub struct FormatState {
    pub mtime_cur: i64,
    pub umask: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MailboxKind {
    Maildir,
    Mh,
}

/// Result of [`Mailbox::check`] and the status [`Mailbox::sync`] returns
/// when it declines to run because a prerequisite check detected change.
/// Ordered by the precedence rule in §4.G.8.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Status {
    Unchanged,
    FlagsChanged,
    NewMail,
    Reopened,
}

impl Status {
    pub fn merge(self, other: Status) -> Status {
        self.max(other)
    }
}

/// External flag-setter collaborator used by merge-flags (4.G-merge). The
/// engine calls one method per bit that differs between the on-disk and
/// in-memory state; a real embedder updates tallies/sidebar state here.
pub trait FlagSetter {
    fn set_flagged(&mut self, email: &mut Email, value: bool);
    fn set_replied(&mut self, email: &mut Email, value: bool);
    fn set_read(&mut self, email: &mut Email, value: bool);
    fn set_old(&mut self, email: &mut Email, value: bool);
}

/// The default collaborator: flips the bit on the `Email` itself and
/// nothing else. Suffices for embedders with no external tally/sidebar to
/// keep in sync.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainFlagSetter;

impl FlagSetter for PlainFlagSetter {
    fn set_flagged(&mut self, email: &mut Email, value: bool) {
        email.flagged = value;
    }
    fn set_replied(&mut self, email: &mut Email, value: bool) {
        email.replied = value;
    }
    fn set_read(&mut self, email: &mut Email, value: bool) {
        email.read = value;
    }
    fn set_old(&mut self, email: &mut Email, value: bool) {
        email.old = value;
    }
}

/// Calls the flag setter for each bit that differs between `old` and
/// `new`, returning whether anything fired (4.G-merge).
pub fn merge_flags(setter: &mut dyn FlagSetter, target: &mut Email, discovered: &Email) -> bool {
    let mut changed = false;
    if target.flagged != discovered.flagged {
        setter.set_flagged(target, discovered.flagged);
        changed = true;
    }
    if target.replied != discovered.replied {
        setter.set_replied(target, discovered.replied);
        changed = true;
    }
    if target.read != discovered.read {
        setter.set_read(target, discovered.read);
        changed = true;
    }
    if target.old != discovered.old {
        setter.set_old(target, discovered.old);
        changed = true;
    }
    changed
}

/// `mx_update_tables`/`clear_threads` collaborators invoked by
/// update-tables (4.G-tables) after an occult message forces a compaction.
pub trait TableUpdater {
    fn mx_update_tables(&mut self, emails: &[Email]);
    fn clear_threads(&mut self);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullTableUpdater;

impl TableUpdater for NullTableUpdater {
    fn mx_update_tables(&mut self, _emails: &[Email]) {}
    fn clear_threads(&mut self) {}
}

/// The `copy_message` collaborator used by rewrite-message (4.H.2): copies
/// `src` to `dst`, applying whatever content transformation the rewrite
/// reason calls for (attachment deletion, label/reference change), and
/// returns the new content length.
pub trait MessageCopier {
    fn copy_message(&self, src: &mut dyn Read, dst: &mut dyn Write, email: &Email) -> Result<u64>;
}

/// A copier that performs no transformation — a byte-for-byte copy. Useful
/// when the only rewrite reason is a references/label change that the
/// embedder's header layer has already applied in place before sync.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityCopier;

impl MessageCopier for IdentityCopier {
    fn copy_message(&self, src: &mut dyn Read, dst: &mut dyn Write, _email: &Email) -> Result<u64> {
        let n = std::io::copy(src, dst)?;
        Ok(n)
    }
}

/// §3 Mailbox record.
pub struct Mailbox {
    pub path: PathBuf,
    pub realpath: PathBuf,
    pub kind: MailboxKind,
    pub mtime: i64,
    pub state: FormatState,
    pub emails: Vec<Email>,

    pub last_visited: i64,
    pub msg_count: usize,
    pub msg_unread: usize,
    pub msg_flagged: usize,
    pub has_new: bool,
    pub notified: bool,
}

impl Mailbox {
    /// 4.F Mailbox Open.
    pub fn open(
        path: impl Into<PathBuf>,
        kind: MailboxKind,
        config: &Config,
        parser: &dyn HeaderParser,
        cache: &mut dyn HeaderCache,
        cancel: &dyn CancellationToken,
    ) -> Result<Self> {
        let path = path.into();
        log::info!("opening {kind:?} mailbox at {}", path.display());
        let realpath = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());

        let (state, emails, mtime) = match kind {
            MailboxKind::Maildir => maildir::format::open(&path, config, parser, cache, cancel)?,
            MailboxKind::Mh => mh::format::open(&path, config, parser, cache, cancel)?,
        };

        let mut mailbox = Self {
            path,
            realpath,
            kind,
            mtime,
            state,
            emails,
            last_visited: 0,
            msg_count: 0,
            msg_unread: 0,
            msg_flagged: 0,
            has_new: false,
            notified: false,
        };
        mailbox.recompute_tallies();
        Ok(mailbox)
    }

    fn recompute_tallies(&mut self) {
        self.msg_count = self.emails.len();
        self.msg_unread = self.emails.iter().filter(|e| !e.read).count();
        self.msg_flagged = self.emails.iter().filter(|e| e.flagged).count();
    }

    /// 4.G Incremental Check.
    #[allow(clippy::too_many_arguments)]
    pub fn check(
        &mut self,
        config: &Config,
        parser: &dyn HeaderParser,
        cache: &mut dyn HeaderCache,
        cancel: &dyn CancellationToken,
        flag_setter: &mut dyn FlagSetter,
        table_updater: &mut dyn TableUpdater,
        triggered_by_monitor: bool,
    ) -> Result<Status> {
        if !config.check_new {
            return Ok(Status::Unchanged);
        }

        let status = match self.kind {
            MailboxKind::Maildir => maildir::format::check(
                &self.path,
                &mut self.state,
                &mut self.mtime,
                &mut self.emails,
                config,
                parser,
                cache,
                cancel,
                flag_setter,
                table_updater,
                triggered_by_monitor,
            )?,
            MailboxKind::Mh => mh::format::check(
                &self.path,
                &mut self.state,
                &mut self.mtime,
                &mut self.emails,
                config,
                parser,
                cache,
                cancel,
                flag_setter,
                table_updater,
                triggered_by_monitor,
            )?,
        };

        self.recompute_tallies();
        if status != Status::Unchanged {
            log::debug!("check on {} returned {status:?}", self.path.display());
        }
        if status == Status::NewMail {
            self.has_new = true;
        }
        Ok(status)
    }

    /// 4.H Sync / Commit. Runs a prerequisite [`Mailbox::check`] first;
    /// if it reports anything other than [`Status::Unchanged`], that
    /// status is returned immediately and no per-message work happens.
    #[allow(clippy::too_many_arguments)]
    pub fn sync(
        &mut self,
        config: &Config,
        parser: &dyn HeaderParser,
        cache: &mut dyn HeaderCache,
        cancel: &dyn CancellationToken,
        flag_setter: &mut dyn FlagSetter,
        table_updater: &mut dyn TableUpdater,
        copier: &dyn MessageCopier,
    ) -> Result<Status> {
        let prereq = self.check(config, parser, cache, cancel, flag_setter, table_updater, false)?;
        if prereq != Status::Unchanged {
            log::info!(
                "sync on {} deferred: check reports {prereq:?}",
                self.path.display()
            );
            return Ok(prereq);
        }

        log::info!("syncing {}", self.path.display());
        match self.kind {
            MailboxKind::Maildir => {
                maildir::format::sync(&self.path, &mut self.state, &mut self.mtime, &mut self.emails, config, cache, copier)?
            }
            MailboxKind::Mh => {
                mh::format::sync(&self.path, &mut self.state, &mut self.mtime, &mut self.emails, config, cache, copier)?
            }
        }

        self.recompute_tallies();
        Ok(Status::Unchanged)
    }

    /// 4.I `msg_open_new`: stage a new message's content under the
    /// mailbox's temp area. The returned handle's `file` is open for
    /// writing; hand it to the caller's message serializer, then pass the
    /// handle to [`Mailbox::msg_commit`].
    pub fn msg_open_new(&self, email: &Email) -> Result<NewMessageHandle> {
        match self.kind {
            MailboxKind::Maildir => maildir::format::open_new(&self.path, email),
            MailboxKind::Mh => mh::format::open_new(&self.path),
        }
    }

    /// 4.I `msg_commit`: moves a staged message from its temp location
    /// into the mailbox proper, retrying on filename collision, and sets
    /// `email.path` to the committed relative path.
    pub fn msg_commit(
        &mut self,
        handle: NewMessageHandle,
        email: &mut Email,
        config: &Config,
        update_sequences: bool,
    ) -> Result<()> {
        match self.kind {
            MailboxKind::Maildir => maildir::format::commit(&self.path, handle, email),
            MailboxKind::Mh => mh::format::commit(
                &self.path,
                handle,
                email,
                update_sequences,
                &config.sequence_names,
            ),
        }?;
        self.recompute_tallies();
        Ok(())
    }
}

/// A staged, not-yet-committed new message (4.I).
pub enum NewMessageHandle {
    Maildir {
        file: std::fs::File,
        tmp_rel: PathBuf,
        name: crate::alloc::MaildirUniqueName,
        subdir: &'static str,
        suffix: String,
    },
    Mh {
        file: std::fs::File,
        tmp_path: PathBuf,
    },
}

impl NewMessageHandle {
    pub fn file_mut(&mut self) -> &mut std::fs::File {
        match self {
            NewMessageHandle::Maildir { file, .. } => file,
            NewMessageHandle::Mh { file, .. } => file,
        }
    }
}

pub(crate) fn path_from_root(root: &Path, rel: &Path) -> PathBuf {
    root.join(rel)
}
