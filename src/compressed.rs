//! 4.J Compressed Wrapper — stages an on-disk compressed container
//! through a plaintext working copy, delegating every message operation
//! to the underlying format's engine.

use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use advisory_lock::{AdvisoryFileLock, FileLockMode};

use crate::{
    alloc,
    cancel::CancellationToken,
    config::Config,
    email::HeaderParser,
    header_cache::HeaderCache,
    mailbox::{FlagSetter, Mailbox, MailboxKind, MessageCopier, Status, TableUpdater},
    Error, Result,
};

/// The out-of-scope hook-registry collaborator (§1): runs a shell command
/// and reports its exit status.
pub trait ShellRunner {
    fn run(&self, cmd: &str) -> Result<i32>;
}

/// A `ShellRunner` over `std::process::Command`, sufficient to make this
/// crate self-contained and testable without the workspace's async
/// `process-lib` (see DESIGN.md for why that dependency is not pulled
/// in here).
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemShellRunner;

impl ShellRunner for SystemShellRunner {
    fn run(&self, cmd: &str) -> Result<i32> {
        log::debug!("running compressed-mailbox command: {cmd}");
        let status = std::process::Command::new("sh").arg("-c").arg(cmd).status()?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// The three opaque command templates, each with `%f` (compressed
/// realpath) and `%t` (plaintext working path) placeholders.
#[derive(Clone, Debug, Default)]
pub struct CommandTemplates {
    pub open: String,
    pub close: Option<String>,
    pub append: Option<String>,
}

impl CommandTemplates {
    /// §6: "open must be present; append requires either append or close;
    /// sync requires close." A template must reference both placeholders.
    pub fn validate(&self) -> Result<()> {
        if self.open.is_empty() {
            return Err(Error::MissingTemplate("open"));
        }
        check_placeholders("open", &self.open)?;
        if let Some(close) = &self.close {
            check_placeholders("close", close)?;
        }
        if let Some(append) = &self.append {
            check_placeholders("append", append)?;
        }
        Ok(())
    }

    fn require_close(&self) -> Result<&str> {
        self.close.as_deref().ok_or(Error::MissingTemplate("close"))
    }

    fn require_append_or_close(&self) -> Result<&str> {
        self.append
            .as_deref()
            .or(self.close.as_deref())
            .ok_or(Error::MissingTemplate("append"))
    }
}

fn check_placeholders(name: &'static str, template: &str) -> Result<()> {
    if template.contains("%f") && template.contains("%t") {
        Ok(())
    } else {
        Err(Error::InvalidTemplate(format!("{name}: {template}")))
    }
}

/// Single-quote-escapes `path` for interpolation into a shell command
/// (§6: "single-quote-escaped").
fn shell_escape(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('\'');
    for c in raw.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

fn substitute(template: &str, realpath: &Path, plainpath: &Path) -> String {
    template
        .replace("%f", &shell_escape(realpath))
        .replace("%t", &shell_escape(plainpath))
}

fn fresh_plaintext_path(realpath: &Path) -> Result<PathBuf> {
    let dir = std::env::temp_dir();
    let (file, path) = alloc::new_temp_in(&dir, "mailbox-compressed").map_err(Error::Io)?;
    drop(file);
    let _ = realpath;
    Ok(path)
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// A compressed-mailbox session: `realpath` is the on-disk container,
/// `plainpath` the private decompressed working copy, `inner` the
/// delegate engine (Maildir or MH) operating on `plainpath`.
pub struct CompressedMailbox {
    pub realpath: PathBuf,
    pub plainpath: PathBuf,
    pub inner: Mailbox,
    templates: CommandTemplates,
    lock_handle: Option<File>,
    stored_size: u64,
    readonly: bool,
}

impl CompressedMailbox {
    /// 4.J Open: stash realpath, assign a fresh plaintext temp, lock the
    /// realpath (exclusive for append, shared for read), run `open`,
    /// probe the plaintext's real format, delegate `mbox_open`.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        realpath: impl Into<PathBuf>,
        templates: CommandTemplates,
        shell: &dyn ShellRunner,
        probe_kind: impl Fn(&Path) -> MailboxKind,
        config: &Config,
        parser: &dyn HeaderParser,
        cache: &mut dyn HeaderCache,
        cancel: &dyn CancellationToken,
        for_append: bool,
    ) -> Result<Self> {
        templates.validate()?;
        let realpath = realpath.into();
        let plainpath = fresh_plaintext_path(&realpath)?;

        let lock_handle = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&realpath)
            .map_err(Error::Io)?;

        let mode = if for_append {
            FileLockMode::Exclusive
        } else {
            FileLockMode::Shared
        };
        // §4.J "Locking policy": a failed exclusive lock-request
        // downgrades the mailbox to readonly rather than failing open.
        let readonly = lock_handle.try_lock(mode).is_err();

        let code = shell.run(&substitute(&templates.open, &realpath, &plainpath))?;
        if code != 0 {
            return Err(Error::ShellFailed {
                cmd: templates.open.clone(),
                status: code,
            });
        }

        let kind = probe_kind(&plainpath);
        let inner = Mailbox::open(&plainpath, kind, config, parser, cache, cancel)?;
        let stored_size = file_size(&realpath);

        Ok(Self {
            realpath,
            plainpath,
            inner,
            templates,
            lock_handle: Some(lock_handle),
            stored_size,
            readonly,
        })
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// 4.J Check: if the compressed file's size hasn't moved, delegate
    /// straight to the inner engine's check. Otherwise re-decompress
    /// first so the inner engine sees current content.
    #[allow(clippy::too_many_arguments)]
    pub fn check(
        &mut self,
        config: &Config,
        parser: &dyn HeaderParser,
        cache: &mut dyn HeaderCache,
        cancel: &dyn CancellationToken,
        flag_setter: &mut dyn FlagSetter,
        table_updater: &mut dyn TableUpdater,
        shell: &dyn ShellRunner,
        triggered_by_monitor: bool,
    ) -> Result<Status> {
        let current_size = file_size(&self.realpath);
        if current_size != self.stored_size {
            let code = shell.run(&substitute(&self.templates.open, &self.realpath, &self.plainpath))?;
            if code != 0 {
                return Err(Error::ShellFailed {
                    cmd: self.templates.open.clone(),
                    status: code,
                });
            }
            self.stored_size = current_size;
        }

        self.inner.check(
            config,
            parser,
            cache,
            cancel,
            flag_setter,
            table_updater,
            triggered_by_monitor,
        )
    }

    /// 4.J Sync: lock exclusive, check, delegate sync, recompress via
    /// `close`, refresh stored size.
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
        shell: &dyn ShellRunner,
    ) -> Result<Status> {
        if self.readonly {
            return Err(Error::Fatal(
                "compressed mailbox is read-only: exclusive lock was not obtained".into(),
            ));
        }

        let prereq = self.check(
            config,
            parser,
            cache,
            cancel,
            flag_setter,
            table_updater,
            shell,
            false,
        )?;
        if prereq != Status::Unchanged {
            return Ok(prereq);
        }

        self.inner
            .sync(config, parser, cache, cancel, flag_setter, table_updater, copier)?;

        let close_tpl = self.templates.require_close()?.to_string();
        let code = shell.run(&substitute(&close_tpl, &self.realpath, &self.plainpath))?;
        if code != 0 {
            return Err(Error::ShellFailed {
                cmd: close_tpl,
                status: code,
            });
        }
        self.stored_size = file_size(&self.realpath);

        Ok(Status::Unchanged)
    }

    /// 4.J Close: if appending, run `append` (or `close` as a fallback)
    /// against the realpath; a non-appending writeable mailbox has
    /// already been recompressed by `sync`. Always removes the plaintext
    /// working copy; if the delegate mailbox ended up empty and
    /// `save_empty` is off, also removes the realpath (mirrors the
    /// "don't leave an empty compressed mailbox behind" behaviour common
    /// to compressed-mbox wrappers; §9 leaves the exact condition
    /// underspecified after distillation, this is the reading adopted —
    /// see DESIGN.md).
    pub fn close(&mut self, append: bool, save_empty: bool, shell: &dyn ShellRunner) -> Result<()> {
        if append && self.realpath.exists() {
            let tpl = self.templates.require_append_or_close()?.to_string();
            let code = shell.run(&substitute(&tpl, &self.realpath, &self.plainpath))?;
            if code != 0 {
                return Err(Error::ShellFailed { cmd: tpl, status: code });
            }
        }

        let was_empty = self.inner.emails.is_empty();
        let _ = fs::remove_file(&self.plainpath);

        if was_empty && !save_empty {
            let _ = fs::remove_file(&self.realpath);
        }

        // Dropping the handle releases the advisory lock.
        self.lock_handle.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_require_placeholders() {
        let templates = CommandTemplates {
            open: "gzip -cd '%f' > '%t'".into(),
            close: Some("gzip -c '%t' > '%f'".into()),
            append: None,
        };
        assert!(templates.validate().is_ok());

        let bad = CommandTemplates {
            open: "gzip -cd > '%t'".into(),
            close: None,
            append: None,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn escape_handles_embedded_quotes() {
        let escaped = shell_escape(Path::new("it's.mbox"));
        assert_eq!(escaped, "'it'\\''s.mbox'");
    }
}
