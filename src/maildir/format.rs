//! Maildir engine: open/check/sync/msg_open_new/msg_commit (4.F/4.G/4.H/4.I
//! specialised to the Maildir on-disk layout).

use std::{
    collections::HashMap,
    fs::{self, File},
    path::{Path, PathBuf},
};

use crate::{
    alloc::{self, MaildirUniqueName},
    cancel::CancellationToken,
    config::Config,
    email::{Email, HeaderParser},
    header_cache::HeaderCache,
    mailbox::{merge_flags, FlagSetter, FormatState, MessageCopier, NewMessageHandle, Status, TableUpdater},
    maildir::filename as maildir_filename,
    parse::{self, ParseLayout},
    scan::{self, ScanKind},
    Error, Result,
};

fn dir_mtime(path: &Path) -> i64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn canonical_key(path: &Path) -> String {
    let basename = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    maildir_filename::canonicalize(basename).to_string()
}

fn subdir_of(path: &Path) -> &'static str {
    if path.starts_with("cur") {
        "cur"
    } else {
        "new"
    }
}

/// 4.F: `scan(new) ++ scan(cur) -> lazy parse -> install`.
pub fn open(
    root: &Path,
    config: &Config,
    parser: &dyn HeaderParser,
    cache: &mut dyn HeaderCache,
    cancel: &dyn CancellationToken,
) -> Result<(FormatState, Vec<Email>, i64)> {
    let mut scanned = Vec::new();
    scan::scan(root, ScanKind::MaildirSubdir("new"), &mut scanned, cancel)?;
    scan::scan(root, ScanKind::MaildirSubdir("cur"), &mut scanned, cancel)?;

    if config.mark_old {
        for entry in scanned.iter_mut() {
            if subdir_of(&entry.email.path) == "new" {
                entry.email.old = true;
            }
        }
    }

    parse::parse_entries(
        root,
        &mut scanned,
        ParseLayout::Maildir,
        parser,
        cache,
        config.header_cache_verify,
        cancel,
    )?;

    let mut emails: Vec<Email> = scanned.into_iter().map(|e| e.email).collect();
    for (i, e) in emails.iter_mut().enumerate() {
        e.index = i;
    }

    let state = FormatState {
        mtime_cur: dir_mtime(&root.join("cur")),
        umask: alloc::umask_for_dir(root),
    };
    let mtime = dir_mtime(&root.join("new"));

    Ok((state, emails, mtime))
}

/// 4.G Maildir path.
#[allow(clippy::too_many_arguments)]
pub fn check(
    root: &Path,
    state: &mut FormatState,
    mailbox_mtime: &mut i64,
    emails: &mut Vec<Email>,
    config: &Config,
    parser: &dyn HeaderParser,
    cache: &mut dyn HeaderCache,
    cancel: &dyn CancellationToken,
    flag_setter: &mut dyn FlagSetter,
    table_updater: &mut dyn TableUpdater,
    triggered_by_monitor: bool,
) -> Result<Status> {
    let new_mtime = dir_mtime(&root.join("new"));
    let cur_mtime = dir_mtime(&root.join("cur"));

    let new_changed = new_mtime > *mailbox_mtime;
    let cur_changed = cur_mtime > state.mtime_cur;
    if !new_changed && !cur_changed {
        return Ok(Status::Unchanged);
    }

    if !triggered_by_monitor {
        if new_changed {
            *mailbox_mtime = new_mtime;
        }
        if cur_changed {
            state.mtime_cur = cur_mtime;
        }
    }

    let mut scanned = Vec::new();
    let mut scanned_subdirs: Vec<&'static str> = Vec::new();
    if new_changed {
        scan::scan(root, ScanKind::MaildirSubdir("new"), &mut scanned, cancel)?;
        scanned_subdirs.push("new");
    }
    if cur_changed {
        scan::scan(root, ScanKind::MaildirSubdir("cur"), &mut scanned, cancel)?;
        scanned_subdirs.push("cur");
    }
    parse::parse_entries(
        root,
        &mut scanned,
        ParseLayout::Maildir,
        parser,
        cache,
        config.header_cache_verify,
        cancel,
    )?;

    let mut map: HashMap<String, usize> = HashMap::new();
    for (i, entry) in scanned.iter().enumerate() {
        map.insert(canonical_key(&entry.email.path), i);
    }

    let mut used = vec![false; scanned.len()];
    let mut occult = vec![false; emails.len()];
    let mut flags_changed = false;

    for i in 0..emails.len() {
        let key = canonical_key(&emails[i].path);
        if let Some(&idx) = map.get(&key) {
            used[idx] = true;
            let discovered = scanned[idx].email.clone();
            let email = &mut emails[i];
            if discovered.path != email.path {
                email.path = discovered.path.clone();
            }
            if !email.changed && merge_flags(flag_setter, email, &discovered) {
                flags_changed = true;
            }
            if email.deleted == email.trash {
                email.deleted = discovered.trash;
            }
            email.trash = discovered.trash;
        } else {
            let subdir = subdir_of(&emails[i].path);
            if scanned_subdirs.contains(&subdir) {
                occult[i] = true;
            }
        }
    }

    let has_occult = occult.iter().any(|&o| o);
    if has_occult {
        let mut idx = 0;
        emails.retain(|_| {
            let keep = !occult[idx];
            idx += 1;
            keep
        });
        for (i, e) in emails.iter_mut().enumerate() {
            e.index = i;
        }
        table_updater.mx_update_tables(emails);
        table_updater.clear_threads();
    }

    let mut appended_any = false;
    for (i, entry) in scanned.into_iter().enumerate() {
        if used[i] {
            continue;
        }
        let mut email = entry.email;
        email.index = emails.len();
        emails.push(email);
        appended_any = true;
    }

    let mut status = Status::Unchanged;
    if has_occult {
        status = status.merge(Status::Reopened);
    }
    if appended_any {
        status = status.merge(Status::NewMail);
    }
    if flags_changed {
        status = status.merge(Status::FlagsChanged);
    }
    Ok(status)
}

/// 4.H Maildir path.
pub fn sync(
    root: &Path,
    state: &mut FormatState,
    mailbox_mtime: &mut i64,
    emails: &mut Vec<Email>,
    config: &Config,
    cache: &mut dyn HeaderCache,
    copier: &dyn MessageCopier,
) -> Result<()> {
    let mut purged = Vec::new();

    for i in 0..emails.len() {
        if emails[i].deleted && !config.maildir_trash {
            let abs = root.join(&emails[i].path);
            let _ = fs::remove_file(&abs);
            let key = canonical_key(&emails[i].path);
            cache.delete(&key)?;
            purged.push(i);
            continue;
        }

        if emails[i].attach_del || emails[i].xlabel_changed || emails[i].refs_changed || emails[i].irt_changed {
            rewrite_message(root, &mut emails[i], copier)?;
        }

        apply_flag_rename(root, &mut emails[i], config)?;
    }

    for &i in purged.iter().rev() {
        emails.remove(i);
    }
    for (i, e) in emails.iter_mut().enumerate() {
        e.index = i;
        e.changed = false;
    }

    *mailbox_mtime = dir_mtime(&root.join("new"));
    state.mtime_cur = dir_mtime(&root.join("cur"));
    Ok(())
}

fn apply_flag_rename(root: &Path, email: &mut Email, _config: &Config) -> Result<()> {
    let basename = email
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let uniq = maildir_filename::canonicalize(basename).to_string();
    let suffix = maildir_filename::encode(
        email.flagged,
        email.replied,
        email.read,
        email.deleted,
        email.old,
        email.maildir_flags.as_deref(),
    );
    let subdir = if email.read || email.old { "cur" } else { "new" };
    let new_rel = PathBuf::from(subdir).join(format!("{uniq}{suffix}"));

    if new_rel == email.path {
        return Ok(());
    }

    let old_abs = root.join(&email.path);
    let new_abs = root.join(&new_rel);
    email.trash = email.deleted;

    fs::rename(&old_abs, &new_abs).map_err(|err| Error::RenameFailed {
        from: old_abs,
        to: new_abs,
        source: err,
    })?;
    email.path = new_rel;
    Ok(())
}

fn rewrite_message(root: &Path, email: &mut Email, copier: &dyn MessageCopier) -> Result<()> {
    let old_abs = root.join(&email.path);
    let mut src = File::open(&old_abs)?;

    let subdir = if email.read || email.old { "cur" } else { "new" };
    let suffix = maildir_filename::encode(
        email.flagged,
        email.replied,
        email.read,
        false,
        email.old,
        email.maildir_flags.as_deref(),
    );
    let mut name = MaildirUniqueName::generate();
    let (mut file, tmp_rel) = alloc::maildir_stage(root, &name, &suffix)?;
    let len = copier.copy_message(&mut src, &mut file, email)?;
    file.sync_all()?;
    drop(file);

    let committed = alloc::maildir_commit(root, &tmp_rel, subdir, &mut name, &suffix)?;
    fs::remove_file(&old_abs)?;

    email.path = committed;
    email.content_length = len;
    email.attach_del = false;
    email.xlabel_changed = false;
    email.refs_changed = false;
    email.irt_changed = false;
    Ok(())
}

/// 4.I Maildir new message: stage under `tmp/`.
pub fn open_new(root: &Path, email: &Email) -> Result<NewMessageHandle> {
    let subdir = if email.read || email.old { "cur" } else { "new" };
    let suffix = maildir_filename::encode(
        email.flagged,
        email.replied,
        email.read,
        false,
        email.old,
        email.maildir_flags.as_deref(),
    );
    let name = MaildirUniqueName::generate();
    let (file, tmp_rel) = alloc::maildir_stage(root, &name, &suffix)?;
    Ok(NewMessageHandle::Maildir {
        file,
        tmp_rel,
        name,
        subdir,
        suffix,
    })
}

/// 4.I Maildir commit: rename from `tmp/` to the target subdir, applying
/// `email.received` via `utimbuf` if the caller supplied one.
pub fn commit(root: &Path, handle: NewMessageHandle, email: &mut Email) -> Result<()> {
    let NewMessageHandle::Maildir {
        tmp_rel,
        mut name,
        subdir,
        suffix,
        ..
    } = handle
    else {
        return Err(Error::Fatal("msg_commit: wrong handle kind for maildir".into()));
    };

    let committed = alloc::maildir_commit(root, &tmp_rel, subdir, &mut name, &suffix)?;

    if email.received != 0 {
        let abs = root.join(&committed);
        if let Ok(file) = File::open(&abs) {
            let when = std::time::UNIX_EPOCH + std::time::Duration::from_secs(email.received.max(0) as u64);
            let _ = file.set_modified(when);
        }
    }

    email.path = committed;
    Ok(())
}
