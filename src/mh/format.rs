//! MH engine: open/check/sync/msg_open_new/msg_commit (4.F/4.G/4.H/4.I
//! specialised to the MH on-disk layout).

use std::{
    collections::HashMap,
    fs::{self, File},
    path::{Path, PathBuf},
};

use crate::{
    alloc,
    cancel::CancellationToken,
    config::{Config, SequenceNames, SortOrder},
    email::{Email, HeaderParser},
    flags::{self, SequenceTable},
    header_cache::HeaderCache,
    mailbox::{merge_flags, FlagSetter, FormatState, MessageCopier, NewMessageHandle, Status, TableUpdater},
    mh::{filename, sequences},
    parse::{self, ParseLayout},
    scan::{self, ScanKind},
    sort, Error, Result,
};

fn dir_mtime(path: &Path) -> i64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn apply_sequence_bits(email: &mut Email, bits: u8) {
    email.read = bits & flags::UNSEEN == 0;
    email.replied = bits & flags::REPLIED != 0;
    email.flagged = bits & flags::FLAGGED != 0;
}

fn sort_emails_natural(emails: &mut [Email]) {
    sort::sort_by(emails, |a, b| {
        sort::by_mh_number(&a.path.to_string_lossy(), &b.path.to_string_lossy())
    });
    for (i, e) in emails.iter_mut().enumerate() {
        e.index = i;
    }
}

/// 4.F MH path: `scan(root) -> lazy parse -> load .mh_sequences -> apply`.
pub fn open(
    root: &Path,
    config: &Config,
    parser: &dyn HeaderParser,
    cache: &mut dyn HeaderCache,
    cancel: &dyn CancellationToken,
) -> Result<(FormatState, Vec<Email>, i64)> {
    let mut scanned = Vec::new();
    scan::scan(root, ScanKind::Mh, &mut scanned, cancel)?;
    parse::parse_entries(
        root,
        &mut scanned,
        ParseLayout::Mh,
        parser,
        cache,
        config.header_cache_verify,
        cancel,
    )?;

    let seq_path = root.join(".mh_sequences");
    let mut table = SequenceTable::new();
    sequences::read(&seq_path, &mut table, &config.sequence_names)?;

    let mut emails: Vec<Email> = scanned.into_iter().map(|e| e.email).collect();
    for (i, email) in emails.iter_mut().enumerate() {
        email.index = i;
        let name = email.path.to_string_lossy().into_owned();
        if let Some(n) = filename::parse_live(&name) {
            apply_sequence_bits(email, table.get(n as usize));
        }
    }

    if matches!(config.sort, SortOrder::Natural) {
        sort_emails_natural(&mut emails);
    }

    let state = FormatState {
        mtime_cur: dir_mtime(&seq_path),
        umask: alloc::umask_for_dir(root),
    };
    let mtime = dir_mtime(root);
    Ok((state, emails, mtime))
}

/// 4.G MH path.
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
    let root_mtime = dir_mtime(root);
    let seq_path = root.join(".mh_sequences");
    let seq_mtime = dir_mtime(&seq_path);

    let dir_changed = root_mtime > *mailbox_mtime;
    let seq_changed = seq_mtime > state.mtime_cur;
    if !dir_changed && !seq_changed {
        return Ok(Status::Unchanged);
    }

    if !triggered_by_monitor {
        if dir_changed {
            *mailbox_mtime = root_mtime;
        }
        if seq_changed {
            state.mtime_cur = seq_mtime;
        }
    }

    let mut scanned = Vec::new();
    scan::scan(root, ScanKind::Mh, &mut scanned, cancel)?;
    parse::parse_entries(
        root,
        &mut scanned,
        ParseLayout::Mh,
        parser,
        cache,
        config.header_cache_verify,
        cancel,
    )?;

    let mut table = SequenceTable::new();
    sequences::read(&seq_path, &mut table, &config.sequence_names)?;
    for entry in scanned.iter_mut() {
        let name = entry.email.path.to_string_lossy().into_owned();
        if let Some(n) = filename::parse_live(&name) {
            apply_sequence_bits(&mut entry.email, table.get(n as usize));
        }
    }

    let mut map: HashMap<String, usize> = HashMap::new();
    for (i, entry) in scanned.iter().enumerate() {
        map.insert(entry.email.path.to_string_lossy().into_owned(), i);
    }

    let mut used = vec![false; scanned.len()];
    let mut occult = vec![false; emails.len()];
    let mut flags_changed = false;

    for i in 0..emails.len() {
        let key = emails[i].path.to_string_lossy().into_owned();
        if let Some(&idx) = map.get(&key) {
            used[idx] = true;
            let discovered = scanned[idx].email.clone();
            let email = &mut emails[i];
            if !email.changed && merge_flags(flag_setter, email, &discovered) {
                flags_changed = true;
            }
        } else {
            // MH has no subdirectory split: any message not found in a
            // full rescan has vanished from under us.
            occult[i] = true;
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

    if matches!(config.sort, SortOrder::Natural) {
        sort_emails_natural(emails);
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

/// 4.H MH path.
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
        if emails[i].deleted {
            if config.mh_purge {
                let abs = root.join(&emails[i].path);
                let _ = fs::remove_file(&abs);
                let key = emails[i].path.to_string_lossy().into_owned();
                cache.delete(&key)?;
                purged.push(i);
            } else {
                tombstone(root, &mut emails[i])?;
            }
            continue;
        }

        if emails[i].attach_del
            || emails[i].xlabel_changed
            || emails[i].refs_changed
            || emails[i].irt_changed
        {
            rewrite_message(root, &mut emails[i], copier)?;
        }
    }

    for &i in purged.iter().rev() {
        emails.remove(i);
    }
    for e in emails.iter_mut() {
        e.changed = false;
    }

    update_sequences(root, emails, config)?;

    for (i, e) in emails.iter_mut().enumerate() {
        e.index = i;
    }
    *mailbox_mtime = dir_mtime(root);
    state.mtime_cur = dir_mtime(&root.join(".mh_sequences"));
    Ok(())
}

/// Moves `<n>` to `,<n>`; idempotent if already tombstoned (4.H.1).
fn tombstone(root: &Path, email: &mut Email) -> Result<()> {
    let basename = email.path.to_string_lossy().into_owned();
    if filename::is_tombstone(&basename) {
        email.trash = true;
        return Ok(());
    }

    let n = filename::parse_live(&basename)
        .ok_or_else(|| Error::FormatError(email.path.clone(), "not a numeric MH filename".into()))?;
    let new_rel = PathBuf::from(filename::tombstone_name(n));
    let old_abs = root.join(&email.path);
    let new_abs = root.join(&new_rel);

    fs::rename(&old_abs, &new_abs).map_err(|err| Error::RenameFailed {
        from: old_abs,
        to: new_abs,
        source: err,
    })?;
    email.path = new_rel;
    email.trash = true;
    Ok(())
}

/// Rewrite-message (4.H.2), MH-specialised: commit the rewritten content
/// under a fresh number, then rename it back over the old numeric name so
/// the message keeps its id. If that rename fails, keep the new name and
/// continue rather than fail the whole sync.
fn rewrite_message(root: &Path, email: &mut Email, copier: &dyn MessageCopier) -> Result<()> {
    let old_abs = root.join(&email.path);
    let mut src = File::open(&old_abs)?;

    let (mut file, tmp_abs) = alloc::mh_stage(root)?;
    let len = copier.copy_message(&mut src, &mut file, email)?;
    file.sync_all()?;
    drop(file);

    let (_n, committed) = alloc::mh_commit(root, &tmp_abs)?;

    let old_basename = email.path.to_string_lossy().into_owned();
    match filename::parse_live(&old_basename) {
        Some(old_n) => {
            let old_rel = PathBuf::from(filename::live_name(old_n));
            let committed_abs = root.join(&committed);
            let old_abs2 = root.join(&old_rel);
            match fs::rename(&committed_abs, &old_abs2) {
                Ok(()) => email.path = old_rel,
                Err(_) => email.path = committed,
            }
        }
        None => {
            email.path = committed;
            let _ = fs::remove_file(&old_abs);
        }
    }

    email.content_length = len;
    email.attach_del = false;
    email.xlabel_changed = false;
    email.refs_changed = false;
    email.irt_changed = false;
    Ok(())
}

/// update-sequences: rebuild the table from current (non-deleted) emails
/// and rewrite `.mh_sequences`, preserving unknown sequences (§9 Open
/// Question: never garbage-collected).
fn update_sequences(root: &Path, emails: &[Email], config: &Config) -> Result<()> {
    let mut table = SequenceTable::new();
    for email in emails {
        if email.deleted {
            continue;
        }
        let name = email.path.to_string_lossy();
        if let Some(n) = filename::parse_live(&name) {
            let idx = n as usize;
            if !email.read {
                table.set_bit(idx, flags::UNSEEN, true);
            }
            if email.flagged {
                table.set_bit(idx, flags::FLAGGED, true);
            }
            if email.replied {
                table.set_bit(idx, flags::REPLIED, true);
            }
        }
    }
    sequences::write(&root.join(".mh_sequences"), &table, &config.sequence_names)
}

/// 4.I MH new message: stage under the mailbox root.
pub fn open_new(root: &Path) -> Result<NewMessageHandle> {
    let (file, tmp_path) = alloc::mh_stage(root)?;
    Ok(NewMessageHandle::Mh { file, tmp_path })
}

/// 4.I MH commit: allocate the next free message number and, if
/// requested, append it into the relevant `.mh_sequences` lines.
pub fn commit(
    root: &Path,
    handle: NewMessageHandle,
    email: &mut Email,
    update_sequences_flag: bool,
    names: &SequenceNames,
) -> Result<()> {
    let NewMessageHandle::Mh { tmp_path, .. } = handle else {
        return Err(Error::Fatal("msg_commit: wrong handle kind for mh".into()));
    };

    let (n, rel) = alloc::mh_commit(root, &tmp_path)?;
    email.path = rel;

    if update_sequences_flag {
        sequences::append_one(
            &root.join(".mh_sequences"),
            n,
            !email.read,
            email.flagged,
            email.replied,
            names,
        )?;
    }

    Ok(())
}
