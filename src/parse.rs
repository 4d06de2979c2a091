//! 4.E Lazy Header Parser.
//!
//! Second-pass parse of mail file contents, ordered by inode (to minimise
//! seek cost on spinning media), with a header-cache fast path.

use std::{
    fs::File,
    io::BufReader,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{
    cancel::CancellationToken,
    email::HeaderParser,
    header_cache::{CachedHeader, HeaderCache},
    maildir::filename as maildir_filename,
    scan::{ScanEntry, ScanKind},
    sort, Result,
};

/// Whether parsing should proceed against a Maildir subdir's files (whose
/// cache key strips the `new/`/`cur/` prefix and the flag suffix) or an MH
/// folder's files (whose cache key is the bare numeric filename).
#[derive(Clone, Copy)]
pub enum ParseLayout {
    Maildir,
    Mh,
}

/// Key used to look a message up in the header cache (4.E.a).
pub fn cache_key(path: &Path, layout: ParseLayout) -> String {
    match layout {
        ParseLayout::Mh => path.to_string_lossy().into_owned(),
        ParseLayout::Maildir => {
            let s = path.to_string_lossy();
            // strip "new/" or "cur/"
            let stripped = s.splitn(2, '/').nth(1).unwrap_or(&s);
            maildir_filename::canonicalize(stripped).to_string()
        }
    }
}

/// Runs the lazy-parse pass over `entries`, whose `path` fields are
/// relative to `root`. Entries with `header_parsed == true` (duplicates a
/// prior reconciliation pass has already matched) are skipped but kept in
/// the list, per 4.E's duplicate-handling rule.
pub fn parse_entries(
    root: &Path,
    entries: &mut [ScanEntry],
    layout: ParseLayout,
    parser: &dyn HeaderParser,
    cache: &mut dyn HeaderCache,
    verify_cache: bool,
    cancel: &dyn CancellationToken,
) -> Result<()> {
    let mut sorted = false;

    for idx in 0..entries.len() {
        if entries[idx].header_parsed {
            continue;
        }

        if !sorted {
            // 4.E.1: sort the remainder of the list by inode ascending
            // before following it; prior entries (already parsed, or
            // skipped duplicates) are left where they are.
            entries[idx..].sort_by_key(|e| e.inode);
            sorted = true;
        }

        if cancel.is_cancelled() {
            return Err(crate::Error::Aborted);
        }

        parse_one(root, &mut entries[idx], layout, parser, cache, verify_cache)?;
    }

    Ok(())
}

fn parse_one(
    root: &Path,
    entry: &mut ScanEntry,
    layout: ParseLayout,
    parser: &dyn HeaderParser,
    cache: &mut dyn HeaderCache,
    verify_cache: bool,
) -> Result<()> {
    let key = cache_key(&entry.email.path, layout);
    let full_path = root.join(&entry.email.path);

    let metadata = full_path.metadata()?;
    let mtime: i64 = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    if verify_cache {
        if let Some(blob) = cache.fetch(&key)? {
            if blob.is_current_version() && mtime <= blob.tv_sec {
                log::debug!("header cache hit for {key}");
                restore_from_cache(entry, &blob, layout)?;
                entry.header_parsed = true;
                return Ok(());
            }
        }
    }

    log::debug!("parsing headers for {key}");
    let file = File::open(&full_path)?;
    let mut reader = BufReader::new(file);
    let parsed = parser.parse_headers(&mut reader)?;

    entry.email.content_offset = parsed.content_offset;
    entry.email.received = parsed.received;
    entry.email.content_length = metadata.len().saturating_sub(parsed.content_offset);
    entry.header_parsed = true;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let blob = CachedHeader::new(now, serialize_placeholder(entry));
    cache.store(&key, &blob)?;

    Ok(())
}

/// The engine never interprets the cache payload itself — it is opaque,
/// produced/consumed by the embedder's `Email` (de)serializer. This crate
/// stores a minimal placeholder so a `NullHeaderCache` or test double has
/// something non-empty to round-trip.
fn serialize_placeholder(entry: &ScanEntry) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(&entry.email.content_offset.to_le_bytes());
    buf.extend_from_slice(&entry.email.received.to_le_bytes());
    buf
}

fn restore_from_cache(
    entry: &mut ScanEntry,
    blob: &CachedHeader,
    layout: ParseLayout,
) -> Result<()> {
    if blob.payload.len() >= 16 {
        let mut offset_bytes = [0u8; 8];
        offset_bytes.copy_from_slice(&blob.payload[0..8]);
        entry.email.content_offset = u64::from_le_bytes(offset_bytes);

        let mut received_bytes = [0u8; 8];
        received_bytes.copy_from_slice(&blob.payload[8..16]);
        entry.email.received = i64::from_le_bytes(received_bytes);
    }

    // `old` and `path` come from the scan entry, not the cached blob
    // (4.E.b): the cache only fast-paths the content parse, never the
    // filename-derived state.
    if let ParseLayout::Maildir = layout {
        let basename = entry
            .email
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let flags = maildir_filename::decode(basename);
        entry.email.read = flags.read;
        entry.email.flagged = flags.flagged;
        entry.email.replied = flags.replied;
        entry.email.deleted = flags.deleted;
        entry.email.maildir_flags = flags.preserved;
    }

    Ok(())
}

/// 4.E.3: after parsing, MH folders under "natural" ordering sort the
/// scan list by path (numeric-like lexicographic is fine since names are
/// all digits — but we use the real numeric comparator for correctness
/// past 9 digits of drift).
pub fn sort_mh_natural(entries: &mut [ScanEntry]) {
    sort::sort_by(entries, |a, b| {
        let a = a.email.path.to_string_lossy();
        let b = b.email.path.to_string_lossy();
        sort::by_mh_number(&a, &b)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maildir_cache_key_strips_subdir_and_flags() {
        let key = cache_key(Path::new("cur/uniq:2,FS"), ParseLayout::Maildir);
        assert_eq!(key, "uniq");
    }

    #[test]
    fn mh_cache_key_is_the_filename() {
        let key = cache_key(Path::new("42"), ParseLayout::Mh);
        assert_eq!(key, "42");
    }
}
