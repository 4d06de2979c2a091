//! 4.D Directory Scanner.
//!
//! Enumerates one subdirectory (Maildir's `new`/`cur`, or an MH folder's
//! root) and builds an ordered list of candidate entries carrying an inode
//! number, so 4.E can later re-order the list for sequential-ish I/O on
//! spinning media.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use crate::{cancel::CancellationToken, email::Email, maildir::filename as maildir_filename};

/// One discovered candidate message, not yet content-parsed.
pub struct ScanEntry {
    pub email: Email,
    /// Inode of the underlying file, used to order the lazy-parse pass
    /// (4.E.1). Always 0 on platforms without `MetadataExt`.
    pub inode: u64,
    pub header_parsed: bool,
}

impl ScanEntry {
    fn new(path: PathBuf, inode: u64) -> Self {
        Self {
            email: Email::new(path),
            inode,
            header_parsed: false,
        }
    }
}

/// Which directory layout is being scanned, so the scanner knows how to
/// filter names and how to compute the `path` stored on each [`ScanEntry`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanKind {
    /// Maildir `new/` or `cur/`; `subdir` is joined onto the entry name to
    /// form `path`, and the filename suffix is decoded into initial flags.
    MaildirSubdir(&'static str),
    /// MH folder root; only all-digit names are considered candidates.
    Mh,
}

/// Result of a scan: either the full ordered list, or a signal that a
/// cooperative cancellation token fired partway through. On abort the
/// caller owns (and must free) whatever was appended to `out` so far.
pub enum ScanResult {
    Done,
    Aborted,
}

/// Enumerates `<root>/<subdir>` (Maildir) or `<root>` (MH), appending one
/// [`ScanEntry`] per candidate file to the tail of `out`, preserving
/// directory-iteration order.
pub fn scan(
    root: &Path,
    kind: ScanKind,
    out: &mut Vec<ScanEntry>,
    cancel: &dyn CancellationToken,
) -> io::Result<ScanResult> {
    let dir_path = match kind {
        ScanKind::MaildirSubdir(subdir) => root.join(subdir),
        ScanKind::Mh => root.to_path_buf(),
    };

    let read_dir = match fs::read_dir(&dir_path) {
        Ok(rd) => rd,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(ScanResult::Done),
        Err(err) => return Err(err),
    };

    log::debug!("scanning {}", dir_path.display());

    for dir_entry in read_dir {
        if cancel.is_cancelled() {
            return Ok(ScanResult::Aborted);
        }

        let dir_entry = match dir_entry {
            Ok(e) => e,
            Err(err) => {
                log::warn!("skipping unreadable entry in {}: {err}", dir_path.display());
                continue;
            }
        };

        let name = dir_entry.file_name();
        let name = match name.to_str() {
            Some(n) => n,
            None => continue,
        };

        let is_candidate = match kind {
            ScanKind::MaildirSubdir(_) => !name.starts_with('.'),
            ScanKind::Mh => is_mh_message_name(name),
        };
        if !is_candidate {
            continue;
        }

        let metadata = match dir_entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                log::warn!("skipping {}: {err}", dir_entry.path().display());
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        #[cfg(unix)]
        let inode = metadata.ino();
        #[cfg(not(unix))]
        let inode = 0u64;

        let rel_path = match kind {
            ScanKind::MaildirSubdir(subdir) => Path::new(subdir).join(name),
            ScanKind::Mh => PathBuf::from(name),
        };

        let mut entry = ScanEntry::new(rel_path, inode);

        if let ScanKind::MaildirSubdir(subdir) = kind {
            let flags = maildir_filename::decode(name);
            entry.email.read = flags.read;
            entry.email.flagged = flags.flagged;
            entry.email.replied = flags.replied;
            entry.email.deleted = flags.deleted;
            entry.email.maildir_flags = flags.preserved;
            entry.email.old = subdir == "cur" && !flags.read;
        }

        out.push(entry);
    }

    Ok(ScanResult::Done)
}

/// MH message files are named by strictly positive decimal integers; a
/// leading `,` marks a soft-deleted tombstone, which is not a live
/// candidate for the scanner (sync handles tombstones separately).
fn is_mh_message_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::NeverCancelled;
    use std::fs::{self as stdfs, File};

    #[test]
    fn scan_maildir_cur_decodes_flags_and_skips_dotfiles() {
        let dir = tempfile::tempdir().unwrap();
        stdfs::create_dir(dir.path().join("cur")).unwrap();
        File::create(dir.path().join("cur").join("1.h:2,FS")).unwrap();
        File::create(dir.path().join("cur").join(".dotfile")).unwrap();

        let mut out = Vec::new();
        scan(
            dir.path(),
            ScanKind::MaildirSubdir("cur"),
            &mut out,
            &NeverCancelled,
        )
        .unwrap();

        assert_eq!(out.len(), 1);
        assert!(out[0].email.flagged);
        assert!(out[0].email.read);
        assert_eq!(out[0].email.path, Path::new("cur/1.h:2,FS"));
    }

    #[test]
    fn scan_mh_skips_non_numeric_and_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("1")).unwrap();
        File::create(dir.path().join("2")).unwrap();
        File::create(dir.path().join(",3")).unwrap();
        File::create(dir.path().join(".mh_sequences")).unwrap();

        let mut out = Vec::new();
        scan(dir.path(), ScanKind::Mh, &mut out, &NeverCancelled).unwrap();

        let mut names: Vec<_> = out
            .iter()
            .map(|e| e.email.path.to_str().unwrap().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["1", "2"]);
    }

    #[test]
    fn missing_subdir_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();
        let result = scan(dir.path(), ScanKind::MaildirSubdir("new"), &mut out, &NeverCancelled);
        assert!(result.is_ok());
        assert!(out.is_empty());
    }
}
