//! MH integer/tombstone filename helpers.
//!
//! Message files are named by strictly positive decimal integers; a
//! leading `,` marks a soft-deleted file to be purged on sync (3.
//! Invariants).

use std::{fs, io, path::Path};

/// Parses an MH basename (no directory component) into its message
/// number, if it is a live (non-tombstone) numeric name.
pub fn parse_live(name: &str) -> Option<u64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse::<u64>().ok()
}

/// Parses a possibly-tombstoned basename (`,<n>` or `<n>`) into its
/// message number, stripping the leading comma if present.
pub fn parse_any(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(',').unwrap_or(name);
    parse_live(digits)
}

pub fn tombstone_name(n: u64) -> String {
    format!(",{n}")
}

pub fn live_name(n: u64) -> String {
    n.to_string()
}

pub fn is_tombstone(name: &str) -> bool {
    name.starts_with(',')
}

/// Scans `root` for the highest message number among both live and
/// tombstoned filenames (3. Invariants / 8. Collision-free ID
/// allocation: both `,2` and `4` count toward the max).
pub fn max_numeric(root: &Path) -> io::Result<u64> {
    let read_dir = match fs::read_dir(root) {
        Ok(rd) => rd,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };

    let mut max = 0u64;
    for entry in read_dir {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(n) => n,
            None => continue,
        };
        if let Some(n) = parse_any(name) {
            max = max.max(n);
        }
    }
    Ok(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn max_numeric_considers_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("1")).unwrap();
        File::create(dir.path().join("3")).unwrap();
        File::create(dir.path().join("4")).unwrap();
        File::create(dir.path().join(",2")).unwrap();
        File::create(dir.path().join(".mh_sequences")).unwrap();

        assert_eq!(max_numeric(dir.path()).unwrap(), 4);
    }

    #[test]
    fn parse_any_strips_tombstone_marker() {
        assert_eq!(parse_any(",5"), Some(5));
        assert_eq!(parse_any("5"), Some(5));
        assert_eq!(parse_any(".mh_sequences"), None);
    }
}
