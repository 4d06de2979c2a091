//! 4.B MH Sequence File Codec — read/write `.mh_sequences`, preserving
//! unknown sequences verbatim.

use std::{
    fs,
    io::{self, ErrorKind, Read, Write},
    path::Path,
};

use crate::{alloc, config::SequenceNames, flags, flags::SequenceTable, Error, Result};

/// Reads `path` into `table`. A missing file is treated as an empty table,
/// not an error. On any parse failure, the caller's `table` is left
/// untouched and an error is returned (4.B: "free partial state").
pub fn read(path: &Path, table: &mut SequenceTable, names: &SequenceNames) -> Result<()> {
    let contents = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            table.clear_all();
            return Ok(());
        }
        Err(err) => return Err(Error::Io(err)),
    };

    let mut parsed = SequenceTable::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let mut tokens = line.split([' ', '\t', ':']).filter(|t| !t.is_empty());
        let name = match tokens.next() {
            Some(n) => n,
            None => continue,
        };

        let bit = if name == names.unseen {
            flags::UNSEEN
        } else if name == names.flagged {
            flags::FLAGGED
        } else if name == names.replied {
            flags::REPLIED
        } else {
            continue;
        };

        for token in tokens {
            let (lo, hi) = parse_range(token).ok_or_else(|| {
                Error::FormatError(path.to_path_buf(), format!("bad range token {token:?}"))
            })?;
            for i in lo..=hi {
                parsed.set_bit(i as usize, bit, true);
            }
        }
    }

    *table = parsed;
    Ok(())
}

fn parse_range(token: &str) -> Option<(u64, u64)> {
    match token.split_once('-') {
        Some((lo, hi)) => {
            let lo: u64 = lo.parse().ok()?;
            let hi: u64 = hi.parse().ok()?;
            if lo > hi {
                return None;
            }
            Some((lo, hi))
        }
        None => {
            let n: u64 = token.parse().ok()?;
            Some((n, n))
        }
    }
}

/// Writes `table` to `path`, preserving every line whose sequence name is
/// not one of `names`' three configured names (§9 Open Question: unknown
/// sequences are never garbage-collected even if the messages they
/// reference are gone — this crate preserves that behaviour deliberately).
pub fn write(path: &Path, table: &SequenceTable, names: &SequenceNames) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let (mut file, tmp_path) = alloc::new_temp_in(dir, "mh_sequences").map_err(Error::Io)?;

    let result = (|| -> Result<()> {
        if let Ok(existing) = fs::read_to_string(path) {
            for line in existing.lines() {
                if !is_known_sequence_line(line, names) {
                    writeln!(file, "{line}")?;
                }
            }
        }

        for (name, bit) in [
            (&names.unseen, flags::UNSEEN),
            (&names.flagged, flags::FLAGGED),
            (&names.replied, flags::REPLIED),
        ] {
            let ranges = compress_ranges(table, bit);
            if ranges.is_empty() {
                continue;
            }
            writeln!(file, "{name}: {}", ranges.join(" "))?;
        }

        file.flush()?;
        Ok(())
    })();

    if result.is_ok() {
        if let Err(err) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::RenameFailed {
                from: tmp_path,
                to: path.to_path_buf(),
                source: err,
            });
        }
    } else {
        let _ = fs::remove_file(&tmp_path);
    }

    result
}

fn is_known_sequence_line(line: &str, names: &SequenceNames) -> bool {
    let head = line.split([' ', '\t', ':']).next().unwrap_or("");
    head == names.unseen || head == names.flagged || head == names.replied
}

/// Compresses the set indices carrying `bit` into `N` / `N-M` tokens.
fn compress_ranges(table: &SequenceTable, bit: u8) -> Vec<String> {
    let mut out = Vec::new();
    let mut run_start: Option<u64> = None;
    let mut run_end: Option<u64> = None;

    let mut flush = |out: &mut Vec<String>, start: u64, end: u64| {
        if start == end {
            out.push(start.to_string());
        } else {
            out.push(format!("{start}-{end}"));
        }
    };

    for i in 0..=table.max_index() {
        let set = table.is_set(i, bit);
        match (set, run_start, run_end) {
            (true, None, _) => {
                run_start = Some(i as u64);
                run_end = Some(i as u64);
            }
            (true, Some(_), Some(end)) if i as u64 == end + 1 => {
                run_end = Some(i as u64);
            }
            (true, Some(start), Some(end)) => {
                flush(&mut out, start, end);
                run_start = Some(i as u64);
                run_end = Some(i as u64);
            }
            (false, Some(start), Some(end)) => {
                flush(&mut out, start, end);
                run_start = None;
                run_end = None;
            }
            _ => {}
        }
    }
    if let (Some(start), Some(end)) = (run_start, run_end) {
        flush(&mut out, start, end);
    }
    out
}

/// 4.B "Append-one": a fast path for new-message commit that appends `n`
/// to each matching existing `<name>:` line, or emits a fresh line for any
/// requested flag lacking one. Same write-temp-then-rename discipline as
/// [`write`].
pub fn append_one(
    path: &Path,
    n: u64,
    unseen: bool,
    flagged: bool,
    replied: bool,
    names: &SequenceNames,
) -> Result<()> {
    let mut wants = Vec::new();
    if unseen {
        wants.push(names.unseen.as_str());
    }
    if flagged {
        wants.push(names.flagged.as_str());
    }
    if replied {
        wants.push(names.replied.as_str());
    }
    if wants.is_empty() {
        return Ok(());
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let (mut file, tmp_path) = alloc::new_temp_in(dir, "mh_sequences").map_err(Error::Io)?;

    let result = (|| -> Result<()> {
        let existing = match fs::File::open(path) {
            Ok(mut f) => {
                let mut s = String::new();
                f.read_to_string(&mut s)?;
                s
            }
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => return Err(Error::Io(err)),
        };

        let mut seen = vec![false; wants.len()];
        for line in existing.lines() {
            let head = line.split([' ', '\t', ':']).next().unwrap_or("");
            if let Some(pos) = wants.iter().position(|w| *w == head) {
                seen[pos] = true;
                writeln!(file, "{line} {n}")?;
            } else {
                writeln!(file, "{line}")?;
            }
        }
        for (idx, name) in wants.iter().enumerate() {
            if !seen[idx] {
                writeln!(file, "{name}: {n}")?;
            }
        }
        file.flush()?;
        Ok(())
    })();

    if result.is_ok() {
        if let Err(err) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::RenameFailed {
                from: tmp_path,
                to: path.to_path_buf(),
                source: err,
            });
        }
    } else {
        let _ = fs::remove_file(&tmp_path);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn names() -> SequenceNames {
        SequenceNames::default()
    }

    #[test]
    fn range_compression_examples() {
        let mut table = SequenceTable::new();
        for i in [3, 4, 5, 9, 10] {
            table.set_bit(i, flags::UNSEEN, true);
        }
        assert_eq!(compress_ranges(&table, flags::UNSEEN), vec!["3-5", "9-10"]);

        let mut single = SequenceTable::new();
        single.set_bit(7, flags::UNSEEN, true);
        assert_eq!(compress_ranges(&single, flags::UNSEEN), vec!["7"]);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".mh_sequences");

        let mut table = SequenceTable::new();
        table.set_bit(2, flags::UNSEEN, true);
        table.set_bit(3, flags::UNSEEN, true);
        table.set_bit(4, flags::UNSEEN, true);
        table.set_bit(3, flags::REPLIED, true);

        write(&path, &table, &names()).unwrap();

        let mut read_back = SequenceTable::new();
        read(&path, &mut read_back, &names()).unwrap();

        assert_eq!(read_back.get(2), flags::UNSEEN);
        assert_eq!(read_back.get(3), flags::UNSEEN | flags::REPLIED);
        assert_eq!(read_back.get(4), flags::UNSEEN);
    }

    #[test]
    fn write_preserves_unknown_sequences() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".mh_sequences");
        fs::write(&path, "unseen: 3 7-9 12\ncur: 7\n").unwrap();

        let mut table = SequenceTable::new();
        read(&path, &mut table, &names()).unwrap();
        table.set_bit(3, flags::REPLIED, false); // no-op, nothing was replied
        write(&path, &table, &names()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("cur: 7"));
        assert!(contents.contains("unseen: 3 7-9 12"));
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".mh_sequences");
        let mut table = SequenceTable::new();
        read(&path, &mut table, &names()).unwrap();
        assert_eq!(table.max_index(), 0);
    }

    #[test]
    fn append_one_adds_to_existing_and_creates_missing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".mh_sequences");
        fs::write(&path, "unseen: 1 2\n").unwrap();

        append_one(&path, 3, true, true, false, &names()).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("unseen: 1 2 3"));
        assert!(contents.contains("flagged: 3"));
    }
}
