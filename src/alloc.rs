//! 4.I New Message Allocation — temp-file staging and collision-free
//! commit for both Maildir and MH, plus the umask helper shared by both.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    process,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use gethostname::gethostname;

use crate::{Error, Result};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn hostname() -> String {
    gethostname()
        .into_string()
        .unwrap_or_else(|_| "localhost".to_string())
}

/// A pseudo-random 64-bit token, unique per process per call. Not
/// cryptographic — only needs to make concurrent writers from the same
/// host collide with vanishing probability, same contract as the `R<n>`
/// component of a Maildir unique name.
fn rand64() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);
    let pid = process::id() as u64;
    nanos
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(counter.wrapping_shl(16))
        .wrapping_add(pid)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// `0777 & ~<mode of dir>`, falling back to `077` if `dir` can't be
/// stat'd (4.F: "On first open, take `mh_umask`...").
pub fn umask_for_dir(dir: &Path) -> u32 {
    #[cfg(unix)]
    {
        match fs::metadata(dir) {
            Ok(meta) => 0o777 & !(meta.permissions().mode() & 0o777),
            Err(_) => 0o077,
        }
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
        0o077
    }
}

/// 4.I "Temp file": repeatedly generates
/// `<dir>/.<prefix>-<host>-<pid>-<rand64>` and opens it `O_CREAT|O_EXCL`,
/// retrying only on `EEXIST`.
pub fn new_temp_in(dir: &Path, prefix: &str) -> io::Result<(File, PathBuf)> {
    let host = hostname();
    let pid = process::id();

    loop {
        let name = format!(".{prefix}-{host}-{pid}-{:x}", rand64());
        let path = dir.join(name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode_0600()
            .open(&path)
        {
            Ok(file) => return Ok((file, path)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Small extension so the temp file's initial mode is `0600` regardless
/// of the process umask (§9 design notes: "the temp file's initial mode
/// matters for security").
trait Mode0600 {
    fn mode_0600(&mut self) -> &mut Self;
}

impl Mode0600 for OpenOptions {
    #[cfg(unix)]
    fn mode_0600(&mut self) -> &mut Self {
        use std::os::unix::fs::OpenOptionsExt;
        self.mode(0o600)
    }

    #[cfg(not(unix))]
    fn mode_0600(&mut self) -> &mut Self {
        self
    }
}

/// The `<subdir>.<ts>.R<rand64>.<host>` stem shared between a Maildir
/// message's `tmp/` staging name and its committed `new/`/`cur/` name.
pub struct MaildirUniqueName {
    pub ts: u64,
    pub rand: u64,
    pub host: String,
}

impl MaildirUniqueName {
    pub fn generate() -> Self {
        Self {
            ts: now_secs(),
            rand: rand64(),
            host: hostname(),
        }
    }

    pub fn regenerate(&mut self) {
        self.ts = now_secs();
        self.rand = rand64();
    }

    pub fn stem(&self) -> String {
        format!("{}.R{:x}.{}", self.ts, self.rand, self.host)
    }
}

/// Creates a staging file under `<root>/tmp/` for a new Maildir message.
/// `suffix` is the flag encoding with `deleted` temporarily cleared by the
/// caller, so a `T` flag never leaks into `tmp/`.
pub fn maildir_stage(root: &Path, name: &MaildirUniqueName, suffix: &str) -> Result<(File, PathBuf)> {
    let tmp_dir = root.join("tmp");
    let rel = PathBuf::from("tmp").join(format!("{}{}", name.stem(), suffix));
    let abs = root.join(&rel);
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode_0600()
        .open(&abs)
        .map_err(Error::Io)?;
    let _ = tmp_dir;
    Ok((file, rel))
}

/// Commits a staged Maildir message from `tmp/` into `new/` or `cur/`,
/// retrying with a fresh timestamp/random token on `EEXIST`.
pub fn maildir_commit(
    root: &Path,
    tmp_rel: &Path,
    subdir: &'static str,
    name: &mut MaildirUniqueName,
    suffix: &str,
) -> Result<PathBuf> {
    let tmp_abs = root.join(tmp_rel);
    const MAX_ATTEMPTS: u32 = 64;

    for attempt in 0..MAX_ATTEMPTS {
        let rel = PathBuf::from(subdir).join(format!("{}{}", name.stem(), suffix));
        let abs = root.join(&rel);
        match fs::rename(&tmp_abs, &abs) {
            Ok(()) => return Ok(rel),
            Err(err) if err.kind() == ErrorKind::AlreadyExists && attempt + 1 < MAX_ATTEMPTS => {
                name.regenerate();
                continue;
            }
            Err(err) if is_cross_device(&err) => return Err(Error::CrossDevice(tmp_abs)),
            Err(err) => {
                return Err(Error::RenameFailed {
                    from: tmp_abs,
                    to: abs,
                    source: err,
                })
            }
        }
    }

    Err(Error::AllocationExhausted(root.join(subdir)))
}

/// Creates a staging file under the MH mailbox root.
pub fn mh_stage(root: &Path) -> Result<(File, PathBuf)> {
    new_temp_in(root, "mh").map_err(Error::Io)
}

/// Commits a staged MH message: scans `root` for the highest existing
/// numeric filename and renames the temp file to `hi + 1`, retrying on
/// `EEXIST` by incrementing further (3.Invariants: "allocated as
/// `1 + max(existing-numeric-filename, already-allocated-in-this-commit)`").
pub fn mh_commit(root: &Path, tmp_abs: &Path) -> Result<(u64, PathBuf)> {
    let mut next = crate::mh::filename::max_numeric(root)? + 1;
    const MAX_ATTEMPTS: u32 = 1000;

    for _ in 0..MAX_ATTEMPTS {
        let rel = PathBuf::from(next.to_string());
        let abs = root.join(&rel);
        match fs::rename(tmp_abs, &abs) {
            Ok(()) => return Ok((next, rel)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                next += 1;
                continue;
            }
            Err(err) if is_cross_device(&err) => return Err(Error::CrossDevice(tmp_abs.to_path_buf())),
            Err(err) => {
                return Err(Error::RenameFailed {
                    from: tmp_abs.to_path_buf(),
                    to: abs,
                    source: err,
                })
            }
        }
    }

    Err(Error::AllocationExhausted(root.to_path_buf()))
}

#[cfg(unix)]
fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc_exdev())
}

#[cfg(not(unix))]
fn is_cross_device(_err: &io::Error) -> bool {
    false
}

#[cfg(unix)]
fn libc_exdev() -> i32 {
    18 // EXDEV is stable across Unix targets this crate supports.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maildir_commit_retries_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("tmp")).unwrap();
        fs::create_dir(dir.path().join("new")).unwrap();

        let mut name = MaildirUniqueName {
            ts: 1_500_000_000,
            rand: 1,
            host: "h".into(),
        };
        let (file, tmp_rel) = maildir_stage(dir.path(), &name, "").unwrap();
        drop(file);

        // Pre-create the target the first attempt would pick, forcing a retry.
        fs::write(dir.path().join("new").join(name.stem()), b"").unwrap();

        let committed = maildir_commit(dir.path(), &tmp_rel, "new", &mut name, "").unwrap();
        assert_ne!(committed, PathBuf::from("new").join("1500000000.R1.h"));
        assert!(dir.path().join(&committed).exists());
    }

    #[test]
    fn mh_commit_allocates_max_plus_one() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1"), b"").unwrap();
        fs::write(dir.path().join("3"), b"").unwrap();
        fs::write(dir.path().join("4"), b"").unwrap();
        fs::write(dir.path().join(",2"), b"").unwrap();

        let (file, tmp) = mh_stage(dir.path()).unwrap();
        drop(file);
        let (n, rel) = mh_commit(dir.path(), &tmp).unwrap();
        assert_eq!(n, 5);
        assert_eq!(rel, PathBuf::from("5"));
    }
}
