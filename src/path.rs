//! §6 path helpers exposed to the embedder: `path_probe`, `path_canon`,
//! `path_pretty`, `path_parent`. Path canonicalization proper (resolving a
//! configured shorthand like `+folder` or `=folder`) is an external
//! collaborator's job (§1); these are the mechanical pieces that stay in
//! the core because they're part of the named operation surface.

use std::path::{Path, PathBuf};

pub use crate::maildir::path_probe as maildir_path_probe;
pub use crate::mh::path_probe as mh_path_probe;

/// Resolves symlinks, falling back to the original path unchanged if it
/// cannot be stat'd (e.g. it doesn't exist yet, as for a not-yet-created
/// mailbox).
pub fn path_canon(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// A short, display-friendly form: just the final component, falling back
/// to the full path if there is none (e.g. `/`).
pub fn path_pretty(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// The parent directory, or `path` itself if it has none.
pub fn path_parent(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_is_the_last_component() {
        assert_eq!(path_pretty(Path::new("/a/b/inbox")), "inbox");
    }

    #[test]
    fn parent_of_root_is_root() {
        assert_eq!(path_parent(Path::new("/")), PathBuf::from("/"));
    }
}
