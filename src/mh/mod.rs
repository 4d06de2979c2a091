//! The MH on-disk format: `<root>/<decimal>` for live messages,
//! `<root>/,<decimal>` for soft-deleted ones, `<root>/.mh_sequences` as
//! the sidecar flag store (§6).

pub mod filename;
pub mod format;
pub mod sequences;

const PROBE_MARKERS: &[&str] = &[
    ".mh_sequences",
    ".xmhcache",
    ".mew_cache",
    ".mew-cache",
    ".sylpheed_cache",
    ".overview",
];

/// True iff any of the well-known MH cache sidecars exists under `path`
/// (§6 path probe).
pub fn path_probe(path: &std::path::Path) -> bool {
    PROBE_MARKERS.iter().any(|marker| path.join(marker).exists())
}
