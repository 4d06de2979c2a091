//! 4.C Maildir Filename Codec.
//!
//! Encodes/decodes the `:2,<sorted-flags>` suffix and canonicalises a
//! basename to its flag-less identity key.

/// Flags recovered from (or to be written into) a Maildir filename suffix.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DecodedFlags {
    pub read: bool,
    pub flagged: bool,
    pub replied: bool,
    pub deleted: bool,
    /// Any suffix letters outside `FRST`, preserved verbatim (sorted on
    /// the next encode, never dropped).
    pub preserved: Option<String>,
}

/// Decodes a Maildir basename's `:2,<flags>` suffix, if present.
///
/// `flag_safe`: per spec §4.C, a `T`-flagged message that is also
/// `F`-flagged is not treated as user-deleted when this is enabled (it
/// survived being flagged after being trashed).
pub fn decode_with_flag_safe(basename: &str, flag_safe: bool) -> DecodedFlags {
    let mut out = DecodedFlags::default();

    let suffix = match basename.rfind(':') {
        Some(idx) => &basename[idx + 1..],
        None => return out,
    };

    let flags = match suffix.strip_prefix("2,") {
        Some(flags) => flags,
        None => return out,
    };

    let mut preserved = String::new();
    for c in flags.chars() {
        match c {
            'F' => out.flagged = true,
            'R' => out.replied = true,
            'S' => out.read = true,
            'T' => out.deleted = true,
            other => preserved.push(other),
        }
    }

    if out.deleted && out.flagged && flag_safe {
        out.deleted = false;
    }

    if !preserved.is_empty() {
        out.preserved = Some(preserved);
    }

    out
}

/// [`decode_with_flag_safe`] with `flag_safe` off, the common case used by
/// the scanner's initial pass (4.D) before a mailbox's config is known to
/// matter).
pub fn decode(basename: &str) -> DecodedFlags {
    decode_with_flag_safe(basename, false)
}

/// Builds the `:2,<sorted-flags>` suffix for the given flag state.
///
/// Returns an empty string (no suffix at all) only when there are no
/// flags, the message is not `old`, and there are no preserved letters —
/// matching `new/`-style unsuffixed names.
pub fn encode(
    flagged: bool,
    replied: bool,
    read: bool,
    deleted: bool,
    old: bool,
    preserved: Option<&str>,
) -> String {
    let mut chars: Vec<char> = Vec::new();
    if flagged {
        chars.push('F');
    }
    if replied {
        chars.push('R');
    }
    if read {
        chars.push('S');
    }
    if deleted {
        chars.push('T');
    }
    if let Some(p) = preserved {
        chars.extend(p.chars());
    }

    if chars.is_empty() {
        if old {
            return ":2,".to_string();
        }
        return String::new();
    }

    chars.sort_unstable();
    let flags: String = chars.into_iter().collect();
    format!(":2,{flags}")
}

/// Drops everything from the last `:` onward, producing the identity key
/// shared by a message's `new/<uniq>` and `cur/<uniq>:2,<flags>` forms.
pub fn canonicalize(basename: &str) -> &str {
    match basename.rfind(':') {
        Some(idx) => &basename[..idx],
        None => basename,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_flag_combinations() {
        let flag_bits = [true, false];
        for &flagged in &flag_bits {
            for &replied in &flag_bits {
                for &read in &flag_bits {
                    for &deleted in &flag_bits {
                        let encoded = encode(flagged, replied, read, deleted, false, Some("X"));
                        let decoded = decode(&format!("uniq{encoded}"));
                        assert_eq!(decoded.flagged, flagged);
                        assert_eq!(decoded.replied, replied);
                        assert_eq!(decoded.read, read);
                        assert_eq!(decoded.deleted, deleted);
                        assert_eq!(decoded.preserved.as_deref(), Some("X"));
                    }
                }
            }
        }
    }

    #[test]
    fn concrete_encoding() {
        assert_eq!(encode(true, false, true, false, false, Some("X")), ":2,FSX");
    }

    #[test]
    fn flag_safe_untrashes_flagged_messages() {
        let decoded = decode_with_flag_safe("uniq:2,FT", true);
        assert!(decoded.flagged);
        assert!(!decoded.deleted);

        let decoded = decode_with_flag_safe("uniq:2,FT", false);
        assert!(decoded.deleted);
    }

    #[test]
    fn canonicalize_strips_suffix() {
        assert_eq!(canonicalize("uniq:2,FS"), "uniq");
        assert_eq!(canonicalize("uniq"), "uniq");
    }

    #[test]
    fn no_flags_emits_empty_suffix() {
        assert_eq!(encode(false, false, false, false, false, None), "");
    }
}
