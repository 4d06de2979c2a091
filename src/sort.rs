//! Stable sort helpers.
//!
//! The original engine carries both a merge sort and an insertion sort,
//! preferring insertion sort below six elements. That split is a
//! micro-optimisation the standard library's stable, adaptive sort already
//! subsumes, so a single `sort_by` suffices here.

use std::cmp::Ordering;

pub fn sort_by<T, F>(items: &mut [T], cmp: F)
where
    F: FnMut(&T, &T) -> Ordering,
{
    items.sort_by(cmp);
}

/// Orders MH filenames ("natural order") by their numeric value rather
/// than lexicographically, since `"10" < "9"` as strings but not as
/// message numbers.
pub fn by_mh_number(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_order_beats_lexicographic() {
        let mut names = vec!["10".to_string(), "9".to_string(), "2".to_string()];
        sort_by(&mut names, |a, b| by_mh_number(a, b));
        assert_eq!(names, vec!["2", "9", "10"]);
    }
}
