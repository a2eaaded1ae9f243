//! Instance-suffix arithmetic.
//!
//! Every clone of a template entity is addressed as `<base-id>-<n>` where
//! `n` is the numeric suffix of the repeater instance. All derivation goes
//! through [`Suffix::apply`], which strips any existing trailing numeric
//! suffixes before appending, so an id can never accumulate `-1-1`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric suffix identifying one repeater instance (`-1`, `-2`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Suffix(u32);

impl Suffix {
    pub fn new(n: u32) -> Self {
        Suffix(n)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// The textual tag appended to ids and labels: `-1`, `-2`, …
    pub fn tag(&self) -> String {
        format!("-{}", self.0)
    }

    /// Derive the instance id for `base`: strip any trailing numeric
    /// suffixes, then append this one. Idempotent: applying the same suffix
    /// to an already-suffixed id yields the identical result.
    pub fn apply(&self, id: &str) -> String {
        format!("{}-{}", strip_numeric_suffixes(id), self.0)
    }

    /// Does `id` end with exactly this suffix?
    pub fn matches(&self, id: &str) -> bool {
        id.strip_suffix(&self.tag())
            .is_some_and(|rest| !rest.ends_with('-'))
    }
}

impl fmt::Display for Suffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strip every trailing `-<digits>` group: `uuid-1-2` → `uuid`.
pub fn strip_numeric_suffixes(id: &str) -> &str {
    let mut rest = id;
    loop {
        match split_last_suffix(rest) {
            Some((base, _)) => rest = base,
            None => return rest,
        }
    }
}

/// Split off the last `-<digits>` group, if any: `wall-1` → `("wall", 1)`.
pub fn split_last_suffix(id: &str) -> Option<(&str, u32)> {
    let dash = id.rfind('-')?;
    let (base, tail) = (&id[..dash], &id[dash + 1..]);
    if base.is_empty() || tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    tail.parse().ok().map(|n| (base, n))
}

/// Does `id` carry a trailing numeric suffix?
pub fn has_numeric_suffix(id: &str) -> bool {
    split_last_suffix(id).is_some()
}

/// Is `s` a plain numeric literal (`42`, `-3`, `0.5`)? Numeric table values
/// must never be suffixed; only textual names are.
pub fn is_numeric_literal(s: &str) -> bool {
    let t = s.trim();
    let t = t.strip_prefix('-').unwrap_or(t);
    if t.is_empty() {
        return false;
    }
    let mut parts = t.splitn(2, '.');
    let int = parts.next().unwrap_or("");
    let frac = parts.next();
    let digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    digits(int) && frac.is_none_or(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_strips_before_appending() {
        let s = Suffix::new(1);
        assert_eq!(s.apply("wall"), "wall-1");
        assert_eq!(s.apply("wall-1"), "wall-1");
        assert_eq!(s.apply("wall-2"), "wall-1");
        assert_eq!(s.apply("wall-1-2"), "wall-1");
    }

    #[test]
    fn strip_removes_all_trailing_groups() {
        assert_eq!(strip_numeric_suffixes("abc-1-2"), "abc");
        assert_eq!(strip_numeric_suffixes("abc-x1"), "abc-x1");
        assert_eq!(strip_numeric_suffixes("node_f00"), "node_f00");
        assert_eq!(strip_numeric_suffixes("-1"), "-1");
    }

    #[test]
    fn matches_requires_exact_tail() {
        let s = Suffix::new(1);
        assert!(s.matches("wall-1"));
        assert!(!s.matches("wall-11"));
        assert!(!s.matches("wall-2"));
        assert!(!s.matches("wall--1"));
    }

    #[test]
    fn numeric_literal_detection() {
        assert!(is_numeric_literal("42"));
        assert!(is_numeric_literal(" -3 "));
        assert!(is_numeric_literal("0.5"));
        assert!(!is_numeric_literal("RoomType"));
        assert!(!is_numeric_literal("5a"));
        assert!(!is_numeric_literal(""));
        assert!(!is_numeric_literal("1.2.3"));
    }
}
