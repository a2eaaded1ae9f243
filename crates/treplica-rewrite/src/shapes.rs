//! Recognized textual reference shapes.
//!
//! Capacity payloads embed references in four id namespaces (node, formula,
//! condition, table) under several spellings: `@value.`-qualified, `@table.`-
//! qualified, bare `node-formula:`/`node-condition:`/`condition:`/
//! `node-table:` prefixed, and naked ids (UUIDs, generated `node_<hash>` ids,
//! `shared-ref-*` keys) sitting in id arrays or cell configuration.
//!
//! Matching is precedence-ordered, most-qualified first, so the generic
//! `@value.<id>` pattern never swallows a qualified `@value.node-formula:<id>`
//! and a naked-UUID scan never fires inside an already-qualified token.

use once_cell::sync::Lazy;
use regex::Regex;

/// Which remap namespace a matched reference resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Node,
    Formula,
    Condition,
    Table,
}

/// Qualified prefixes that the generic `@value.<id>` pass must not re-match.
pub(crate) const QUALIFIED_VALUE_PREFIXES: [&str; 4] = [
    "node-formula:",
    "node-condition:",
    "condition:",
    "node-table:",
];

pub(crate) static VALUE_FORMULA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@value\.node-formula:([A-Za-z0-9_-]+)").unwrap());

pub(crate) static VALUE_CONDITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@value\.node-condition:([A-Za-z0-9_-]+)").unwrap());

pub(crate) static VALUE_CONDITION_SHORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@value\.condition:([A-Za-z0-9_-]+)").unwrap());

pub(crate) static VALUE_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@value\.node-table:([A-Za-z0-9_-]+)").unwrap());

/// Generic value reference: UUIDs, generated `node_<hash>` ids, and
/// `shared-ref-*` keys. Runs after the qualified passes.
pub(crate) static VALUE_GENERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@value\.([A-Za-z0-9_:-]+)").unwrap());

pub(crate) static TABLE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@table\.([A-Za-z0-9_-]+)").unwrap());

pub(crate) static BARE_FORMULA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"node-formula:([A-Za-z0-9_-]+)").unwrap());

pub(crate) static BARE_CONDITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"node-condition:([A-Za-z0-9_-]+)").unwrap());

pub(crate) static BARE_CONDITION_SHORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"condition:([A-Za-z0-9_-]+)").unwrap());

pub(crate) static BARE_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"node-table:([A-Za-z0-9_-]+)").unwrap());

/// Naked UUID, with the trailing suffix captured so an already-suffixed
/// occurrence is left alone instead of growing a second suffix.
pub(crate) static BARE_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b([0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})(-\d+)?\b",
    )
    .unwrap()
});

pub(crate) static BARE_GENERATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(node_[A-Za-z0-9_-]*[A-Za-z0-9])(-\d+)?\b").unwrap());

pub(crate) static BARE_SHARED_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(shared-ref-[A-Za-z0-9_-]*[A-Za-z0-9])(-\d+)?\b").unwrap());

/// Whole-token `@value.shared-ref-*` form used by the forced-suffix pass.
pub(crate) static SHARED_REF_VALUE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@value\.shared-ref-[A-Za-z0-9_-]+$").unwrap());
