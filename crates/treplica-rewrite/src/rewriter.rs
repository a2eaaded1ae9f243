//! Reference rewriting over strings and JSON values.
//!
//! The whole pipeline threads one immutable [`RewriteContext`]: the four
//! remap tables plus the optional active instance suffix. Resolution order
//! per candidate id:
//!
//! 1. an exact hit in the relevant map wins unconditionally (looked up on
//!    the suffix-stripped base, so re-running a rewrite stays a no-op);
//! 2. otherwise, with an active suffix, strip any existing numeric suffix
//!    and append the new one;
//! 3. otherwise the token passes through unchanged — a reference-shaped
//!    token with no resolvable id is never dropped or altered.
//!
//! `shared-ref-*` ids follow rule 2 like everything else: inside an active
//! duplication they always receive the current suffix, even unmapped.
//! Whether deliberately-shared state should instead stay suffix-stable
//! across instances is an open product question; the current behavior of
//! the platform is preserved here.
//!
//! JSON payloads are walked structurally and only string leaves are
//! pattern-matched, so a reference can never be rewritten inside an
//! unrelated substring of a serialized blob.

use rustc_hash::FxHashMap;
use serde_json::Value;

use treplica_common::{Suffix, strip_numeric_suffixes};

use crate::shapes::{self, RefKind};

/// Old-id → new-id tables for the four reference namespaces.
#[derive(Debug, Clone, Default)]
pub struct RewriteMaps {
    pub nodes: FxHashMap<String, String>,
    pub formulas: FxHashMap<String, String>,
    pub conditions: FxHashMap<String, String>,
    pub tables: FxHashMap<String, String>,
}

impl RewriteMaps {
    pub fn for_kind(&self, kind: RefKind) -> &FxHashMap<String, String> {
        match kind {
            RefKind::Node => &self.nodes,
            RefKind::Formula => &self.formulas,
            RefKind::Condition => &self.conditions,
            RefKind::Table => &self.tables,
        }
    }
}

/// Immutable view threaded through every rewriting call site.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext<'a> {
    maps: &'a RewriteMaps,
    suffix: Option<Suffix>,
}

impl<'a> RewriteContext<'a> {
    pub fn new(maps: &'a RewriteMaps, suffix: Option<Suffix>) -> Self {
        Self { maps, suffix }
    }

    pub fn suffix(&self) -> Option<Suffix> {
        self.suffix
    }

    /// Resolve one candidate id (which may still carry an old suffix).
    /// `raw` is returned verbatim when neither a mapping nor a suffix
    /// applies.
    pub fn resolve(&self, raw: &str, kind: RefKind) -> String {
        let base = strip_numeric_suffixes(raw);
        if let Some(mapped) = self.maps.for_kind(kind).get(base) {
            return mapped.clone();
        }
        match self.suffix {
            Some(suffix) => suffix.apply(base),
            None => raw.to_string(),
        }
    }

    /// Resolve a naked id only when it does not already end in a numeric
    /// suffix; an already-suffixed occurrence is left alone.
    fn resolve_naked(&self, raw: &str, existing_suffix: bool, kind: RefKind) -> String {
        if existing_suffix {
            return raw.to_string();
        }
        self.resolve(raw, kind)
    }
}

/// Rewrite every recognized reference inside `text`.
///
/// Passes run most-qualified first; each pass is idempotent because
/// resolution always strips before re-suffixing, so the later, broader
/// passes re-visiting an already-rewritten token cannot corrupt it.
pub fn rewrite_str(text: &str, ctx: &RewriteContext<'_>) -> String {
    let mut out = text.to_string();

    // @value.-qualified forms.
    out = replace_qualified(&out, &shapes::VALUE_FORMULA, "@value.node-formula:", RefKind::Formula, ctx);
    out = replace_qualified(&out, &shapes::VALUE_CONDITION, "@value.node-condition:", RefKind::Condition, ctx);
    out = replace_qualified(&out, &shapes::VALUE_CONDITION_SHORT, "@value.condition:", RefKind::Condition, ctx);
    out = replace_qualified(&out, &shapes::VALUE_TABLE, "@value.node-table:", RefKind::Table, ctx);

    // Generic @value.<id>, skipping ids the qualified passes own.
    out = shapes::VALUE_GENERIC
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            let id = &caps[1];
            if shapes::QUALIFIED_VALUE_PREFIXES
                .iter()
                .any(|p| id.starts_with(p))
            {
                return caps[0].to_string();
            }
            format!("@value.{}", ctx.resolve(id, RefKind::Node))
        })
        .into_owned();

    out = replace_qualified(&out, &shapes::TABLE_REF, "@table.", RefKind::Table, ctx);

    // Bare prefixed forms (inside action payloads, source refs, …).
    out = replace_qualified(&out, &shapes::BARE_FORMULA, "node-formula:", RefKind::Formula, ctx);
    out = replace_qualified(&out, &shapes::BARE_CONDITION, "node-condition:", RefKind::Condition, ctx);
    out = replace_qualified(&out, &shapes::BARE_CONDITION_SHORT, "condition:", RefKind::Condition, ctx);
    out = replace_qualified(&out, &shapes::BARE_TABLE, "node-table:", RefKind::Table, ctx);

    // Naked ids found anywhere (id arrays, cell configuration, …).
    out = shapes::BARE_UUID
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            ctx.resolve_naked(&caps[1], caps.get(2).is_some(), RefKind::Node)
        })
        .into_owned();
    out = shapes::BARE_GENERATED
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            ctx.resolve_naked(&caps[1], caps.get(2).is_some(), RefKind::Node)
        })
        .into_owned();
    out = shapes::BARE_SHARED_REF
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            ctx.resolve_naked(&caps[1], caps.get(2).is_some(), RefKind::Node)
        })
        .into_owned();

    out
}

fn replace_qualified(
    text: &str,
    pattern: &regex::Regex,
    prefix: &str,
    kind: RefKind,
    ctx: &RewriteContext<'_>,
) -> String {
    pattern
        .replace_all(text, |caps: &regex::Captures<'_>| {
            format!("{prefix}{}", ctx.resolve(&caps[1], kind))
        })
        .into_owned()
}

/// Rewrite references inside an arbitrary JSON value. Non-string nodes are
/// walked recursively; only string leaves are pattern-matched.
pub fn rewrite_value(value: &Value, ctx: &RewriteContext<'_>) -> Value {
    match value {
        Value::String(s) => Value::String(rewrite_str(s, ctx)),
        Value::Array(items) => Value::Array(items.iter().map(|v| rewrite_value(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), rewrite_value(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Narrow companion pass: unconditionally append `suffix` to any whole-token
/// `@value.shared-ref-*` leaf still lacking one. Used where the map-driven
/// pass has already run but deeply nested table/column configuration may
/// hold shared refs it never saw.
pub fn force_shared_ref_suffix(value: &Value, suffix: Suffix) -> Value {
    match value {
        Value::String(s) => {
            if shapes::SHARED_REF_VALUE_TOKEN.is_match(s) {
                let base = strip_numeric_suffixes(s);
                if base == s {
                    return Value::String(format!("{s}{}", suffix.tag()));
                }
            }
            value.clone()
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| force_shared_ref_suffix(v, suffix))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), force_shared_ref_suffix(v, suffix)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Collect every node id a payload references: `@value.<id>` occurrences
/// plus string leaves that are themselves a naked UUID or generated id
/// (entries of `nodeIds` arrays). Used by the link-index helpers to find
/// the nodes a rewritten payload depends on. Order of first occurrence,
/// deduplicated.
pub fn collect_node_refs(value: &Value) -> Vec<String> {
    fn walk(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => {
                for caps in shapes::VALUE_GENERIC.captures_iter(s) {
                    let id = caps[1].to_string();
                    if !shapes::QUALIFIED_VALUE_PREFIXES
                        .iter()
                        .any(|p| id.starts_with(p))
                        && !out.contains(&id)
                    {
                        out.push(id);
                    }
                }
                let whole = |re: &regex::Regex| {
                    re.find(s)
                        .is_some_and(|m| m.start() == 0 && m.end() == s.len())
                };
                if (whole(&shapes::BARE_UUID) || whole(&shapes::BARE_GENERATED))
                    && !out.contains(s)
                {
                    out.push(s.clone());
                }
            }
            Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            Value::Object(map) => map.values().for_each(|v| walk(v, out)),
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(value, &mut out);
    out
}
