#![cfg(test)]

use proptest::prelude::*;
use serde_json::{Value, json};

use treplica_common::Suffix;

use crate::rewriter::{
    RewriteContext, RewriteMaps, collect_node_refs, force_shared_ref_suffix, rewrite_str,
    rewrite_value,
};

const UUID_A: &str = "a0b1c2d3-e4f5-4a6b-8c9d-0123456789ab";
const UUID_B: &str = "b1c2d3e4-f5a6-4b7c-9d0e-123456789abc";

fn ctx_with_suffix(maps: &RewriteMaps) -> RewriteContext<'_> {
    RewriteContext::new(maps, Some(Suffix::new(1)))
}

#[test]
fn map_hit_wins_over_suffix() {
    let mut maps = RewriteMaps::default();
    maps.nodes
        .insert(UUID_A.to_string(), format!("{UUID_B}-7"));
    let ctx = ctx_with_suffix(&maps);
    assert_eq!(
        rewrite_str(&format!("@value.{UUID_A}"), &ctx),
        format!("@value.{UUID_B}-7")
    );
}

#[test]
fn unmapped_gets_suffix() {
    let maps = RewriteMaps::default();
    let ctx = ctx_with_suffix(&maps);
    assert_eq!(
        rewrite_str(&format!("@value.{UUID_A}"), &ctx),
        format!("@value.{UUID_A}-1")
    );
}

#[test]
fn no_suffix_no_map_is_untouched() {
    let maps = RewriteMaps::default();
    let ctx = RewriteContext::new(&maps, None);
    let token = format!("@value.{UUID_A}-2");
    assert_eq!(rewrite_str(&token, &ctx), token);
}

#[test]
fn qualified_shapes_use_their_own_namespace() {
    let mut maps = RewriteMaps::default();
    maps.formulas.insert("f1".into(), "f1-1".into());
    maps.conditions.insert("c1".into(), "c1-1".into());
    maps.tables.insert("t1".into(), "t1-1".into());
    // A node mapping for the same literal id must not shadow the others.
    maps.nodes.insert("f1".into(), "WRONG".into());
    let ctx = RewriteContext::new(&maps, None);

    assert_eq!(
        rewrite_str("@value.node-formula:f1", &ctx),
        "@value.node-formula:f1-1"
    );
    assert_eq!(
        rewrite_str("@value.node-condition:c1", &ctx),
        "@value.node-condition:c1-1"
    );
    assert_eq!(
        rewrite_str("@value.condition:c1", &ctx),
        "@value.condition:c1-1"
    );
    assert_eq!(
        rewrite_str("@value.node-table:t1", &ctx),
        "@value.node-table:t1-1"
    );
    assert_eq!(rewrite_str("@table.t1", &ctx), "@table.t1-1");
    assert_eq!(rewrite_str("node-formula:f1", &ctx), "node-formula:f1-1");
    assert_eq!(rewrite_str("condition:c1", &ctx), "condition:c1-1");
    assert_eq!(rewrite_str("node-table:t1", &ctx), "node-table:t1-1");
}

#[test]
fn generic_pass_does_not_swallow_qualified_forms() {
    let mut maps = RewriteMaps::default();
    maps.formulas.insert("abc".into(), "abc-1".into());
    let ctx = RewriteContext::new(&maps, None);
    // With node map empty, only the formula namespace may rewrite this.
    assert_eq!(
        rewrite_str("@value.node-formula:abc", &ctx),
        "@value.node-formula:abc-1"
    );
}

#[test]
fn rewriting_suffixed_token_again_is_noop() {
    let maps = RewriteMaps::default();
    let ctx = ctx_with_suffix(&maps);
    let once = rewrite_str(&format!("@value.{UUID_A}"), &ctx);
    let twice = rewrite_str(&once, &ctx);
    assert_eq!(once, twice);
    assert!(!twice.ends_with("-1-1"));
}

#[test]
fn shared_ref_is_suffixed_exactly_once() {
    let maps = RewriteMaps::default();
    let ctx = ctx_with_suffix(&maps);
    assert_eq!(
        rewrite_str("@value.shared-ref-X", &ctx),
        "@value.shared-ref-X-1"
    );
    assert_eq!(
        rewrite_str("@value.shared-ref-X-1", &ctx),
        "@value.shared-ref-X-1"
    );
}

#[test]
fn shared_ref_without_active_suffix_is_stable() {
    let maps = RewriteMaps::default();
    let ctx = RewriteContext::new(&maps, None);
    assert_eq!(
        rewrite_str("@value.shared-ref-X", &ctx),
        "@value.shared-ref-X"
    );
}

#[test]
fn naked_ids_in_arrays_are_rewritten() {
    let maps = RewriteMaps::default();
    let ctx = ctx_with_suffix(&maps);
    let payload = json!({ "nodeIds": [UUID_A, "node_ab12", format!("{UUID_B}-2")] });
    let rewritten = rewrite_value(&payload, &ctx);
    assert_eq!(
        rewritten,
        json!({ "nodeIds": [format!("{UUID_A}-1"), "node_ab12-1", format!("{UUID_B}-2")] })
    );
}

#[test]
fn non_reference_text_passes_through() {
    let maps = RewriteMaps::default();
    let ctx = ctx_with_suffix(&maps);
    for s in ["+", "42", "Surface totale", "node-formula:", "@value."] {
        assert_eq!(rewrite_str(s, &ctx), s, "{s:?} must be untouched");
    }
}

#[test]
fn numbers_and_bools_survive_json_walk() {
    let maps = RewriteMaps::default();
    let ctx = ctx_with_suffix(&maps);
    let payload = json!({ "n": 5, "b": true, "x": null, "s": [1.5] });
    assert_eq!(rewrite_value(&payload, &ctx), payload);
}

#[test]
fn nested_condition_set_is_rewritten_structurally() {
    let mut maps = RewriteMaps::default();
    maps.formulas.insert("f9".into(), "f9-1".into());
    let ctx = ctx_with_suffix(&maps);
    let set = json!({
        "branches": [{
            "id": "b1",
            "when": { "op": "gt", "left": { "ref": format!("@value.{UUID_A}") }, "right": "10" },
            "actions": [{ "id": "a1", "nodeIds": [UUID_B], "formula": "node-formula:f9" }]
        }]
    });
    let out = rewrite_value(&set, &ctx);
    let s = out.to_string();
    assert!(s.contains(&format!("@value.{UUID_A}-1")));
    assert!(s.contains(&format!("\"{UUID_B}-1\"")));
    assert!(s.contains("node-formula:f9-1"));
    // "10" is a literal, not a reference.
    assert!(s.contains("\"10\""));
}

#[test]
fn force_shared_ref_pass_only_touches_bare_shared_tokens() {
    let suffix = Suffix::new(2);
    let value = json!([
        "@value.shared-ref-room",
        "@value.shared-ref-room-2",
        format!("@value.{UUID_A}"),
        "+"
    ]);
    let out = force_shared_ref_suffix(&value, suffix);
    assert_eq!(
        out,
        json!([
            "@value.shared-ref-room-2",
            "@value.shared-ref-room-2",
            format!("@value.{UUID_A}"),
            "+"
        ])
    );
}

#[test]
fn collect_node_refs_finds_qualified_and_naked_ids() {
    let payload = json!({
        "tokens": [format!("@value.{UUID_A}"), "+", "3"],
        "actions": [{ "nodeIds": [UUID_B, "node_zz9"] }]
    });
    let mut refs = collect_node_refs(&payload);
    refs.sort();
    let mut expected = vec![UUID_A.to_string(), UUID_B.to_string(), "node_zz9".to_string()];
    expected.sort();
    assert_eq!(refs, expected);
}

proptest! {
    // Re-suffixing with the same suffix is always a no-op, for any id base
    // and any prior suffix depth.
    #[test]
    fn prop_suffix_idempotent(base in "[a-z][a-z0-9_]{0,16}", depth in 0usize..3, n in 1u32..9) {
        let mut id = base.clone();
        for _ in 0..depth {
            id.push_str(&format!("-{n}"));
        }
        let maps = RewriteMaps::default();
        let ctx = RewriteContext::new(&maps, Some(Suffix::new(n)));
        let token = format!("@value.{id}");
        let once = rewrite_str(&token, &ctx);
        let twice = rewrite_str(&once, &ctx);
        prop_assert_eq!(&once, &twice);
        let doubled = format!("-{}-{}", n, n);
        prop_assert!(!once.ends_with(&doubled));
    }

    // The walk never changes non-string JSON scalars.
    #[test]
    fn prop_scalars_unchanged(x in any::<i64>(), b in any::<bool>()) {
        let maps = RewriteMaps::default();
        let ctx = RewriteContext::new(&maps, Some(Suffix::new(1)));
        let v: Value = json!({ "i": x, "b": b });
        prop_assert_eq!(rewrite_value(&v, &ctx), v);
    }
}
