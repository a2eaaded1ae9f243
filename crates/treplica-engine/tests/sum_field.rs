mod common;

use common::*;
use serde_json::json;

use treplica_engine::{
    EngineError, MemoryStore, TreeStore, on_instance_set_changed, remove_sum_field,
    upsert_sum_field,
};

/// Wall template plus two live instances, each with its variable copy.
fn seeded_with_instances() -> MemoryStore {
    let store = MemoryStore::new();
    seed_wall(&store);
    store.upsert_node(node("node_wall-2", "Wall-2")).unwrap();
    store
        .upsert_variable(variable("v-wall", "node_wall", "wall_area"))
        .unwrap();
    store
        .upsert_variable(variable("v-wall-1", "node_wall-1", "wall_area-1"))
        .unwrap();
    store
        .upsert_variable(variable("v-wall-2", "node_wall-2", "wall_area-2"))
        .unwrap();
    store
}

#[test]
fn total_sums_template_and_all_instances_in_order() {
    let store = seeded_with_instances();
    let field = upsert_sum_field(&store, "node_wall").unwrap();

    assert_eq!(field.member_count, 3);
    assert_eq!(
        field.tokens,
        vec![
            "@value.node_wall",
            "+",
            "@value.node_wall-1",
            "+",
            "@value.node_wall-2",
        ]
    );

    let total_formula = store.formula(&field.sum_formula_id).unwrap().unwrap();
    assert_eq!(
        total_formula.tokens,
        json!([
            "@value.node_wall",
            "+",
            "@value.node_wall-1",
            "+",
            "@value.node_wall-2"
        ])
    );

    let total_node = store.node(&field.sum_node_id).unwrap().unwrap();
    assert!(!total_node.visible_to_user);
    assert!(total_node.flags.has_formula);
    assert!(total_node.flags.has_data);
    assert_eq!(
        total_node.formula_active_id.as_deref(),
        Some(field.sum_formula_id.as_str())
    );

    let total_variable = store.variable_of_node(&field.sum_node_id).unwrap().unwrap();
    assert_eq!(total_variable.exposed_key, "wall_area_TOTAL");

    let source = store.node("node_wall").unwrap().unwrap();
    assert!(source.wants_sum_total);
    assert_eq!(source.sum_node_id.as_deref(), Some(field.sum_node_id.as_str()));
}

#[test]
fn total_is_positioned_after_the_highest_instance() {
    let store = seeded_with_instances();
    for (id, order) in [("node_wall", 3), ("node_wall-1", 7), ("node_wall-2", 5)] {
        let mut n = store.node(id).unwrap().unwrap();
        n.order = order;
        store.upsert_node(n).unwrap();
    }
    let field = upsert_sum_field(&store, "node_wall").unwrap();
    assert_eq!(store.node(&field.sum_node_id).unwrap().unwrap().order, 8);
}

#[test]
fn refresh_after_instance_removal_rewrites_tokens_only() {
    let store = seeded_with_instances();
    let field = upsert_sum_field(&store, "node_wall").unwrap();

    // External cascade: instance 2 disappears.
    store.delete_node("node_wall-2").unwrap();
    store.delete_variable("v-wall-2").unwrap();

    on_instance_set_changed(&store, "node_wall").unwrap();

    let refreshed = store.formula(&field.sum_formula_id).unwrap().unwrap();
    assert_eq!(
        refreshed.tokens,
        json!(["@value.node_wall", "+", "@value.node_wall-1"])
    );
    // Node identity is stable across refreshes.
    assert!(store.node(&field.sum_node_id).unwrap().is_some());
}

#[test]
fn refresh_is_a_noop_without_a_registered_total() {
    let store = seeded_with_instances();
    on_instance_set_changed(&store, "node_wall").unwrap();
    assert!(store.node("node_wall-sum-total").unwrap().is_none());
}

#[test]
fn upsert_twice_converges_on_the_same_rows() {
    let store = seeded_with_instances();
    let first = upsert_sum_field(&store, "node_wall").unwrap();
    let second = upsert_sum_field(&store, "node_wall").unwrap();

    assert_eq!(first.sum_node_id, second.sum_node_id);
    assert_eq!(first.sum_variable_id, second.sum_variable_id);
    assert_eq!(first.sum_formula_id, second.sum_formula_id);
    assert_eq!(
        store.variable_of_node(&first.sum_node_id).unwrap().unwrap().exposed_key,
        "wall_area_TOTAL"
    );
}

#[test]
fn exposed_key_collision_is_disambiguated() {
    let store = seeded_with_instances();
    // An unrelated variable already claims the canonical total key.
    store.upsert_node(node("node_other", "Other")).unwrap();
    store
        .upsert_variable(variable("v-other", "node_other", "wall_area_TOTAL"))
        .unwrap();

    let field = upsert_sum_field(&store, "node_wall").unwrap();
    let total_variable = store.variable_of_node(&field.sum_node_id).unwrap().unwrap();
    assert_ne!(total_variable.exposed_key, "wall_area_TOTAL");
    assert!(total_variable.exposed_key.starts_with("wall_area_TOTAL_"));
}

#[test]
fn remove_deletes_all_three_rows_and_clears_the_flag() {
    let store = seeded_with_instances();
    let field = upsert_sum_field(&store, "node_wall").unwrap();

    remove_sum_field(&store, "node_wall").unwrap();

    assert!(store.node(&field.sum_node_id).unwrap().is_none());
    assert!(store.formula(&field.sum_formula_id).unwrap().is_none());
    assert!(store.variable(&field.sum_variable_id).unwrap().is_none());
    let source = store.node("node_wall").unwrap().unwrap();
    assert!(!source.wants_sum_total);
    assert!(source.sum_node_id.is_none());
}

#[test]
fn source_without_variable_is_not_found() {
    let store = MemoryStore::new();
    seed_wall(&store);
    let err = upsert_sum_field(&store, "node_wall").unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }));
}
