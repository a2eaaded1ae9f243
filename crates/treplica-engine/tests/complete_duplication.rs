mod common;

use common::*;
use serde_json::json;

use treplica_engine::{
    Engine, MemoryStore, SourceType, Suffix, TreeStore, complete_duplication,
};

fn seeded() -> MemoryStore {
    let store = MemoryStore::new();
    seed_wall(&store);
    store
}

#[test]
fn empty_helper_lookup_table_is_filled_from_template() {
    let store = seeded();
    // Template table with real data.
    store
        .upsert_table({
            let mut t = table("t-coef", "node_wall", "Coefficients");
            t.lookup_select_column = Some("Orientation".into());
            t.lookup_display_columns = vec!["Orientation".into()];
            t
        })
        .unwrap();
    store
        .upsert_column(column("col-a", "t-coef", 0, "Orientation"))
        .unwrap();
    store
        .upsert_row(row("row-a", "t-coef", 0, json!(["Nord"])))
        .unwrap();
    store
        .upsert_row(row("row-b", "t-coef", 1, json!(["Sud"])))
        .unwrap();

    // Sibling helper instance carrying an empty lookup table named after
    // the template.
    store
        .upsert_node(node("node_measure-1", "Measure-1"))
        .unwrap();
    store
        .upsert_table(table("t-helper", "node_measure-1", "Lookup Wall-1"))
        .unwrap();

    let outcome =
        complete_duplication(&store, "node_wall", "node_wall-1", Suffix::new(1)).unwrap();
    assert_eq!(outcome.lookups_filled, 1);

    let filled_rows = store.rows_of_table("t-helper").unwrap();
    assert_eq!(filled_rows.len(), 2);
    assert_eq!(filled_rows[0].id, "row-a-lookup-1");
    assert_eq!(filled_rows[0].cells, json!(["Nord"]));
    let filled_cols = store.columns_of_table("t-helper").unwrap();
    assert_eq!(filled_cols.len(), 1);
    assert_eq!(filled_cols[0].name.as_deref(), Some("Orientation"));

    let helper_table = store.table("t-helper").unwrap().unwrap();
    assert_eq!(helper_table.row_count, 2);
    assert_eq!(helper_table.column_count, 1);
    assert_eq!(helper_table.lookup_select_column.as_deref(), Some("Orientation"));
}

#[test]
fn helper_lookup_with_rows_is_left_alone() {
    let store = seeded();
    store
        .upsert_table(table("t-coef", "node_wall", "Coefficients"))
        .unwrap();
    store
        .upsert_row(row("row-a", "t-coef", 0, json!(["Nord"])))
        .unwrap();

    store
        .upsert_node(node("node_measure-1", "Measure-1"))
        .unwrap();
    store
        .upsert_table(table("t-helper", "node_measure-1", "Lookup Wall-1"))
        .unwrap();
    store
        .upsert_row(row("row-x", "t-helper", 0, json!(["already here"])))
        .unwrap();

    let outcome =
        complete_duplication(&store, "node_wall", "node_wall-1", Suffix::new(1)).unwrap();
    assert_eq!(outcome.lookups_filled, 0);
    let rows = store.rows_of_table("t-helper").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "row-x");
}

#[test]
fn field_config_pointers_follow_the_copies() {
    let store = seeded();
    store
        .upsert_table(table("t-coef", "node_wall", "Coefficients"))
        .unwrap();
    let mut instance = store.node("node_wall-1").unwrap().unwrap();
    instance.field_config = Some(json!({
        "lookupTableId": "t-coef",
        "lookupNodeId": "node_wall",
        "placeholder": "unrelated"
    }));
    store.upsert_node(instance).unwrap();

    let outcome =
        complete_duplication(&store, "node_wall", "node_wall-1", Suffix::new(1)).unwrap();
    assert!(outcome.field_config_updated);

    let config = store
        .node("node_wall-1")
        .unwrap()
        .unwrap()
        .field_config
        .unwrap();
    assert_eq!(config["lookupTableId"], "t-coef-1");
    assert_eq!(config["lookupNodeId"], "node_wall-1");
    assert_eq!(config["placeholder"], "unrelated");
}

#[test]
fn template_variable_is_cloned_with_rewritten_source_ref() {
    let store = seeded();
    store
        .upsert_formula(formula("f-area", "node_wall", json!(["1"])))
        .unwrap();
    let mut v = variable("v-wall", "node_wall", "wall_area");
    v.source_type = SourceType::Formula;
    v.source_ref = Some("node-formula:f-area".into());
    v.unit = Some("m²".into());
    store.upsert_variable(v).unwrap();

    let outcome =
        complete_duplication(&store, "node_wall", "node_wall-1", Suffix::new(1)).unwrap();
    assert!(outcome.variable_copied);

    let copied = store.variable_of_node("node_wall-1").unwrap().unwrap();
    assert_eq!(copied.id, "v-wall-1");
    assert_eq!(copied.exposed_key, "wall_area-1");
    assert_eq!(copied.source_ref.as_deref(), Some("node-formula:f-area-1"));
    assert_eq!(copied.unit.as_deref(), Some("m²"));

    let instance = store.node("node_wall-1").unwrap().unwrap();
    assert!(instance.flags.has_data);
    assert_eq!(instance.linked_variable_ids, vec!["v-wall-1"]);
}

#[test]
fn rerun_keeps_existing_instance_variable_id() {
    let store = seeded();
    store
        .upsert_variable(variable("v-wall", "node_wall", "wall_area"))
        .unwrap();

    complete_duplication(&store, "node_wall", "node_wall-1", Suffix::new(1)).unwrap();
    complete_duplication(&store, "node_wall", "node_wall-1", Suffix::new(1)).unwrap();

    let copied = store.variable_of_node("node_wall-1").unwrap().unwrap();
    assert_eq!(copied.id, "v-wall-1");
    // Still exactly one variable rides on the instance.
    assert_eq!(
        store
            .node("node_wall-1")
            .unwrap()
            .unwrap()
            .linked_variable_ids,
        vec!["v-wall-1"]
    );
}

#[test]
fn engine_facade_round_trip() {
    let store = seeded();
    store
        .upsert_formula(formula(
            "f-area",
            "node_wall",
            json!(["@value.node_height", "*", "@value.node_width"]),
        ))
        .unwrap();
    let engine = Engine::new(store);
    let outcome = engine
        .complete_duplication("node_wall", "node_wall-1", Suffix::new(1))
        .unwrap();
    assert_eq!(outcome.copy.counts.formulas, 1);
    assert_eq!(outcome.node_label, "Wall-1");
    assert!(
        engine
            .store()
            .formula("f-area-1")
            .unwrap()
            .is_some()
    );
}
