#![allow(dead_code)]

use serde_json::Value;

use treplica_engine::{
    Formula, MemoryStore, Node, Table, TableColumn, TableRow, TreeStore, Variable,
};

pub const TREE: &str = "tree-main";

pub fn node(id: &str, label: &str) -> Node {
    Node::new(id, TREE, label)
}

pub fn formula(id: &str, node_id: &str, tokens: Value) -> Formula {
    Formula {
        id: id.into(),
        node_id: node_id.into(),
        name: Some(format!("{id} name")),
        tokens,
        ..Formula::default()
    }
}

pub fn table(id: &str, node_id: &str, name: &str) -> Table {
    Table {
        id: id.into(),
        node_id: node_id.into(),
        name: Some(name.into()),
        ..Table::default()
    }
}

pub fn column(id: &str, table_id: &str, index: u32, name: &str) -> TableColumn {
    TableColumn {
        id: id.into(),
        table_id: table_id.into(),
        column_index: index,
        name: Some(name.into()),
        column_type: "text".into(),
        ..TableColumn::default()
    }
}

pub fn row(id: &str, table_id: &str, index: u32, cells: Value) -> TableRow {
    TableRow {
        id: id.into(),
        table_id: table_id.into(),
        row_index: index,
        cells,
    }
}

pub fn variable(id: &str, node_id: &str, exposed_key: &str) -> Variable {
    Variable {
        id: id.into(),
        node_id: node_id.into(),
        exposed_key: exposed_key.into(),
        display_name: Some(exposed_key.replace('_', " ")),
        visible_to_user: true,
        ..Variable::default()
    }
}

/// A "Wall" template with two sibling fields and a first instance shell, the
/// way the external repeater handler lays them out before invoking the
/// engine.
pub fn seed_wall(store: &MemoryStore) {
    for (id, label) in [
        ("node_wall", "Wall"),
        ("node_height", "Height"),
        ("node_width", "Width"),
        ("node_wall-1", "Wall-1"),
        ("node_height-1", "Height-1"),
        ("node_width-1", "Width-1"),
    ] {
        store.upsert_node(node(id, label)).unwrap();
    }
}
