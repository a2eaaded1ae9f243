//! In-memory store backend.
//!
//! BTreeMap tables behind a single `parking_lot::RwLock`, so iteration order
//! (and therefore everything derived from a scan, like sibling remap
//! derivation) is deterministic. This is the backend the test suite runs
//! against and a reference implementation of the [`TreeStore`] contract.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::model::{Condition, Formula, Node, Table, TableColumn, TableRow, Variable};
use crate::traits::{StoreResult, TreeStore};

#[derive(Debug, Default)]
struct Tables {
    nodes: BTreeMap<String, Node>,
    formulas: BTreeMap<String, Formula>,
    conditions: BTreeMap<String, Condition>,
    tables: BTreeMap<String, Table>,
    columns: BTreeMap<String, TableColumn>,
    rows: BTreeMap<String, TableRow>,
    variables: BTreeMap<String, Variable>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed helper used by tests and examples.
    pub fn with_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let store = Self::new();
        {
            let mut t = store.inner.write();
            for n in nodes {
                t.nodes.insert(n.id.clone(), n);
            }
        }
        store
    }
}

impl TreeStore for MemoryStore {
    fn node(&self, id: &str) -> StoreResult<Option<Node>> {
        Ok(self.inner.read().nodes.get(id).cloned())
    }

    fn upsert_node(&self, node: Node) -> StoreResult<()> {
        self.inner.write().nodes.insert(node.id.clone(), node);
        Ok(())
    }

    fn delete_node(&self, id: &str) -> StoreResult<()> {
        self.inner.write().nodes.remove(id);
        Ok(())
    }

    fn nodes_in_tree(&self, tree_id: &str) -> StoreResult<Vec<Node>> {
        Ok(self
            .inner
            .read()
            .nodes
            .values()
            .filter(|n| n.tree_id == tree_id)
            .cloned()
            .collect())
    }

    fn all_nodes(&self) -> StoreResult<Vec<Node>> {
        Ok(self.inner.read().nodes.values().cloned().collect())
    }

    fn nodes_by_label(&self, tree_id: &str, label: &str) -> StoreResult<Vec<Node>> {
        Ok(self
            .inner
            .read()
            .nodes
            .values()
            .filter(|n| n.tree_id == tree_id && n.label == label)
            .cloned()
            .collect())
    }

    fn nodes_by_repeater(&self, repeater_id: &str) -> StoreResult<Vec<Node>> {
        Ok(self
            .inner
            .read()
            .nodes
            .values()
            .filter(|n| n.provenance.repeater_id.as_deref() == Some(repeater_id))
            .cloned()
            .collect())
    }

    fn formula(&self, id: &str) -> StoreResult<Option<Formula>> {
        Ok(self.inner.read().formulas.get(id).cloned())
    }

    fn formulas_of_node(&self, node_id: &str) -> StoreResult<Vec<Formula>> {
        Ok(self
            .inner
            .read()
            .formulas
            .values()
            .filter(|f| f.node_id == node_id)
            .cloned()
            .collect())
    }

    fn upsert_formula(&self, formula: Formula) -> StoreResult<()> {
        self.inner
            .write()
            .formulas
            .insert(formula.id.clone(), formula);
        Ok(())
    }

    fn delete_formula(&self, id: &str) -> StoreResult<()> {
        self.inner.write().formulas.remove(id);
        Ok(())
    }

    fn condition(&self, id: &str) -> StoreResult<Option<Condition>> {
        Ok(self.inner.read().conditions.get(id).cloned())
    }

    fn conditions_of_node(&self, node_id: &str) -> StoreResult<Vec<Condition>> {
        Ok(self
            .inner
            .read()
            .conditions
            .values()
            .filter(|c| c.node_id == node_id)
            .cloned()
            .collect())
    }

    fn upsert_condition(&self, condition: Condition) -> StoreResult<()> {
        self.inner
            .write()
            .conditions
            .insert(condition.id.clone(), condition);
        Ok(())
    }

    fn delete_condition(&self, id: &str) -> StoreResult<()> {
        self.inner.write().conditions.remove(id);
        Ok(())
    }

    fn table(&self, id: &str) -> StoreResult<Option<Table>> {
        Ok(self.inner.read().tables.get(id).cloned())
    }

    fn tables_of_node(&self, node_id: &str) -> StoreResult<Vec<Table>> {
        Ok(self
            .inner
            .read()
            .tables
            .values()
            .filter(|t| t.node_id == node_id)
            .cloned()
            .collect())
    }

    fn upsert_table(&self, table: Table) -> StoreResult<()> {
        self.inner.write().tables.insert(table.id.clone(), table);
        Ok(())
    }

    fn delete_table(&self, id: &str) -> StoreResult<()> {
        self.inner.write().tables.remove(id);
        Ok(())
    }

    fn columns_of_table(&self, table_id: &str) -> StoreResult<Vec<TableColumn>> {
        let mut cols: Vec<TableColumn> = self
            .inner
            .read()
            .columns
            .values()
            .filter(|c| c.table_id == table_id)
            .cloned()
            .collect();
        cols.sort_by_key(|c| c.column_index);
        Ok(cols)
    }

    fn upsert_column(&self, column: TableColumn) -> StoreResult<()> {
        self.inner
            .write()
            .columns
            .insert(column.id.clone(), column);
        Ok(())
    }

    fn delete_columns_of_table(&self, table_id: &str) -> StoreResult<()> {
        self.inner
            .write()
            .columns
            .retain(|_, c| c.table_id != table_id);
        Ok(())
    }

    fn rows_of_table(&self, table_id: &str) -> StoreResult<Vec<TableRow>> {
        let mut rows: Vec<TableRow> = self
            .inner
            .read()
            .rows
            .values()
            .filter(|r| r.table_id == table_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.row_index);
        Ok(rows)
    }

    fn upsert_row(&self, row: TableRow) -> StoreResult<()> {
        self.inner.write().rows.insert(row.id.clone(), row);
        Ok(())
    }

    fn delete_rows_of_table(&self, table_id: &str) -> StoreResult<()> {
        self.inner.write().rows.retain(|_, r| r.table_id != table_id);
        Ok(())
    }

    fn variable(&self, id: &str) -> StoreResult<Option<Variable>> {
        Ok(self.inner.read().variables.get(id).cloned())
    }

    fn variable_of_node(&self, node_id: &str) -> StoreResult<Option<Variable>> {
        Ok(self
            .inner
            .read()
            .variables
            .values()
            .find(|v| v.node_id == node_id)
            .cloned())
    }

    fn variable_by_exposed_key(&self, key: &str) -> StoreResult<Option<Variable>> {
        Ok(self
            .inner
            .read()
            .variables
            .values()
            .find(|v| v.exposed_key == key)
            .cloned())
    }

    fn variables_sharing_key(&self, base: &str) -> StoreResult<Vec<Variable>> {
        Ok(self
            .inner
            .read()
            .variables
            .values()
            .filter(|v| {
                if v.exposed_key == base {
                    return true;
                }
                v.exposed_key
                    .strip_prefix(base)
                    .and_then(|rest| rest.strip_prefix('-'))
                    .is_some_and(|digits| {
                        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
                    })
            })
            .cloned()
            .collect())
    }

    fn upsert_variable(&self, variable: Variable) -> StoreResult<()> {
        self.inner
            .write()
            .variables
            .insert(variable.id.clone(), variable);
        Ok(())
    }

    fn delete_variable(&self, id: &str) -> StoreResult<()> {
        self.inner.write().variables.remove(id);
        Ok(())
    }
}
