//! Store contract the engine consumes.
//!
//! Persistence technology is the caller's business; the engine only needs
//! CRUD-by-id, a handful of predicate queries, and upserts that are
//! idempotent on the unique id — a retried duplication must update the rows
//! the first attempt wrote, never produce a second copy.
//!
//! Every method is synchronous and takes `&self`: the engine is fully
//! sequential per call and never holds a read open across a write.

use thiserror::Error;

use treplica_common::EngineError;

use crate::model::{Condition, Formula, Node, Table, TableColumn, TableRow, Variable};

/// Backend failure. The engine wraps this into
/// [`EngineError::Store`] and aborts the current call.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        StoreError(msg.into())
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e.0)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait TreeStore {
    /* ── nodes ─────────────────────────────────────────────────────── */

    fn node(&self, id: &str) -> StoreResult<Option<Node>>;
    /// Create, or replace the row with the same id.
    fn upsert_node(&self, node: Node) -> StoreResult<()>;
    fn delete_node(&self, id: &str) -> StoreResult<()>;
    fn nodes_in_tree(&self, tree_id: &str) -> StoreResult<Vec<Node>>;
    fn all_nodes(&self) -> StoreResult<Vec<Node>>;
    /// Exact-label lookup within one tree.
    fn nodes_by_label(&self, tree_id: &str, label: &str) -> StoreResult<Vec<Node>>;
    /// Instances stamped as clones of the given repeater.
    fn nodes_by_repeater(&self, repeater_id: &str) -> StoreResult<Vec<Node>>;

    /* ── formulas ──────────────────────────────────────────────────── */

    fn formula(&self, id: &str) -> StoreResult<Option<Formula>>;
    fn formulas_of_node(&self, node_id: &str) -> StoreResult<Vec<Formula>>;
    fn upsert_formula(&self, formula: Formula) -> StoreResult<()>;
    fn delete_formula(&self, id: &str) -> StoreResult<()>;

    /* ── conditions ────────────────────────────────────────────────── */

    fn condition(&self, id: &str) -> StoreResult<Option<Condition>>;
    fn conditions_of_node(&self, node_id: &str) -> StoreResult<Vec<Condition>>;
    fn upsert_condition(&self, condition: Condition) -> StoreResult<()>;
    fn delete_condition(&self, id: &str) -> StoreResult<()>;

    /* ── tables ────────────────────────────────────────────────────── */

    fn table(&self, id: &str) -> StoreResult<Option<Table>>;
    fn tables_of_node(&self, node_id: &str) -> StoreResult<Vec<Table>>;
    fn upsert_table(&self, table: Table) -> StoreResult<()>;
    fn delete_table(&self, id: &str) -> StoreResult<()>;

    /// Columns ordered by `column_index`.
    fn columns_of_table(&self, table_id: &str) -> StoreResult<Vec<TableColumn>>;
    fn upsert_column(&self, column: TableColumn) -> StoreResult<()>;
    fn delete_columns_of_table(&self, table_id: &str) -> StoreResult<()>;

    /// Rows ordered by `row_index`.
    fn rows_of_table(&self, table_id: &str) -> StoreResult<Vec<TableRow>>;
    fn upsert_row(&self, row: TableRow) -> StoreResult<()>;
    fn delete_rows_of_table(&self, table_id: &str) -> StoreResult<()>;

    /* ── variables ─────────────────────────────────────────────────── */

    fn variable(&self, id: &str) -> StoreResult<Option<Variable>>;
    /// The node's 1:1 variable, if any.
    fn variable_of_node(&self, node_id: &str) -> StoreResult<Option<Variable>>;
    fn variable_by_exposed_key(&self, key: &str) -> StoreResult<Option<Variable>>;
    /// Every variable whose exposed key is `base` or `base-<digits>` — the
    /// template and all live instance copies.
    fn variables_sharing_key(&self, base: &str) -> StoreResult<Vec<Variable>>;
    fn upsert_variable(&self, variable: Variable) -> StoreResult<()>;
    fn delete_variable(&self, id: &str) -> StoreResult<()>;
}
