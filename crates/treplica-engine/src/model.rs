//! Persistent entities the engine reads and writes.
//!
//! Wire names are camelCase (the authoring layer's JSON vocabulary).
//! Free-form payloads — formula tokens, condition expressions, cell grids,
//! field configuration — stay `serde_json::Value`; the skeletons the engine
//! must walk structurally (condition branches, table lookup meta) are typed,
//! with `#[serde(flatten)]` catch-alls so unknown authoring-layer keys
//! survive a copy untouched.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use treplica_common::{ConditionId, FormulaId, NodeId, TableId, TreeId, VariableId};

/* ───────────────────────────── Nodes ─────────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Branch,
    #[default]
    LeafField,
    LeafOption,
    Section,
    Repeater,
}

/// Which capacity kinds a node claims to own. After a copy or repair these
/// must equal what actually exists under the node, never what the template
/// owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CapabilityFlags {
    pub has_formula: bool,
    pub has_condition: bool,
    pub has_table: bool,
    pub has_data: bool,
}

/// Where an instance node came from. `template_node_id` is authoritative;
/// the repair job falls back to label matching only when it is absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeater_id: Option<NodeId>,
}

/// Cached evaluator output. Cleared whenever capacities are (re)copied so a
/// stale template result can never show through on an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedValue {
    pub value: Value,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub tree_id: TreeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    pub label: String,
    #[serde(default)]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub visible_to_user: bool,

    #[serde(flatten)]
    pub flags: CapabilityFlags,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_active_id: Option<FormulaId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_active_id: Option<ConditionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_active_id: Option<TableId>,

    /// Per-table free-form configuration, keyed by table id. Keys are
    /// remapped alongside the tables themselves on copy.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub table_instances: BTreeMap<TableId, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_formula_ids: Vec<FormulaId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_condition_ids: Vec<ConditionId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_table_ids: Vec<TableId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_variable_ids: Vec<VariableId>,

    /// Free-form field configuration; may carry `lookupTableId` /
    /// `lookupNodeId` pointers that must follow the copied tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_config: Option<Value>,

    #[serde(default)]
    pub provenance: Provenance,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed: Option<ComputedValue>,

    /// The author asked for a derived "Total" field over this node's
    /// variable instances.
    #[serde(default)]
    pub wants_sum_total: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum_node_id: Option<NodeId>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, tree_id: impl Into<TreeId>, label: impl Into<String>) -> Self {
        Node {
            id: id.into(),
            tree_id: tree_id.into(),
            label: label.into(),
            visible_to_user: true,
            ..Node::default()
        }
    }
}

/* ─────────────────────────── Capacities ──────────────────────────── */

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Formula {
    pub id: FormulaId,
    pub node_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered token sequence: operators, literals, references.
    #[serde(default)]
    pub tokens: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: ConditionId,
    pub node_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub condition_set: Value,
}

/// Typed skeleton of a condition payload. Everything the engine does not
/// rewrite structurally rides along in the `extra` flatten maps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<ConditionBranch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<ConditionFallback>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionBranch {
    #[serde(default)]
    pub id: String,
    /// Boolean expression tree; rewritten leaf-wise, never restructured.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub when: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ConditionAction>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionFallback {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ConditionAction>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionAction {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_ids: Vec<NodeId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/* ───────────────────────────── Tables ────────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    #[default]
    Flat,
    Matrix,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: TableId,
    pub node_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub kind: TableKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<TableMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_select_column: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lookup_display_columns: Vec<String>,
    #[serde(default)]
    pub row_count: u32,
    #[serde(default)]
    pub column_count: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup: Option<LookupMeta>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectors: Option<LookupSelectors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_source_option: Option<AxisSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_source_option: Option<AxisSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_column: Option<DisplayTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_row: Option<DisplayTarget>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupSelectors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_field_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_field_id: Option<NodeId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One axis of a lookup: which live field drives it and which column it is
/// compared against. `comparison_column` may be a column *name* (suffixed on
/// copy) or a numeric literal (never touched).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_field: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison_column: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Display column/row selection: a single column name or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisplayTarget {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumn {
    pub id: String,
    pub table_id: TableId,
    pub column_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub column_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub id: String,
    pub table_id: TableId,
    pub row_index: u32,
    /// Cell grid, copied verbatim between instances.
    #[serde(default)]
    pub cells: Value,
}

/* ─────────────────────────── Variables ───────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Formula,
    Condition,
    Table,
    #[default]
    Data,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub id: VariableId,
    /// Owning node; exactly one variable per node.
    pub node_id: NodeId,
    /// Global symbol other formulas address this variable by.
    pub exposed_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u8>,
    #[serde(default)]
    pub visible_to_user: bool,
}
