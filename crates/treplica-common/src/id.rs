//! The four independent id namespaces referenced from capacity payloads,
//! plus the entity vocabulary shared by errors and reports.
//!
//! Ids stay plain strings: they arrive from the authoring layer as UUIDs,
//! generated `node_<hash>` ids, or symbolic `shared-ref-*` keys, and the
//! suffix arithmetic in [`crate::suffix`] operates on all of them uniformly.

use std::fmt;

use serde::{Deserialize, Serialize};

pub type TreeId = String;
pub type NodeId = String;
pub type FormulaId = String;
pub type ConditionId = String;
pub type TableId = String;
pub type VariableId = String;

/// Prefix of symbolic cross-instance reference ids.
pub const SHARED_REF_PREFIX: &str = "shared-ref-";

/// Prefix of generated (non-UUID) node ids.
pub const GENERATED_NODE_PREFIX: &str = "node_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Tree,
    Node,
    Formula,
    Condition,
    Table,
    TableColumn,
    TableRow,
    Variable,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tree => "tree",
            Self::Node => "node",
            Self::Formula => "formula",
            Self::Condition => "condition",
            Self::Table => "table",
            Self::TableColumn => "table column",
            Self::TableRow => "table row",
            Self::Variable => "variable",
        })
    }
}
