//! Link-index helpers.
//!
//! Nodes carry deduplicated "who depends on me" id arrays per capacity
//! kind. After a capacity is copied, its owner gets a back-link and so does
//! every node the rewritten payload references, so a structural change can
//! find affected capacities without scanning payload text.

use serde_json::Value;
use tracing::debug;

use treplica_common::EngineResult;
use treplica_rewrite::collect_node_refs;

use crate::traits::TreeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Formula,
    Condition,
    Table,
    Variable,
}

/// Append `ids` to the node's link array for `kind`, keeping order and
/// dropping duplicates. A missing node is logged and skipped — link upkeep
/// never fails a copy.
pub fn add_links<S: TreeStore>(
    store: &S,
    node_id: &str,
    kind: LinkKind,
    ids: &[String],
) -> EngineResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let Some(mut node) = store.node(node_id)? else {
        debug!(node = %node_id, "link target missing, skipping back-link");
        return Ok(());
    };
    let list = match kind {
        LinkKind::Formula => &mut node.linked_formula_ids,
        LinkKind::Condition => &mut node.linked_condition_ids,
        LinkKind::Table => &mut node.linked_table_ids,
        LinkKind::Variable => &mut node.linked_variable_ids,
    };
    let mut changed = false;
    for id in ids {
        if !list.contains(id) {
            list.push(id.clone());
            changed = true;
        }
    }
    if changed {
        store.upsert_node(node)?;
    }
    Ok(())
}

/// Back-link `capacity_id` onto every node the rewritten payload
/// references (excluding the owner, which is linked separately).
pub fn link_referenced_nodes<S: TreeStore>(
    store: &S,
    payload: &Value,
    kind: LinkKind,
    capacity_id: &str,
    owner_node_id: &str,
) -> EngineResult<()> {
    let capacity = [capacity_id.to_string()];
    for node_id in collect_node_refs(payload) {
        if node_id != owner_node_id {
            add_links(store, &node_id, kind, &capacity)?;
        }
    }
    Ok(())
}
