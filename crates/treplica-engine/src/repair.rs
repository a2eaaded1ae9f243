//! Consistency Repair Job.
//!
//! Instances drift: an interrupted duplication can leave a node whose flags
//! claim a capacity it owns zero rows of. The repair job scans a tree (or
//! one repeater's clones), resolves each drifted instance back to its
//! template — provenance metadata first, label matching as an explicit,
//! logged fallback — and re-invokes the duplication service, which is
//! idempotent and therefore safe to aim at a half-copied node.
//!
//! Per-node failures are recorded in the report; the batch always runs to
//! the end.

use tracing::{debug, info_span, warn};

use treplica_common::{EngineResult, NodeId, Suffix, TreeId, split_last_suffix};

use crate::duplicate::{DuplicationOutcome, complete_duplication};
use crate::model::Node;
use crate::traits::TreeStore;

#[derive(Debug, Clone)]
pub enum RepairScope {
    Tree(TreeId),
    Repeater(NodeId),
}

/// How a drifted instance's template was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateResolution {
    /// `provenance.template_node_id` pointed straight at it.
    Provenance,
    /// Heuristic: strip the label suffix and match the bare label. Can
    /// misfire on duplicate labels, so it is always logged.
    LabelMatch,
}

#[derive(Debug, Clone)]
pub struct RepairEntry {
    pub node_id: NodeId,
    pub label: String,
    pub template_node_id: NodeId,
    pub resolution: TemplateResolution,
    pub outcome: DuplicationOutcome,
}

#[derive(Debug, Clone)]
pub struct RepairFailure {
    pub node_id: NodeId,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    /// Instance nodes examined (label carrying a numeric suffix).
    pub processed: usize,
    pub fixed: Vec<RepairEntry>,
    pub errors: Vec<RepairFailure>,
}

pub fn repair_tree_capacities<S: TreeStore>(
    store: &S,
    scope: Option<RepairScope>,
) -> EngineResult<RepairReport> {
    let _span = info_span!("repair_tree_capacities").entered();

    let candidates = match &scope {
        Some(RepairScope::Tree(tree_id)) => store.nodes_in_tree(tree_id)?,
        Some(RepairScope::Repeater(repeater_id)) => store.nodes_by_repeater(repeater_id)?,
        None => store.all_nodes()?,
    };

    let mut report = RepairReport::default();
    for node in candidates {
        let Some((_, suffix_value)) = split_last_suffix(&node.label) else {
            continue; // not an instance
        };
        report.processed += 1;

        let suffix = Suffix::new(suffix_value);
        if !is_drifted(store, &node)? {
            continue;
        }
        debug!(node = %node.id, label = %node.label, "instance flags overclaim owned capacities");

        let (template_id, resolution) = match resolve_template(store, &node, suffix)? {
            Some(found) => found,
            None => {
                warn!(node = %node.id, label = %node.label, "no template resolvable for instance");
                report.errors.push(RepairFailure {
                    node_id: node.id.clone(),
                    error: format!("no template resolvable for instance '{}'", node.label),
                });
                continue;
            }
        };

        match complete_duplication(store, &template_id, &node.id, suffix) {
            Ok(outcome) => report.fixed.push(RepairEntry {
                node_id: node.id.clone(),
                label: node.label.clone(),
                template_node_id: template_id,
                resolution,
                outcome,
            }),
            Err(e) => report.errors.push(RepairFailure {
                node_id: node.id.clone(),
                error: e.to_string(),
            }),
        }
    }
    Ok(report)
}

/// A node is drifted when any capability flag asserts a capacity with zero
/// matching owned rows. The reverse (rows without a flag) is healed by the
/// same re-copy, but does not by itself trigger one.
fn is_drifted<S: TreeStore>(store: &S, node: &Node) -> EngineResult<bool> {
    if node.flags.has_formula && store.formulas_of_node(&node.id)?.is_empty() {
        return Ok(true);
    }
    if node.flags.has_condition && store.conditions_of_node(&node.id)?.is_empty() {
        return Ok(true);
    }
    if node.flags.has_table && store.tables_of_node(&node.id)?.is_empty() {
        return Ok(true);
    }
    if node.flags.has_data && store.variable_of_node(&node.id)?.is_none() {
        return Ok(true);
    }
    Ok(false)
}

fn resolve_template<S: TreeStore>(
    store: &S,
    node: &Node,
    suffix: Suffix,
) -> EngineResult<Option<(NodeId, TemplateResolution)>> {
    if let Some(template_id) = &node.provenance.template_node_id {
        if store.node(template_id)?.is_some() {
            return Ok(Some((template_id.clone(), TemplateResolution::Provenance)));
        }
        warn!(
            node = %node.id,
            template = %template_id,
            "provenance names a template that no longer exists, trying label match"
        );
    }

    let Some(base_label) = node.label.strip_suffix(&suffix.tag()) else {
        return Ok(None);
    };
    let matches: Vec<Node> = store
        .nodes_by_label(&node.tree_id, base_label)?
        .into_iter()
        .filter(|n| n.id != node.id)
        .collect();
    match matches.as_slice() {
        [] => Ok(None),
        [only] => {
            warn!(
                node = %node.id,
                template = %only.id,
                label = base_label,
                "template resolved by label fallback"
            );
            Ok(Some((only.id.clone(), TemplateResolution::LabelMatch)))
        }
        [first, ..] => {
            warn!(
                node = %node.id,
                template = %first.id,
                label = base_label,
                candidates = matches.len(),
                "label fallback is ambiguous, taking first match"
            );
            Ok(Some((first.id.clone(), TemplateResolution::LabelMatch)))
        }
    }
}
