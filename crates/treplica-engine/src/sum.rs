//! Sum Aggregate Maintainer.
//!
//! An author can ask for a derived "Total" field over a repeatable
//! variable: a hidden node + variable + formula whose token list sums every
//! live instance of the variable (`@value.n1 + @value.n2 + …`). Membership
//! is keyed on the exposed key with the trailing numeric suffix stripped,
//! so the template and all of its clones group together.
//!
//! Creation is an upsert at every level — existing ids always win, so a
//! retried call or a refresh never forks a second Total. Only a unique
//! exposed-key collision with an unrelated variable is disambiguated, with
//! a time-derived suffix on the key.

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info_span};

use treplica_common::{EngineError, EngineResult, EntityKind, NodeId, strip_numeric_suffixes};

use crate::model::{Formula, Node, NodeType, SourceType, Variable};
use crate::traits::TreeStore;

#[derive(Debug, Clone)]
pub struct SumField {
    pub sum_node_id: NodeId,
    pub sum_variable_id: String,
    pub sum_formula_id: String,
    pub member_count: usize,
    pub tokens: Vec<String>,
}

/// Create or refresh the Total field for the variable owned by
/// `source_node_id`.
pub fn upsert_sum_field<S: TreeStore>(store: &S, source_node_id: &str) -> EngineResult<SumField> {
    let _span = info_span!("upsert_sum_field", source = source_node_id).entered();

    let mut source = store
        .node(source_node_id)?
        .ok_or_else(|| EngineError::not_found(EntityKind::Node, source_node_id))?;
    let variable = store
        .variable_of_node(source_node_id)?
        .ok_or_else(|| EngineError::not_found(EntityKind::Variable, source_node_id))?;

    let base_key = strip_numeric_suffixes(&variable.exposed_key).to_string();
    let members = sum_members(store, &base_key)?;
    let tokens = sum_tokens(&members);
    let max_order = members.iter().map(|(_, n)| n.order).max().unwrap_or(source.order);

    let sum_node_id = format!("{source_node_id}-sum-total");
    let sum_formula_id = format!("{}-sum-formula", variable.id);
    let display_base = variable
        .display_name
        .clone()
        .unwrap_or_else(|| source.label.clone());
    let label = format!("{display_base} - Total");

    // Node: hidden, non-interactive, positioned just after the
    // highest-ordered instance.
    let mut node = store.node(&sum_node_id)?.unwrap_or_else(|| {
        let mut n = Node::new(sum_node_id.clone(), source.tree_id.clone(), label.clone());
        n.parent_id = source.parent_id.clone();
        n
    });
    node.label = label.clone();
    node.node_type = NodeType::LeafField;
    node.visible_to_user = false;
    node.order = max_order + 1;
    node.flags.has_data = true;
    node.flags.has_formula = true;
    node.formula_active_id = Some(sum_formula_id.clone());
    if !node.linked_formula_ids.contains(&sum_formula_id) {
        node.linked_formula_ids.push(sum_formula_id.clone());
    }
    store.upsert_node(node)?;

    // Variable: an existing one on the Total node keeps its id.
    let sum_display = format!("{display_base} - Total");
    let sum_variable_id = match store.variable_of_node(&sum_node_id)? {
        Some(mut existing) => {
            existing.display_name = Some(sum_display);
            existing.source_type = SourceType::Formula;
            existing.source_ref = Some(format!("node-formula:{sum_formula_id}"));
            existing.unit = variable.unit.clone();
            existing.precision = variable.precision;
            let id = existing.id.clone();
            store.upsert_variable(existing)?;
            id
        }
        None => {
            let id = format!("{}-sum-total", variable.id);
            let mut exposed_key = format!("{base_key}_TOTAL");
            if store.variable_by_exposed_key(&exposed_key)?.is_some() {
                // Unrelated variable already claims the key; disambiguate.
                exposed_key = format!("{exposed_key}_{}", Utc::now().timestamp_millis());
            }
            store.upsert_variable(Variable {
                id: id.clone(),
                node_id: sum_node_id.clone(),
                exposed_key,
                display_name: Some(sum_display),
                source_type: SourceType::Formula,
                source_ref: Some(format!("node-formula:{sum_formula_id}")),
                unit: variable.unit.clone(),
                precision: variable.precision,
                visible_to_user: true,
            })?;
            id
        }
    };

    // Formula: update tokens in place, or create.
    let formula = match store.formula(&sum_formula_id)? {
        Some(mut existing) => {
            existing.node_id = sum_node_id.clone();
            existing.tokens = json!(tokens);
            existing
        }
        None => Formula {
            id: sum_formula_id.clone(),
            node_id: sum_node_id.clone(),
            name: Some(format!("Sum {display_base}")),
            description: Some(format!("Automatic sum of every copy of {display_base}")),
            tokens: json!(tokens),
        },
    };
    store.upsert_formula(formula)?;

    source.wants_sum_total = true;
    source.sum_node_id = Some(sum_node_id.clone());
    store.upsert_node(source)?;

    Ok(SumField {
        sum_node_id,
        sum_variable_id,
        sum_formula_id,
        member_count: members.len(),
        tokens,
    })
}

/// Recompute membership and rewrite only the existing Total formula's
/// tokens. The Total node's identity is stable across refreshes; if the
/// source never asked for a Total (or it is gone), this is a no-op.
pub fn on_instance_set_changed<S: TreeStore>(
    store: &S,
    source_node_id: &str,
) -> EngineResult<()> {
    let Some(source) = store.node(source_node_id)? else {
        return Ok(());
    };
    if !source.wants_sum_total {
        return Ok(());
    }
    let Some(sum_node_id) = source.sum_node_id.clone() else {
        return Ok(());
    };
    let Some(variable) = store.variable_of_node(source_node_id)? else {
        return Ok(());
    };
    if store.node(&sum_node_id)?.is_none() {
        debug!(sum_node = %sum_node_id, "total node not materialized yet, skipping refresh");
        return Ok(());
    }

    let base_key = strip_numeric_suffixes(&variable.exposed_key).to_string();
    let members = sum_members(store, &base_key)?;
    let tokens = sum_tokens(&members);

    let sum_formula_id = format!("{}-sum-formula", variable.id);
    let formula = match store.formula(&sum_formula_id)? {
        Some(mut existing) => {
            existing.tokens = json!(tokens);
            existing
        }
        None => Formula {
            id: sum_formula_id.clone(),
            node_id: sum_node_id,
            name: Some(format!(
                "Sum {}",
                variable.display_name.as_deref().unwrap_or(&base_key)
            )),
            description: None,
            tokens: json!(tokens),
        },
    };
    store.upsert_formula(formula)?;
    Ok(())
}

/// Delete the Total formula, variable and node, and clear the source's
/// wants-total flag.
pub fn remove_sum_field<S: TreeStore>(store: &S, source_node_id: &str) -> EngineResult<()> {
    let mut source = store
        .node(source_node_id)?
        .ok_or_else(|| EngineError::not_found(EntityKind::Node, source_node_id))?;
    let sum_node_id = source
        .sum_node_id
        .clone()
        .unwrap_or_else(|| format!("{source_node_id}-sum-total"));

    if let Some(variable) = store.variable_of_node(source_node_id)? {
        store.delete_formula(&format!("{}-sum-formula", variable.id))?;
    }
    if let Some(sum_variable) = store.variable_of_node(&sum_node_id)? {
        store.delete_variable(&sum_variable.id)?;
    }
    store.delete_node(&sum_node_id)?;

    source.wants_sum_total = false;
    source.sum_node_id = None;
    store.upsert_node(source)?;
    Ok(())
}

/// The template variable and every live instance copy, ordered template
/// first then ascending instance suffix, each paired with its owner node.
/// A variable whose owner node is gone no longer counts as live.
fn sum_members<S: TreeStore>(
    store: &S,
    base_key: &str,
) -> EngineResult<Vec<(Variable, Node)>> {
    let mut variables = store.variables_sharing_key(base_key)?;
    variables.sort_by_key(|v| member_rank(base_key, &v.exposed_key));
    let mut members = Vec::new();
    for variable in variables {
        match store.node(&variable.node_id)? {
            Some(node) => members.push((variable, node)),
            None => {
                debug!(variable = %variable.id, "owner node gone, excluding from sum")
            }
        }
    }
    Ok(members)
}

fn member_rank(base_key: &str, exposed_key: &str) -> u64 {
    exposed_key
        .strip_prefix(base_key)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|digits| digits.parse::<u64>().ok())
        .map(|n| n + 1)
        .unwrap_or(0)
}

/// `[@value.n1, '+', @value.n2, …]`, or `['0']` when no instance is live.
fn sum_tokens(members: &[(Variable, Node)]) -> Vec<String> {
    let mut tokens = Vec::with_capacity(members.len() * 2);
    for (index, (_, node)) in members.iter().enumerate() {
        if index > 0 {
            tokens.push("+".to_string());
        }
        tokens.push(format!("@value.{}", node.id));
    }
    if tokens.is_empty() {
        tokens.push("0".to_string());
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_rank_orders_template_first() {
        assert_eq!(member_rank("wall_area", "wall_area"), 0);
        assert_eq!(member_rank("wall_area", "wall_area-1"), 2);
        assert_eq!(member_rank("wall_area", "wall_area-2"), 3);
        assert!(member_rank("wall_area", "wall_area-1") < member_rank("wall_area", "wall_area-10"));
    }

    #[test]
    fn zero_members_sum_to_literal_zero() {
        assert_eq!(sum_tokens(&[]), vec!["0".to_string()]);
    }
}
