//! Capacity Copy Service.
//!
//! Clones a template node's formulas, conditions and tables onto an
//! instance node. Target ids derive deterministically from the template ids
//! and the suffix, and every write is an upsert, so a retried copy with the
//! same arguments converges onto the rows the first attempt wrote.
//!
//! A failing capacity is logged and skipped; its siblings still copy. The
//! engine favors a partially-working instance over an all-or-nothing abort
//! — only a missing template or instance node fails the call.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use tracing::{debug, info_span, warn};

use treplica_common::{
    EngineError, EngineResult, EntityKind, Suffix, is_numeric_literal, strip_numeric_suffixes,
};
use treplica_rewrite::{RefKind, force_shared_ref_suffix, rewrite_str, rewrite_value};

use crate::context::DuplicationContext;
use crate::links::{self, LinkKind};
use crate::model::{
    AxisSource, CapabilityFlags, Condition, ConditionAction, ConditionBranch, ConditionSet,
    DisplayTarget, Formula, Node, Table, TableColumn, TableMeta, TableRow,
};
use crate::traits::TreeStore;

#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    /// Node remap to use instead of deriving one from sibling ids.
    pub node_id_remap: Option<FxHashMap<String, String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyCounts {
    pub formulas: usize,
    pub conditions: usize,
    pub tables: usize,
    pub columns: usize,
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct SkippedCapacity {
    pub kind: EntityKind,
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct CopyReport {
    pub counts: CopyCounts,
    pub flags: CapabilityFlags,
    pub skipped: Vec<SkippedCapacity>,
}

pub fn copy_capacities<S: TreeStore>(
    store: &S,
    template_node_id: &str,
    instance_node_id: &str,
    suffix: Suffix,
    options: CopyOptions,
) -> EngineResult<CopyReport> {
    copy_capacities_with_context(store, template_node_id, instance_node_id, suffix, options)
        .map(|(report, _)| report)
}

/// As [`copy_capacities`], also returning the accumulated context so
/// wrapping services can keep resolving through the same maps.
pub(crate) fn copy_capacities_with_context<S: TreeStore>(
    store: &S,
    template_node_id: &str,
    instance_node_id: &str,
    suffix: Suffix,
    options: CopyOptions,
) -> EngineResult<(CopyReport, DuplicationContext)> {
    let _span = info_span!(
        "copy_capacities",
        template = template_node_id,
        instance = instance_node_id,
        suffix = %suffix
    )
    .entered();

    let template = store
        .node(template_node_id)?
        .ok_or_else(|| EngineError::not_found(EntityKind::Node, template_node_id))?;
    store
        .node(instance_node_id)?
        .ok_or_else(|| EngineError::not_found(EntityKind::Node, instance_node_id))?;

    let node_map = match options.node_id_remap {
        Some(map) => map,
        None => derive_sibling_remap(store, &template.tree_id, suffix)?,
    };
    let mut ctx = DuplicationContext::new(template_node_id, instance_node_id, suffix, node_map);

    let mut counts = CopyCounts::default();
    let mut skipped = Vec::new();

    for formula in store.formulas_of_node(&template.id)? {
        match copy_formula(store, &formula, &ctx) {
            Ok(new_id) => {
                counts.formulas += 1;
                ctx.record_formula(&formula.id, new_id);
            }
            Err(e) => {
                warn!(formula = %formula.id, error = %e, "formula copy failed, skipping");
                skipped.push(SkippedCapacity {
                    kind: EntityKind::Formula,
                    id: formula.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    for condition in store.conditions_of_node(&template.id)? {
        match copy_condition(store, &condition, &ctx) {
            Ok((new_id, created)) => {
                if created {
                    counts.conditions += 1;
                }
                ctx.record_condition(&condition.id, new_id);
            }
            Err(e) => {
                warn!(condition = %condition.id, error = %e, "condition copy failed, skipping");
                skipped.push(SkippedCapacity {
                    kind: EntityKind::Condition,
                    id: condition.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    for table in store.tables_of_node(&template.id)? {
        match copy_table(store, &table, &ctx, &mut counts) {
            Ok((new_id, created)) => {
                if created {
                    counts.tables += 1;
                }
                ctx.record_table(&table.id, new_id);
            }
            Err(e) => {
                warn!(table = %table.id, error = %e, "table copy failed, skipping");
                skipped.push(SkippedCapacity {
                    kind: EntityKind::Table,
                    id: table.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let flags = reconcile_instance(store, &template, &ctx)?;

    Ok((
        CopyReport {
            counts,
            flags,
            skipped,
        },
        ctx,
    ))
}

/// Map every sibling instance id in the tree back to its base: a node whose
/// id is `<base>-<suffix>` yields `base → base-<suffix>`, so intra-template
/// references between siblings land on the sibling's copy.
fn derive_sibling_remap<S: TreeStore>(
    store: &S,
    tree_id: &str,
    suffix: Suffix,
) -> EngineResult<FxHashMap<String, String>> {
    let mut map = FxHashMap::default();
    for node in store.nodes_in_tree(tree_id)? {
        if suffix.matches(&node.id) {
            map.insert(
                strip_numeric_suffixes(&node.id).to_string(),
                node.id.clone(),
            );
        }
    }
    debug!(entries = map.len(), "derived sibling node remap");
    Ok(map)
}

fn copy_formula<S: TreeStore>(
    store: &S,
    template: &Formula,
    ctx: &DuplicationContext,
) -> EngineResult<String> {
    let new_id = ctx.suffix.apply(&template.id);
    let tokens = force_shared_ref_suffix(
        &rewrite_value(&template.tokens, &ctx.rewrite()),
        ctx.suffix,
    );
    store.upsert_formula(Formula {
        id: new_id.clone(),
        node_id: ctx.instance_node_id.clone(),
        name: template.name.as_deref().map(|n| ctx.suffix.apply(n)),
        description: template.description.clone(),
        tokens: tokens.clone(),
    })?;
    links::add_links(
        store,
        &ctx.instance_node_id,
        LinkKind::Formula,
        std::slice::from_ref(&new_id),
    )?;
    links::link_referenced_nodes(store, &tokens, LinkKind::Formula, &new_id, &ctx.instance_node_id)?;
    Ok(new_id)
}

fn copy_condition<S: TreeStore>(
    store: &S,
    template: &Condition,
    ctx: &DuplicationContext,
) -> EngineResult<(String, bool)> {
    let new_id = ctx.suffix.apply(&template.id);
    if store.condition(&new_id)?.is_some() {
        debug!(condition = %new_id, "condition copy already present");
        return Ok((new_id, false));
    }
    let set = rewrite_condition_set(&template.condition_set, ctx);
    store.upsert_condition(Condition {
        id: new_id.clone(),
        node_id: ctx.instance_node_id.clone(),
        name: template.name.as_deref().map(|n| ctx.suffix.apply(n)),
        description: template.description.clone(),
        condition_set: set.clone(),
    })?;
    links::add_links(
        store,
        &ctx.instance_node_id,
        LinkKind::Condition,
        std::slice::from_ref(&new_id),
    )?;
    links::link_referenced_nodes(
        store,
        &set,
        LinkKind::Condition,
        &new_id,
        &ctx.instance_node_id,
    )?;
    Ok((new_id, true))
}

/// Rewrite a condition payload: reference tokens through the general pass,
/// plus a structural walk that suffixes every `id` field inside branches,
/// fallback and actions, and resolves the naked ids in `nodeIds` arrays.
/// A payload that does not parse as a condition skeleton falls back to the
/// generic JSON walk so nothing is ever dropped.
fn rewrite_condition_set(value: &Value, ctx: &DuplicationContext) -> Value {
    match serde_json::from_value::<ConditionSet>(value.clone()) {
        Ok(mut set) => {
            if let Some(tokens) = &set.tokens {
                set.tokens = Some(rewrite_value(tokens, &ctx.rewrite()));
            }
            for branch in &mut set.branches {
                rewrite_branch(branch, ctx);
            }
            if let Some(fallback) = &mut set.fallback {
                if !fallback.id.is_empty() {
                    fallback.id = ctx.suffix.apply(&fallback.id);
                }
                for action in &mut fallback.actions {
                    rewrite_action(action, ctx);
                }
                rewrite_extra(&mut fallback.extra, ctx);
            }
            rewrite_extra(&mut set.extra, ctx);
            serde_json::to_value(&set)
                .unwrap_or_else(|_| rewrite_value(value, &ctx.rewrite()))
        }
        Err(_) => rewrite_value(value, &ctx.rewrite()),
    }
}

fn rewrite_branch(branch: &mut ConditionBranch, ctx: &DuplicationContext) {
    if !branch.id.is_empty() {
        branch.id = ctx.suffix.apply(&branch.id);
    }
    branch.when = rewrite_value(&branch.when, &ctx.rewrite());
    for action in &mut branch.actions {
        rewrite_action(action, ctx);
    }
    rewrite_extra(&mut branch.extra, ctx);
}

fn rewrite_action(action: &mut ConditionAction, ctx: &DuplicationContext) {
    if !action.id.is_empty() {
        action.id = ctx.suffix.apply(&action.id);
    }
    for node_id in &mut action.node_ids {
        *node_id = rewrite_str(node_id, &ctx.rewrite());
    }
    rewrite_extra(&mut action.extra, ctx);
}

fn rewrite_extra(extra: &mut Map<String, Value>, ctx: &DuplicationContext) {
    for value in extra.values_mut() {
        let rewritten = rewrite_value(value, &ctx.rewrite());
        *value = force_shared_ref_suffix(&rewritten, ctx.suffix);
    }
}

fn copy_table<S: TreeStore>(
    store: &S,
    template: &Table,
    ctx: &DuplicationContext,
    counts: &mut CopyCounts,
) -> EngineResult<(String, bool)> {
    let new_id = ctx.suffix.apply(&template.id);
    if store.table(&new_id)?.is_some() {
        debug!(table = %new_id, "table copy already present");
        return Ok((new_id, false));
    }

    let mut columns_copied = 0usize;
    for column in store.columns_of_table(&template.id)? {
        store.upsert_column(TableColumn {
            id: ctx.suffix.apply(&column.id),
            table_id: new_id.clone(),
            column_index: column.column_index,
            name: column.name.as_deref().map(|n| suffix_text(n, ctx.suffix)),
            column_type: column.column_type.clone(),
            width: column.width,
            format: column.format.clone(),
            metadata: column.metadata.clone(),
        })?;
        columns_copied += 1;
    }

    let mut rows_copied = 0usize;
    for row in store.rows_of_table(&template.id)? {
        store.upsert_row(TableRow {
            id: ctx.suffix.apply(&row.id),
            table_id: new_id.clone(),
            row_index: row.row_index,
            // Cell grids travel verbatim between instances.
            cells: row.cells.clone(),
        })?;
        rows_copied += 1;
    }

    store.upsert_table(Table {
        id: new_id.clone(),
        node_id: ctx.instance_node_id.clone(),
        name: template.name.as_deref().map(|n| ctx.suffix.apply(n)),
        description: template.description.clone(),
        kind: template.kind,
        meta: template.meta.as_ref().map(|m| rewrite_table_meta(m, ctx)),
        lookup_select_column: template.lookup_select_column.clone(),
        lookup_display_columns: template.lookup_display_columns.clone(),
        row_count: rows_copied as u32,
        column_count: columns_copied as u32,
    })?;

    links::add_links(
        store,
        &ctx.instance_node_id,
        LinkKind::Table,
        std::slice::from_ref(&new_id),
    )?;

    counts.columns += columns_copied;
    counts.rows += rows_copied;
    Ok((new_id, true))
}

/// Deep-rewrite lookup meta. Selector and source-field ids resolve through
/// the node map; comparison columns and display columns are *names* —
/// suffixed when textual, untouched when numeric literals.
fn rewrite_table_meta(meta: &TableMeta, ctx: &DuplicationContext) -> TableMeta {
    let mut meta = meta.clone();
    if let Some(lookup) = &mut meta.lookup {
        if let Some(selectors) = &mut lookup.selectors {
            if let Some(id) = &selectors.column_field_id {
                selectors.column_field_id = Some(ctx.rewrite().resolve(id, RefKind::Node));
            }
            if let Some(id) = &selectors.row_field_id {
                selectors.row_field_id = Some(ctx.rewrite().resolve(id, RefKind::Node));
            }
            rewrite_extra(&mut selectors.extra, ctx);
        }
        if let Some(axis) = &mut lookup.row_source_option {
            rewrite_axis(axis, ctx);
        }
        if let Some(axis) = &mut lookup.column_source_option {
            rewrite_axis(axis, ctx);
        }
        if let Some(display) = &mut lookup.display_column {
            *display = suffix_display(display, ctx.suffix);
        }
        if let Some(display) = &mut lookup.display_row {
            *display = suffix_display(display, ctx.suffix);
        }
        rewrite_extra(&mut lookup.extra, ctx);
    }
    rewrite_extra(&mut meta.extra, ctx);
    meta
}

fn rewrite_axis(axis: &mut AxisSource, ctx: &DuplicationContext) {
    if let Some(field) = &axis.source_field {
        axis.source_field = Some(ctx.rewrite().resolve(field, RefKind::Node));
    }
    if let Some(column) = &axis.comparison_column {
        axis.comparison_column = Some(suffix_text(column, ctx.suffix));
    }
    rewrite_extra(&mut axis.extra, ctx);
}

/// Suffix a textual name; numeric literals pass through untouched.
fn suffix_text(name: &str, suffix: Suffix) -> String {
    if is_numeric_literal(name) {
        name.to_string()
    } else {
        suffix.apply(name)
    }
}

fn suffix_display(display: &DisplayTarget, suffix: Suffix) -> DisplayTarget {
    match display {
        DisplayTarget::One(name) => DisplayTarget::One(suffix_text(name, suffix)),
        DisplayTarget::Many(names) => {
            DisplayTarget::Many(names.iter().map(|n| suffix_text(n, suffix)).collect())
        }
    }
}

/// Recompute the instance's capability flags strictly from what now exists
/// under it, re-point the active-capacity ids, remap the per-table instance
/// configuration, and clear any cached computed value.
fn reconcile_instance<S: TreeStore>(
    store: &S,
    template: &Node,
    ctx: &DuplicationContext,
) -> EngineResult<CapabilityFlags> {
    let mut instance = store
        .node(&ctx.instance_node_id)?
        .ok_or_else(|| EngineError::not_found(EntityKind::Node, &ctx.instance_node_id))?;

    let formulas = store.formulas_of_node(&instance.id)?;
    let conditions = store.conditions_of_node(&instance.id)?;
    let tables = store.tables_of_node(&instance.id)?;
    let variable = store.variable_of_node(&instance.id)?;

    let flags = CapabilityFlags {
        has_formula: !formulas.is_empty(),
        has_condition: !conditions.is_empty(),
        has_table: !tables.is_empty(),
        has_data: variable.is_some(),
    };
    instance.flags = flags;

    let formula_ids: Vec<String> = formulas.iter().map(|f| f.id.clone()).collect();
    let condition_ids: Vec<String> = conditions.iter().map(|c| c.id.clone()).collect();
    let table_ids: Vec<String> = tables.iter().map(|t| t.id.clone()).collect();
    instance.formula_active_id = active_id(
        template.formula_active_id.as_deref(),
        RefKind::Formula,
        &formula_ids,
        ctx,
    );
    instance.condition_active_id = active_id(
        template.condition_active_id.as_deref(),
        RefKind::Condition,
        &condition_ids,
        ctx,
    );
    instance.table_active_id = active_id(
        template.table_active_id.as_deref(),
        RefKind::Table,
        &table_ids,
        ctx,
    );

    let mut table_instances = BTreeMap::new();
    for (table_id, config) in &template.table_instances {
        let mapped = ctx
            .mapped_table(table_id)
            .map(str::to_string)
            .unwrap_or_else(|| ctx.suffix.apply(table_id));
        let rewritten = force_shared_ref_suffix(
            &rewrite_value(config, &ctx.rewrite()),
            ctx.suffix,
        );
        table_instances.insert(mapped, rewritten);
    }
    for table in &tables {
        table_instances
            .entry(table.id.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    instance.table_instances = table_instances;

    instance.computed = None;
    store.upsert_node(instance)?;
    Ok(flags)
}

/// Prefer the template's active pointer resolved through the maps, as long
/// as the resolved row actually exists on the instance; otherwise the first
/// owned row, or nothing.
fn active_id(
    template_active: Option<&str>,
    kind: RefKind,
    owned: &[String],
    ctx: &DuplicationContext,
) -> Option<String> {
    if let Some(id) = template_active {
        let resolved = ctx.rewrite().resolve(id, kind);
        if owned.iter().any(|o| *o == resolved) {
            return Some(resolved);
        }
    }
    owned.first().cloned()
}
