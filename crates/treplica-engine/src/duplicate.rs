//! Complete Duplication Service.
//!
//! Superset of the Capacity Copy Service: after the capacities land it also
//! (a) fills cross-branch helper lookup tables that still sit empty beside
//! the instance, (b) re-points `lookupTableId` / `lookupNodeId` pointers in
//! the instance's free-form field configuration, and (c) clones the
//! template's 1:1 variable onto the instance. The result is an instance
//! with no remaining fallback path to the template's rows.

use serde_json::{Value, json};
use tracing::{debug, info_span, warn};

use treplica_common::{EngineError, EngineResult, EntityKind, NodeId, Suffix};
use treplica_rewrite::{RefKind, rewrite_str};

use crate::context::DuplicationContext;
use crate::copy::{CopyOptions, CopyReport, copy_capacities_with_context};
use crate::links::{self, LinkKind};
use crate::lookup::LookupPayload;
use crate::model::{Node, Table, TableColumn, TableRow, Variable};
use crate::traits::TreeStore;

#[derive(Debug, Clone)]
pub struct DuplicationOutcome {
    pub node_id: NodeId,
    pub node_label: String,
    pub copy: CopyReport,
    pub lookups_filled: usize,
    pub field_config_updated: bool,
    pub variable_copied: bool,
}

pub fn complete_duplication<S: TreeStore>(
    store: &S,
    template_node_id: &str,
    instance_node_id: &str,
    suffix: Suffix,
) -> EngineResult<DuplicationOutcome> {
    let _span = info_span!(
        "complete_duplication",
        template = template_node_id,
        instance = instance_node_id,
        suffix = %suffix
    )
    .entered();

    let (copy, ctx) = copy_capacities_with_context(
        store,
        template_node_id,
        instance_node_id,
        suffix,
        CopyOptions::default(),
    )?;

    let template = store
        .node(template_node_id)?
        .ok_or_else(|| EngineError::not_found(EntityKind::Node, template_node_id))?;
    let instance = store
        .node(instance_node_id)?
        .ok_or_else(|| EngineError::not_found(EntityKind::Node, instance_node_id))?;

    let lookups_filled = fill_helper_lookups(store, &template, &instance, &ctx)?;
    let field_config_updated = rewrite_field_config(store, instance_node_id, &ctx)?;
    let variable_copied = copy_variable(store, &template, &ctx)?;

    Ok(DuplicationOutcome {
        node_id: instance.id,
        node_label: instance.label,
        copy,
        lookups_filled,
        field_config_updated,
        variable_copied,
    })
}

/// Find sibling helper nodes whose lookup table is named after the template
/// (`Lookup <templateLabel><suffix>`) but was left empty by the structural
/// clone, and fill it from the template's own table.
fn fill_helper_lookups<S: TreeStore>(
    store: &S,
    template: &Node,
    instance: &Node,
    ctx: &DuplicationContext,
) -> EngineResult<usize> {
    let template_tables = store.tables_of_node(&template.id)?;
    if template_tables.is_empty() {
        return Ok(0);
    }
    let tag = ctx.suffix.tag();
    let helpers: Vec<Node> = store
        .nodes_in_tree(&instance.tree_id)?
        .into_iter()
        .filter(|n| n.id != instance.id && n.label.ends_with(&tag))
        .collect();

    let mut filled = 0usize;
    for template_table in &template_tables {
        let expected = format!("Lookup {}{tag}", template.label);
        for helper in &helpers {
            for lookup_table in store.tables_of_node(&helper.id)? {
                let Some(name) = lookup_table.name.as_deref() else {
                    continue;
                };
                let name_matches = name == expected
                    || (name.contains("Lookup") && name.contains(&template.label));
                if !name_matches || !store.rows_of_table(&lookup_table.id)?.is_empty() {
                    continue;
                }

                let inline_options = template_table
                    .meta
                    .as_ref()
                    .and_then(|m| m.extra.get("options"));
                let payload =
                    LookupPayload::of_table(store, &template_table.id, inline_options)?;
                if payload.is_empty() {
                    debug!(table = %template_table.id, "template table empty, nothing to fill");
                    continue;
                }
                fill_lookup_table(store, &lookup_table, template_table, payload, &tag)?;
                filled += 1;
            }
        }
    }
    Ok(filled)
}

fn fill_lookup_table<S: TreeStore>(
    store: &S,
    lookup_table: &Table,
    template_table: &Table,
    payload: LookupPayload,
    tag: &str,
) -> EngineResult<()> {
    store.delete_columns_of_table(&lookup_table.id)?;
    store.delete_rows_of_table(&lookup_table.id)?;

    let (columns_copied, rows_copied, first_column) = match payload {
        LookupPayload::NormalizedTable { columns, rows } => {
            let first = columns.first().and_then(|c| c.name.clone());
            for column in &columns {
                store.upsert_column(TableColumn {
                    id: format!("{}-lookup{tag}", column.id),
                    table_id: lookup_table.id.clone(),
                    ..column.clone()
                })?;
            }
            for row in &rows {
                store.upsert_row(TableRow {
                    id: format!("{}-lookup{tag}", row.id),
                    table_id: lookup_table.id.clone(),
                    ..row.clone()
                })?;
            }
            (columns.len(), rows.len(), first)
        }
        LookupPayload::RawOptions(options) => {
            let column_name = template_table
                .lookup_select_column
                .clone()
                .unwrap_or_else(|| "Options".to_string());
            store.upsert_column(TableColumn {
                id: format!("{}-options-lookup{tag}", template_table.id),
                table_id: lookup_table.id.clone(),
                column_index: 0,
                name: Some(column_name.clone()),
                column_type: "text".to_string(),
                width: None,
                format: None,
                metadata: None,
            })?;
            for (index, option) in options.iter().enumerate() {
                store.upsert_row(TableRow {
                    id: format!("{}-opt{index}-lookup{tag}", template_table.id),
                    table_id: lookup_table.id.clone(),
                    row_index: index as u32,
                    cells: json!([option]),
                })?;
            }
            (1, options.len(), Some(column_name))
        }
    };

    let mut refreshed = lookup_table.clone();
    refreshed.row_count = rows_copied as u32;
    refreshed.column_count = columns_copied as u32;
    refreshed.lookup_select_column = template_table
        .lookup_select_column
        .clone()
        .or(first_column.clone());
    if refreshed.lookup_display_columns.is_empty() {
        refreshed.lookup_display_columns = if template_table.lookup_display_columns.is_empty() {
            first_column.into_iter().collect()
        } else {
            template_table.lookup_display_columns.clone()
        };
    }
    store.upsert_table(refreshed)?;
    Ok(())
}

/// Re-point `lookupTableId` / `lookupNodeId` inside the instance's field
/// configuration at the copied rows. Idempotent: ids that already carry the
/// suffix are derived to themselves.
fn rewrite_field_config<S: TreeStore>(
    store: &S,
    instance_node_id: &str,
    ctx: &DuplicationContext,
) -> EngineResult<bool> {
    let Some(mut instance) = store.node(instance_node_id)? else {
        return Ok(false);
    };
    let Some(Value::Object(config)) = instance.field_config.as_ref() else {
        return Ok(false);
    };
    let mut config = config.clone();
    let mut changed = false;

    if let Some(Value::String(id)) = config.get("lookupTableId") {
        let new_id = ctx
            .mapped_table(id)
            .map(str::to_string)
            .unwrap_or_else(|| ctx.suffix.apply(id));
        if new_id != *id {
            config.insert("lookupTableId".to_string(), Value::String(new_id));
            changed = true;
        }
    }
    if let Some(Value::String(id)) = config.get("lookupNodeId") {
        let new_id = ctx.rewrite().resolve(id, RefKind::Node);
        if new_id != *id {
            config.insert("lookupNodeId".to_string(), Value::String(new_id));
            changed = true;
        }
    }

    if changed {
        instance.field_config = Some(Value::Object(config));
        store.upsert_node(instance)?;
    }
    Ok(changed)
}

/// Clone the template's variable onto the instance: suffixed id and exposed
/// key, source reference rewritten through the same maps. An existing
/// instance variable keeps its id and is updated in place.
fn copy_variable<S: TreeStore>(
    store: &S,
    template: &Node,
    ctx: &DuplicationContext,
) -> EngineResult<bool> {
    let Some(variable) = store.variable_of_node(&template.id)? else {
        return Ok(false);
    };
    let existing = store.variable_of_node(&ctx.instance_node_id)?;
    let new_id = existing
        .map(|v| v.id)
        .unwrap_or_else(|| ctx.suffix.apply(&variable.id));

    let copied = Variable {
        id: new_id.clone(),
        node_id: ctx.instance_node_id.clone(),
        exposed_key: ctx.suffix.apply(&variable.exposed_key),
        display_name: variable
            .display_name
            .as_deref()
            .map(|n| ctx.suffix.apply(n)),
        source_type: variable.source_type,
        source_ref: variable
            .source_ref
            .as_deref()
            .map(|r| rewrite_str(r, &ctx.rewrite())),
        unit: variable.unit.clone(),
        precision: variable.precision,
        visible_to_user: variable.visible_to_user,
    };
    store.upsert_variable(copied)?;
    links::add_links(
        store,
        &ctx.instance_node_id,
        LinkKind::Variable,
        std::slice::from_ref(&new_id),
    )?;

    match store.node(&ctx.instance_node_id)? {
        Some(mut instance) => {
            instance.flags.has_data = true;
            store.upsert_node(instance)?;
        }
        None => warn!(instance = %ctx.instance_node_id, "instance vanished during variable copy"),
    }
    Ok(true)
}
