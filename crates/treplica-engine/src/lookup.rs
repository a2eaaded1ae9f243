//! Lookup payload boundary.
//!
//! A lookup-backed field can be fed either a plain options list or a full
//! normalized table. The distinction is resolved exactly once, here, when a
//! payload enters the engine; downstream code matches on the variant and
//! never re-sniffs the JSON. The external dropdown resolver consumes the
//! same variant when it turns copied tables into options.

use serde_json::Value;

use crate::model::{TableColumn, TableRow};
use crate::traits::{StoreResult, TreeStore};

#[derive(Debug, Clone, PartialEq)]
pub enum LookupPayload {
    /// A bare list of option values, no column structure.
    RawOptions(Vec<Value>),
    /// A materialized table: columns plus row cell grids.
    NormalizedTable {
        columns: Vec<TableColumn>,
        rows: Vec<TableRow>,
    },
}

impl LookupPayload {
    /// Classify a free-form payload. An array is an options list; an object
    /// carrying an `options` array likewise; anything else is not a lookup
    /// payload.
    pub fn classify(value: &Value) -> Option<LookupPayload> {
        match value {
            Value::Array(items) => Some(LookupPayload::RawOptions(items.clone())),
            Value::Object(map) => match map.get("options") {
                Some(Value::Array(items)) => Some(LookupPayload::RawOptions(items.clone())),
                _ => None,
            },
            _ => None,
        }
    }

    /// Load a table's materialized form from the store; when the table has
    /// no columns or rows but its meta carries an inline `options` list,
    /// fall back to that.
    pub fn of_table<S: TreeStore>(
        store: &S,
        table_id: &str,
        meta_options: Option<&Value>,
    ) -> StoreResult<LookupPayload> {
        let columns = store.columns_of_table(table_id)?;
        let rows = store.rows_of_table(table_id)?;
        if columns.is_empty() && rows.is_empty() {
            if let Some(payload) = meta_options.and_then(LookupPayload::classify) {
                return Ok(payload);
            }
        }
        Ok(LookupPayload::NormalizedTable { columns, rows })
    }

    pub fn is_empty(&self) -> bool {
        match self {
            LookupPayload::RawOptions(items) => items.is_empty(),
            LookupPayload::NormalizedTable { columns, rows } => {
                columns.is_empty() && rows.is_empty()
            }
        }
    }
}
