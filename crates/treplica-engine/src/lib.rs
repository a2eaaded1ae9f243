pub mod backends;
pub mod context;
pub mod copy;
pub mod duplicate;
pub mod links;
pub mod lookup;
pub mod model;
pub mod repair;
pub mod sum;
pub mod traits;

pub use backends::MemoryStore;
pub use context::DuplicationContext;
pub use copy::{CopyCounts, CopyOptions, CopyReport, SkippedCapacity, copy_capacities};
pub use duplicate::{DuplicationOutcome, complete_duplication};
pub use links::LinkKind;
pub use lookup::LookupPayload;
pub use model::{
    AxisSource, CapabilityFlags, ComputedValue, Condition, ConditionAction, ConditionBranch,
    ConditionFallback, ConditionSet, DisplayTarget, Formula, LookupMeta, LookupSelectors, Node,
    NodeType, Provenance, SourceType, Table, TableColumn, TableKind, TableMeta, TableRow, Variable,
};
pub use repair::{
    RepairEntry, RepairFailure, RepairReport, RepairScope, TemplateResolution,
    repair_tree_capacities,
};
pub use sum::{SumField, on_instance_set_changed, remove_sum_field, upsert_sum_field};
pub use traits::{StoreError, StoreResult, TreeStore};

// Re-export common types
pub use treplica_common::{EngineError, EngineResult, EntityKind, Suffix};

/// Facade over a [`TreeStore`] exposing the engine's operations.
///
/// The engine holds no state of its own between calls; every operation is a
/// sequential read/modify/write conversation with the store, and identical
/// inputs derive identical target ids, so a retried call converges onto the
/// rows the first attempt wrote.
pub struct Engine<S: traits::TreeStore> {
    store: S,
}

impl<S: traits::TreeStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Clone the template node's formulas, conditions and tables onto the
    /// instance node, rewriting every embedded reference. See
    /// [`copy::copy_capacities`].
    pub fn copy_capacities(
        &self,
        template_node_id: &str,
        instance_node_id: &str,
        suffix: Suffix,
        options: CopyOptions,
    ) -> EngineResult<CopyReport> {
        copy::copy_capacities(&self.store, template_node_id, instance_node_id, suffix, options)
    }

    /// Superset of [`Engine::copy_capacities`]: additionally repairs empty
    /// helper lookup tables, field-configuration pointers, and the instance
    /// variable. See [`duplicate::complete_duplication`].
    pub fn complete_duplication(
        &self,
        template_node_id: &str,
        instance_node_id: &str,
        suffix: Suffix,
    ) -> EngineResult<DuplicationOutcome> {
        duplicate::complete_duplication(&self.store, template_node_id, instance_node_id, suffix)
    }

    /// Batch-heal instances whose capability flags overclaim what they own.
    /// See [`repair::repair_tree_capacities`].
    pub fn repair_tree_capacities(
        &self,
        scope: Option<RepairScope>,
    ) -> EngineResult<RepairReport> {
        repair::repair_tree_capacities(&self.store, scope)
    }

    /// Create or refresh the hidden "Total" field summing every live
    /// instance of the source node's variable.
    pub fn upsert_sum_field(&self, source_node_id: &str) -> EngineResult<SumField> {
        sum::upsert_sum_field(&self.store, source_node_id)
    }

    /// Drop the "Total" field and clear the source's wants-total flag.
    pub fn remove_sum_field(&self, source_node_id: &str) -> EngineResult<()> {
        sum::remove_sum_field(&self.store, source_node_id)
    }

    /// Recompute the Total formula's member list after instances were added
    /// or removed. The Total node's identity is stable across refreshes.
    pub fn on_instance_set_changed(&self, source_node_id: &str) -> EngineResult<()> {
        sum::on_instance_set_changed(&self.store, source_node_id)
    }
}
