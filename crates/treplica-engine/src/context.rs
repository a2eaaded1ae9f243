//! The duplication context.
//!
//! One explicit value carries the suffix and the four remap tables through
//! the whole copy pipeline. The tables grow as capacities are copied — a
//! formula copied early is resolvable by a condition copied later — but the
//! context is only ever handed onward, never stashed in a global.

use rustc_hash::FxHashMap;

use treplica_common::{NodeId, Suffix, strip_numeric_suffixes};
use treplica_rewrite::{RewriteContext, RewriteMaps};

#[derive(Debug, Clone)]
pub struct DuplicationContext {
    pub template_node_id: NodeId,
    pub instance_node_id: NodeId,
    pub suffix: Suffix,
    maps: RewriteMaps,
}

impl DuplicationContext {
    pub fn new(
        template_node_id: impl Into<NodeId>,
        instance_node_id: impl Into<NodeId>,
        suffix: Suffix,
        node_map: FxHashMap<String, String>,
    ) -> Self {
        let template_node_id = template_node_id.into();
        let instance_node_id = instance_node_id.into();
        let mut maps = RewriteMaps {
            nodes: node_map,
            ..RewriteMaps::default()
        };
        // The primary pair always maps, whatever the sibling scan found.
        maps.nodes.insert(
            strip_numeric_suffixes(&template_node_id).to_string(),
            instance_node_id.clone(),
        );
        Self {
            template_node_id,
            instance_node_id,
            suffix,
            maps,
        }
    }

    /// Borrow the maps plus the active suffix for a rewriting call.
    pub fn rewrite(&self) -> RewriteContext<'_> {
        RewriteContext::new(&self.maps, Some(self.suffix))
    }

    pub fn maps(&self) -> &RewriteMaps {
        &self.maps
    }

    /// Record a copied formula so later capacities resolve it by map
    /// instead of falling back to suffix derivation.
    pub fn record_formula(&mut self, old_id: &str, new_id: impl Into<String>) {
        self.maps
            .formulas
            .insert(strip_numeric_suffixes(old_id).to_string(), new_id.into());
    }

    pub fn record_condition(&mut self, old_id: &str, new_id: impl Into<String>) {
        self.maps
            .conditions
            .insert(strip_numeric_suffixes(old_id).to_string(), new_id.into());
    }

    pub fn record_table(&mut self, old_id: &str, new_id: impl Into<String>) {
        self.maps
            .tables
            .insert(strip_numeric_suffixes(old_id).to_string(), new_id.into());
    }

    pub fn mapped_table(&self, old_id: &str) -> Option<&str> {
        self.maps
            .tables
            .get(strip_numeric_suffixes(old_id))
            .map(String::as_str)
    }
}
