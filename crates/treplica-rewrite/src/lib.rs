pub mod rewriter;
pub mod shapes;
mod tests;

pub use rewriter::{
    RewriteContext, RewriteMaps, collect_node_refs, force_shared_ref_suffix, rewrite_str,
    rewrite_value,
};
pub use shapes::RefKind;

// Re-export common types
pub use treplica_common::{Suffix, strip_numeric_suffixes};
