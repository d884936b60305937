//! Graph rewrite passes.
//!
//! Each pass consumes an [`EntityGraph`] and produces a new one. Passes are
//! independent and can be composed in any order with a [`PassPipeline`]:
//!
//! - [`EntityMergePass`]: collapse equivalence classes of co-referent entities
//! - [`TransitivePass`]: one round of closure over transitive relations
//! - [`SymmetricPass`]: add missing inverse edges
//! - [`PostProcessPass`]: run a per-entity post-processor on official edges

pub mod entity_merge;
pub mod post_process;
pub mod symmetric;
pub mod transitive;

use crate::checklist::Checklist;
use crate::graph::EntityGraph;

pub use entity_merge::EntityMergePass;
pub use post_process::PostProcessPass;
pub use symmetric::SymmetricPass;
pub use transitive::TransitivePass;

/// A graph-to-graph rewrite.
pub trait GraphPass: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Rewrite `graph`, recording decisions in `checklist`.
    fn apply(&self, graph: EntityGraph, checklist: &dyn Checklist) -> EntityGraph;
}

/// An ordered list of passes applied one after another.
#[derive(Default)]
pub struct PassPipeline {
    passes: Vec<Box<dyn GraphPass>>,
}

impl PassPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pass(mut self, pass: impl GraphPass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn push(&mut self, pass: Box<dyn GraphPass>) {
        self.passes.push(pass);
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Pass names in application order.
    pub fn names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Apply every pass in order. Graph validity is checked after each pass
    /// in debug builds.
    pub fn apply(&self, mut graph: EntityGraph, checklist: &dyn Checklist) -> EntityGraph {
        for pass in &self.passes {
            let before = graph.edge_count();
            graph = pass.apply(graph, checklist);
            graph.debug_assert_valid();
            tracing::debug!(
                pass = pass.name(),
                edges_before = before,
                edges_after = graph.edge_count(),
                vertices = graph.vertex_count(),
                "rewrite pass complete"
            );
        }
        graph
    }
}

impl std::fmt::Debug for PassPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassPipeline")
            .field("passes", &self.names())
            .finish()
    }
}
