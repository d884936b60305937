//! One round of transitive closure over the relation table's transitive
//! relations (the alternate-name relations).

use std::sync::Arc;

use crate::checklist::Checklist;
use crate::fact::{Fact, sanitize_score};
use crate::graph::EntityGraph;
use crate::relation::RelationTable;

use super::GraphPass;

/// For every chain `A -r-> B -r-> C` with transitive `r`, assert `A -r-> C`.
///
/// The new edge takes the minimum of the two chain scores and the provenance
/// of the second edge, falling back to the first. Applied once per call, not
/// to a fixpoint.
pub struct TransitivePass {
    relations: Arc<RelationTable>,
}

impl TransitivePass {
    pub fn new(relations: Arc<RelationTable>) -> Self {
        Self { relations }
    }

    /// The facts one closure round would add.
    pub fn closure_facts(&self, graph: &EntityGraph) -> Vec<Fact> {
        let mut derived = Vec::new();
        for (a, b, first) in graph.edges() {
            if !self.relations.is_transitive(&first.relation) {
                continue;
            }
            for second in graph.relations_named(b, &first.relation) {
                let Some(c) = second.value_entity() else {
                    continue;
                };
                if c == *a {
                    continue;
                }
                derived.push(Fact {
                    entity: a.clone(),
                    relation: first.relation.clone(),
                    value: c.name.clone(),
                    value_type: Some(c.entity_type),
                    provenance: second
                        .provenance
                        .clone()
                        .or_else(|| first.provenance.clone()),
                    score: chain_min(first.score, second.score),
                });
            }
        }
        derived
    }
}

fn chain_min(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(sanitize_score(a, 0.0).min(sanitize_score(b, 0.0))),
        (Some(s), None) | (None, Some(s)) => Some(sanitize_score(s, 0.0)),
        (None, None) => None,
    }
}

impl GraphPass for TransitivePass {
    fn name(&self) -> &str {
        "transitive"
    }

    fn apply(&self, graph: EntityGraph, checklist: &dyn Checklist) -> EntityGraph {
        let derived = self.closure_facts(&graph);
        let mut graph = graph;
        for fact in derived {
            checklist.register(&fact);
            if let Err(e) = graph.add_fact(fact) {
                tracing::warn!(error = %e, "transitive closure produced an invalid edge");
            }
        }
        graph
    }
}
