//! Symmetric completion: add the inverse of every edge whose relation has a
//! declared inverse, unless it is already present.

use std::collections::HashSet;
use std::sync::Arc;

use crate::checklist::Checklist;
use crate::entity::Entity;
use crate::fact::Fact;
use crate::graph::EntityGraph;
use crate::relation::RelationTable;

use super::GraphPass;

/// For `A -r-> B` with `inverse(r) = r'`, ensure `B -r'-> A` exists.
///
/// The inverse copies the score and provenance of the original edge. It is
/// only added when `B`'s type matches the subject type of `r'`. Running the
/// pass twice adds nothing the second time.
pub struct SymmetricPass {
    relations: Arc<RelationTable>,
}

impl SymmetricPass {
    pub fn new(relations: Arc<RelationTable>) -> Self {
        Self { relations }
    }

    /// The inverse facts missing from `graph`.
    pub fn missing_inverses(&self, graph: &EntityGraph) -> Vec<Fact> {
        let mut pending: HashSet<(Entity, Entity, String)> = HashSet::new();
        let mut missing = Vec::new();

        for (a, b, fact) in graph.edges() {
            let Some(inverse) = self.relations.inverse_of(&fact.relation) else {
                continue;
            };
            if a == b {
                continue;
            }
            if let Some(info) = self.relations.get(inverse) {
                if info.subject_type != b.entity_type {
                    continue;
                }
            }
            if graph.edges_between(b, a).any(|f| f.relation == inverse) {
                continue;
            }
            if !pending.insert((b.clone(), a.clone(), inverse.to_string())) {
                continue;
            }
            missing.push(Fact {
                entity: b.clone(),
                relation: inverse.to_string(),
                value: a.name.clone(),
                value_type: Some(a.entity_type),
                provenance: fact.provenance.clone(),
                score: fact.score,
            });
        }
        missing
    }
}

impl GraphPass for SymmetricPass {
    fn name(&self) -> &str {
        "symmetric"
    }

    fn apply(&self, graph: EntityGraph, checklist: &dyn Checklist) -> EntityGraph {
        let missing = self.missing_inverses(&graph);
        let mut graph = graph;
        for fact in missing {
            checklist.register(&fact);
            if let Err(e) = graph.add_fact(fact) {
                tracing::warn!(error = %e, "symmetric completion produced an invalid edge");
            }
        }
        graph
    }
}
