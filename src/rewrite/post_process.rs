//! Per-entity post-processing over official-relation edges.

use std::sync::Arc;

use crate::checklist::{Checklist, NoopChecklist};
use crate::entity::Entity;
use crate::fact::Fact;
use crate::graph::EntityGraph;
use crate::relation::RelationTable;
use crate::resolve::SlotfillPostProcessor;

use super::GraphPass;

/// Runs a [`SlotfillPostProcessor`] on every vertex's official-relation
/// edges. Non-official edges pass through untouched.
///
/// Only the query entity's decisions reach the checklist; other vertices
/// are processed against a [`NoopChecklist`].
pub struct PostProcessPass {
    processor: Arc<dyn SlotfillPostProcessor>,
    relations: Arc<RelationTable>,
    query: Option<Entity>,
}

impl PostProcessPass {
    pub fn new(processor: Arc<dyn SlotfillPostProcessor>, relations: Arc<RelationTable>) -> Self {
        Self {
            processor,
            relations,
            query: None,
        }
    }

    /// Track checklist events for this entity.
    pub fn for_query(mut self, query: Entity) -> Self {
        self.query = Some(query);
        self
    }
}

impl GraphPass for PostProcessPass {
    fn name(&self) -> &str {
        "post-process"
    }

    fn apply(&self, graph: EntityGraph, checklist: &dyn Checklist) -> EntityGraph {
        graph.transform_edges(|vertex, facts| {
            let (official, other): (Vec<Fact>, Vec<Fact>) = facts
                .into_iter()
                .partition(|f| self.relations.is_official(&f.relation));
            let sink: &dyn Checklist = if self.query.as_ref() == Some(vertex) {
                checklist
            } else {
                &NoopChecklist
            };
            let mut kept = self.processor.process(vertex, official, sink);
            kept.extend(other);
            kept
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::checklist::{DiscardReason, MemoryChecklist};
    use crate::entity::EntityType;

    /// Keeps only the best-scoring fact and discards the rest.
    struct KeepBest {
        seen: Mutex<Vec<String>>,
    }

    impl SlotfillPostProcessor for KeepBest {
        fn process(
            &self,
            pivot: &Entity,
            mut facts: Vec<Fact>,
            checklist: &dyn Checklist,
        ) -> Vec<Fact> {
            self.seen.lock().unwrap().push(pivot.name.clone());
            facts.sort_by(|a, b| b.bounded_score().total_cmp(&a.bounded_score()));
            for dropped in facts.iter().skip(1) {
                checklist.discard(dropped, DiscardReason::Inconsistent);
            }
            facts.truncate(1);
            facts
        }
    }

    #[test]
    fn only_official_edges_are_processed() {
        let jane = Entity::anonymous("Jane", EntityType::Person);
        let acme = Entity::anonymous("Acme", EntityType::Organization);
        let beta = Entity::anonymous("Beta", EntityType::Organization);
        let mut g = EntityGraph::new();
        g.add_fact(Fact::between(jane.clone(), "per:employee_or_member_of", &acme).with_score(0.9))
            .unwrap();
        g.add_fact(Fact::between(jane.clone(), "per:employee_or_member_of", &beta).with_score(0.4))
            .unwrap();
        g.add_fact(Fact::between(jane.clone(), "works_near", &beta).with_score(0.1))
            .unwrap();

        let processor = Arc::new(KeepBest {
            seen: Mutex::new(Vec::new()),
        });
        let pass = PostProcessPass::new(processor.clone(), Arc::new(RelationTable::kbp()))
            .for_query(jane.clone());
        let checklist = MemoryChecklist::new();
        let out = pass.apply(g, &checklist);

        let relations: Vec<String> = out.facts_of(&jane).into_iter().map(|f| f.relation).collect();
        assert_eq!(relations, vec!["per:employee_or_member_of", "works_near"]);
        assert_eq!(checklist.discarded(DiscardReason::Inconsistent).len(), 1);
        assert_eq!(processor.seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn non_query_vertices_do_not_reach_checklist() {
        let jane = Entity::anonymous("Jane", EntityType::Person);
        let john = Entity::anonymous("John", EntityType::Person);
        let mut g = EntityGraph::new();
        for name in ["A", "B"] {
            let org = Entity::anonymous(name, EntityType::Organization);
            g.add_fact(
                Fact::between(john.clone(), "per:employee_or_member_of", &org).with_score(0.5),
            )
            .unwrap();
        }
        let processor = Arc::new(KeepBest {
            seen: Mutex::new(Vec::new()),
        });
        let pass = PostProcessPass::new(processor, Arc::new(RelationTable::kbp())).for_query(jane);
        let checklist = MemoryChecklist::new();
        let out = pass.apply(g, &checklist);
        assert_eq!(out.facts_of(&john).len(), 1);
        assert!(checklist.is_empty());
    }
}
