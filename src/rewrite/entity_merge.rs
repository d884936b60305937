//! Entity deduplication: collapse co-referent vertices into one representative.
//!
//! Equivalence classes come from an O(n²) pairwise scan with an injected
//! [`EntityLinker`]; graphs are per query entity and small. Each class keeps a
//! single representative chosen by [`RepresentativeKey`], and every edge is
//! re-attached to the representatives of its endpoints, merging same-relation
//! duplicates with the graph's merge strategy.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::checklist::Checklist;
use crate::entity::{Entity, EntityType};
use crate::fact::{Fact, sanitize_score};
use crate::graph::EntityGraph;
use crate::oracle::{EntityContext, EntityLinker, NearDuplicate};
use crate::relation::RelationTable;

use super::GraphPass;

// ---------------------------------------------------------------------------
// Representative selection
// ---------------------------------------------------------------------------

/// Priority of an entity as the representative of its equivalence class.
///
/// Compared lexicographically, higher wins: official identity, then having an
/// external id, then the summed score of incoming edges from official
/// entities, then type specificity, then name length. Remaining ties go to the
/// entity that sorts first by `(name, type)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RepresentativeKey {
    pub official: bool,
    pub has_external_id: bool,
    pub incoming_official_score: f64,
    pub specificity: u8,
    pub name_length: usize,
}

impl RepresentativeKey {
    pub fn of(graph: &EntityGraph, entity: &Entity) -> Self {
        let incoming_official_score = graph
            .incoming_edges(entity)
            .filter(|f| f.entity.is_official())
            .map(|f| sanitize_score(f.score_or(0.0), 0.0))
            .sum();
        Self {
            official: entity.is_official(),
            has_external_id: entity.external_id().is_some(),
            incoming_official_score,
            specificity: entity.entity_type.specificity(),
            name_length: entity.name.chars().count(),
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.official
            .cmp(&other.official)
            .then(self.has_external_id.cmp(&other.has_external_id))
            .then(
                self.incoming_official_score
                    .total_cmp(&other.incoming_official_score),
            )
            .then(self.specificity.cmp(&other.specificity))
            .then(self.name_length.cmp(&other.name_length))
    }
}

/// Pick the representative of a non-empty class.
pub fn choose_representative<'a>(graph: &EntityGraph, class: &[&'a Entity]) -> Option<&'a Entity> {
    class
        .iter()
        .map(|e| (*e, RepresentativeKey::of(graph, e)))
        .max_by(|(ea, ka), (eb, kb)| ka.compare(kb).then_with(|| eb.cmp(ea)))
        .map(|(e, _)| e)
}

// ---------------------------------------------------------------------------
// Union-find
// ---------------------------------------------------------------------------

struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

// ---------------------------------------------------------------------------
// Pass
// ---------------------------------------------------------------------------

/// Merge co-referent entities.
pub struct EntityMergePass {
    linker: Arc<dyn EntityLinker>,
    near_duplicate: Arc<dyn NearDuplicate>,
    assert_alternate_names: bool,
}

impl EntityMergePass {
    pub fn new(linker: Arc<dyn EntityLinker>, near_duplicate: Arc<dyn NearDuplicate>) -> Self {
        Self {
            linker,
            near_duplicate,
            assert_alternate_names: true,
        }
    }

    /// Whether merged members are re-asserted as alternate names of their
    /// representative.
    pub fn with_alternate_names(mut self, enabled: bool) -> Self {
        self.assert_alternate_names = enabled;
        self
    }

    /// Equivalence classes over the graph's vertices, in vertex order. Every
    /// vertex appears in exactly one class.
    pub fn equivalence_classes<'g>(&self, graph: &'g EntityGraph) -> Vec<Vec<&'g Entity>> {
        let vertices: Vec<&Entity> = graph.vertices().collect();
        let evidence: Vec<Vec<Fact>> = vertices.iter().map(|v| graph.facts_of(v)).collect();

        let mut sets = DisjointSets::new(vertices.len());
        for i in 0..vertices.len() {
            let ctx_i = EntityContext::new(vertices[i], &evidence[i]);
            for j in (i + 1)..vertices.len() {
                let ctx_j = EntityContext::new(vertices[j], &evidence[j]);
                if self.linker.same_entity(&ctx_i, &ctx_j) {
                    sets.union(i, j);
                }
            }
        }

        let mut by_root: HashMap<usize, usize> = HashMap::new();
        let mut classes: Vec<Vec<&Entity>> = Vec::new();
        for (i, v) in vertices.iter().enumerate() {
            let root = sets.find(i);
            let slot = *by_root.entry(root).or_insert_with(|| {
                classes.push(Vec::new());
                classes.len() - 1
            });
            classes[slot].push(*v);
        }
        classes
    }

    /// Map every vertex to the representative of its class.
    pub fn representatives(&self, graph: &EntityGraph) -> HashMap<Entity, Entity> {
        let mut map = HashMap::new();
        for class in self.equivalence_classes(graph) {
            let Some(rep) = choose_representative(graph, &class) else {
                continue;
            };
            for member in class {
                map.insert(member.clone(), rep.clone());
            }
        }
        map
    }

    /// Alternate-name fact asserting `member` as a name of `rep`, if wanted.
    /// The value is typed `MISC` so it does not link back to `rep` when the
    /// pass runs again.
    fn alternate_name_fact(
        &self,
        graph: &EntityGraph,
        rep: &Entity,
        member: &Entity,
    ) -> Option<Fact> {
        let relation = RelationTable::alternate_names_for(rep.entity_type)?;
        if member.name == rep.name || self.near_duplicate.near_duplicate(&rep.name, &member.name) {
            return None;
        }
        let incoming: Vec<&Fact> = graph.incoming_edges(member).collect();
        let score = incoming
            .iter()
            .map(|f| f.bounded_score())
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))))
            .unwrap_or(1.0);
        let provenance = incoming.iter().find_map(|f| f.provenance.clone());

        let mut fact = Fact::new(rep.clone(), relation, member.name.clone())
            .with_value_type(EntityType::Misc)
            .with_score(score);
        fact.provenance = provenance;
        Some(fact)
    }

    /// Collapse `graph` onto a precomputed representative map, as returned
    /// by [`representatives`](Self::representatives) for the same graph.
    /// Vertices missing from the map stand for themselves.
    pub fn merge_with(
        &self,
        graph: EntityGraph,
        reps: &HashMap<Entity, Entity>,
        checklist: &dyn Checklist,
    ) -> EntityGraph {
        if reps.iter().all(|(member, rep)| member == rep) {
            return graph;
        }
        let merged: Vec<(&Entity, &Entity)> = graph
            .vertices()
            .filter_map(|v| reps.get(v).filter(|rep| *rep != v).map(|rep| (v, rep)))
            .collect();
        tracing::debug!(merged = merged.len(), "entity merge: collapsing equivalence classes");

        let mut out = graph.empty_like();
        for v in graph.vertices() {
            let rep = reps.get(v).unwrap_or(v);
            out.add_vertex(rep.clone());
        }

        for (s, d, fact) in graph.edges() {
            let src = reps.get(s).unwrap_or(s);
            let dst = reps.get(d).unwrap_or(d);
            if src == dst && RelationTable::is_alternate_names(&fact.relation) {
                continue;
            }
            let rewritten = Fact {
                entity: src.clone(),
                value: dst.name.clone(),
                value_type: Some(dst.entity_type),
                ..fact.clone()
            };
            if rewritten.key() != fact.key() {
                checklist.rewrite(fact, &rewritten);
            }
            if let Err(e) = out.add(src, dst, rewritten) {
                tracing::warn!(error = %e, "entity merge produced an invalid edge");
            }
        }

        if self.assert_alternate_names {
            for (member, rep) in merged {
                if let Some(fact) = self.alternate_name_fact(&graph, rep, member) {
                    checklist.register(&fact);
                    if let Err(e) = out.add_fact(fact) {
                        tracing::warn!(error = %e, "could not assert alternate name");
                    }
                }
            }
        }

        out
    }
}

impl GraphPass for EntityMergePass {
    fn name(&self) -> &str {
        "entity-merge"
    }

    fn apply(&self, graph: EntityGraph, checklist: &dyn Checklist) -> EntityGraph {
        let reps = self.representatives(&graph);
        self.merge_with(graph, &reps, checklist)
    }
}
