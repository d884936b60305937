//! Entity graph: entities as vertices, facts as parallel directed edges.
//!
//! Each fact `f` is stored on the edge `f.entity -> f.value_entity()`. For a
//! given `(source, destination)` pair there is at most one fact per relation:
//! inserting a second one merges the two with the graph's [`MergeStrategy`].
//!
//! The graph is backed by a petgraph [`StableDiGraph`] plus an identity index,
//! so node indices survive vertex removal.

pub mod merge;

use std::collections::{HashMap, HashSet};
use std::fmt;

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Bfs, EdgeRef};

use crate::entity::Entity;
use crate::error::GraphError;
use crate::fact::Fact;

pub use merge::MergeStrategy;

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// What happened when a fact was added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new edge was created.
    Inserted,
    /// An edge with the same relation existed and was merged.
    Merged,
}

/// Directed multigraph of entities and facts.
#[derive(Clone, Default)]
pub struct EntityGraph {
    graph: StableDiGraph<Entity, Fact>,
    index: HashMap<Entity, NodeIndex>,
    merge_strategy: MergeStrategy,
}

impl EntityGraph {
    /// Create an empty graph using [`MergeStrategy::Max`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph using the given merge strategy.
    pub fn with_merge_strategy(merge_strategy: MergeStrategy) -> Self {
        Self {
            merge_strategy,
            ..Self::default()
        }
    }

    /// An empty graph with the same merge strategy as `self`.
    pub fn empty_like(&self) -> Self {
        Self::with_merge_strategy(self.merge_strategy)
    }

    pub fn merge_strategy(&self) -> MergeStrategy {
        self.merge_strategy
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Ensure a vertex exists for the entity, returning its index.
    ///
    /// If an anonymous vertex with the same identity already exists and the
    /// incoming entity is official, the stored vertex is upgraded.
    pub fn add_vertex(&mut self, entity: Entity) -> NodeIndex {
        if let Some(&idx) = self.index.get(&entity) {
            if entity.is_official() && !self.graph[idx].is_official() {
                self.index.remove(&entity);
                self.index.insert(entity.clone(), idx);
                self.graph[idx] = entity;
            }
            return idx;
        }
        let idx = self.graph.add_node(entity.clone());
        self.index.insert(entity, idx);
        idx
    }

    /// Attach `fact` as an edge `source -> destination`.
    ///
    /// Fails if the fact's owning entity is not `source`, if its value does not
    /// resolve to `destination`, or if its relation is empty. A fact whose
    /// relation already exists on this edge is merged into the existing one.
    pub fn add(
        &mut self,
        source: &Entity,
        destination: &Entity,
        fact: Fact,
    ) -> GraphResult<AddOutcome> {
        if fact.relation.is_empty() {
            return Err(GraphError::EmptyRelation {
                entity: fact.entity.name.clone(),
            });
        }
        let value_entity = fact
            .value_entity()
            .ok_or_else(|| GraphError::MissingValueEntity {
                entity: fact.entity.name.clone(),
                relation: fact.relation.clone(),
                value: fact.value.clone(),
            })?;
        if fact.entity != *source || value_entity != *destination {
            return Err(GraphError::EndpointMismatch {
                entity: fact.entity.name.clone(),
                relation: fact.relation.clone(),
                value: fact.value.clone(),
                source_name: source.name.clone(),
                destination: destination.name.clone(),
            });
        }

        let src = self.add_vertex(source.clone());
        let dst = self.add_vertex(destination.clone());

        let existing = self
            .graph
            .edges_directed(src, Direction::Outgoing)
            .find(|e| e.target() == dst && e.weight().relation == fact.relation)
            .map(|e| e.id());

        match existing {
            Some(edge) => {
                let merged = self.merge_strategy.merge(&self.graph[edge], &fact);
                self.graph[edge] = merged;
                Ok(AddOutcome::Merged)
            }
            None => {
                self.graph.add_edge(src, dst, fact);
                Ok(AddOutcome::Inserted)
            }
        }
    }

    /// Attach a fact, deriving both endpoints from the fact itself.
    pub fn add_fact(&mut self, fact: Fact) -> GraphResult<AddOutcome> {
        let source = fact.entity.clone();
        let destination = fact
            .value_entity()
            .ok_or_else(|| GraphError::MissingValueEntity {
                entity: fact.entity.name.clone(),
                relation: fact.relation.clone(),
                value: fact.value.clone(),
            })?;
        self.add(&source, &destination, fact)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The stored vertex with the same identity as `entity`.
    pub fn vertex(&self, entity: &Entity) -> Option<&Entity> {
        self.index.get(entity).map(|&idx| &self.graph[idx])
    }

    pub fn contains(&self, entity: &Entity) -> bool {
        self.index.contains_key(entity)
    }

    /// All vertices, in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }

    /// The first vertex (in insertion order) with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<&Entity> {
        self.vertices().find(|e| e.name == name)
    }

    /// All edges as `(source, destination, fact)`.
    pub fn edges(&self) -> impl Iterator<Item = (&Entity, &Entity, &Fact)> + '_ {
        self.graph.edge_indices().filter_map(move |e| {
            let (s, d) = self.graph.edge_endpoints(e)?;
            Some((&self.graph[s], &self.graph[d], &self.graph[e]))
        })
    }

    /// Facts on edges leaving `entity`.
    pub fn outgoing_edges<'a>(
        &'a self,
        entity: &Entity,
    ) -> impl Iterator<Item = &'a Fact> + use<'a> {
        self.index.get(entity).copied().into_iter().flat_map(move |idx| {
            self.graph
                .edges_directed(idx, Direction::Outgoing)
                .map(move |e| &self.graph[e.id()])
        })
    }

    /// Facts on edges arriving at `entity`.
    pub fn incoming_edges<'a>(
        &'a self,
        entity: &Entity,
    ) -> impl Iterator<Item = &'a Fact> + use<'a> {
        self.index.get(entity).copied().into_iter().flat_map(move |idx| {
            self.graph
                .edges_directed(idx, Direction::Incoming)
                .map(move |e| &self.graph[e.id()])
        })
    }

    /// Facts on edges `source -> destination`.
    pub fn edges_between<'a>(
        &'a self,
        source: &Entity,
        destination: &Entity,
    ) -> impl Iterator<Item = &'a Fact> + use<'a> {
        let dst = self.index.get(destination).copied();
        self.index.get(source).copied().into_iter().flat_map(move |src| {
            self.graph
                .edges_directed(src, Direction::Outgoing)
                .filter(move |e| Some(e.target()) == dst)
                .map(move |e| &self.graph[e.id()])
        })
    }

    /// Outgoing facts of `entity` whose relation is `relation`.
    pub fn relations_named<'a>(
        &'a self,
        entity: &Entity,
        relation: &'a str,
    ) -> impl Iterator<Item = &'a Fact> + use<'a> {
        self.outgoing_edges(entity)
            .filter(move |f| f.relation == relation)
    }

    /// All facts in the graph whose relation is `relation`.
    pub fn all_relations_named<'a>(
        &'a self,
        relation: &'a str,
    ) -> impl Iterator<Item = &'a Fact> + 'a {
        self.graph
            .edge_indices()
            .map(move |e| &self.graph[e])
            .filter(move |f| f.relation == relation)
    }

    /// Owned copy of `entity`'s outgoing facts in a stable order
    /// (relation, then value).
    pub fn facts_of(&self, entity: &Entity) -> Vec<Fact> {
        let mut facts: Vec<Fact> = self.outgoing_edges(entity).cloned().collect();
        facts.sort_by(|a, b| {
            a.relation
                .cmp(&b.relation)
                .then_with(|| a.value.cmp(&b.value))
                .then_with(|| a.value_type.cmp(&b.value_type))
        });
        facts
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    // -----------------------------------------------------------------------
    // Structural operations
    // -----------------------------------------------------------------------

    /// Vertices reachable from `root` along outgoing edges, including `root`.
    /// Empty if `root` is not in the graph.
    pub fn connected_component(&self, root: &Entity) -> HashSet<Entity> {
        let Some(&start) = self.index.get(root) else {
            return HashSet::new();
        };
        let mut component = HashSet::new();
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(idx) = bfs.next(&self.graph) {
            component.insert(self.graph[idx].clone());
        }
        component
    }

    /// A new graph with only the vertices in `keep` and the edges between them.
    pub fn restrict_to(&self, keep: &HashSet<Entity>) -> Self {
        let mut out = self.empty_like();
        for v in self.vertices().filter(|v| keep.contains(*v)) {
            out.add_vertex(v.clone());
        }
        for (s, d, fact) in self.edges() {
            if keep.contains(s) && keep.contains(d) {
                out.insert_valid_edge(s, d, fact.clone());
            }
        }
        out
    }

    /// Rebuild the graph by passing each vertex's outgoing facts through `f`.
    ///
    /// Vertices are visited in insertion order and every vertex survives. Facts
    /// returned by `f` that belong to a different entity or cannot be placed in
    /// the graph are dropped with a warning.
    pub fn transform_edges<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&Entity, Vec<Fact>) -> Vec<Fact>,
    {
        let mut out = self.empty_like();
        for v in self.vertices() {
            out.add_vertex(v.clone());
        }
        for v in self.vertices() {
            let rewritten = f(v, self.facts_of(v));
            for fact in rewritten {
                if fact.entity != *v {
                    tracing::warn!(
                        vertex = %v,
                        %fact,
                        "transform produced a fact for another entity, dropping"
                    );
                    continue;
                }
                if let Err(e) = out.add_fact(fact) {
                    tracing::warn!(error = %e, "transform produced an invalid edge, dropping");
                }
            }
        }
        out
    }

    /// Whether every edge sits between its fact's entity and value entity, and
    /// no `(source, destination, relation)` key occurs twice.
    pub fn is_valid(&self) -> bool {
        let mut seen = HashSet::new();
        for (s, d, fact) in self.edges() {
            if fact.entity != *s || fact.value_entity().as_ref() != Some(d) {
                return false;
            }
            if !seen.insert((s, d, fact.relation.as_str())) {
                return false;
            }
        }
        true
    }

    /// Check [`is_valid`](Self::is_valid) in debug builds.
    pub fn debug_assert_valid(&self) {
        debug_assert!(self.is_valid(), "entity graph invariant violated: {self:?}");
    }

    /// Insert an edge known to be valid, still honouring merge-on-insert.
    fn insert_valid_edge(&mut self, source: &Entity, destination: &Entity, fact: Fact) {
        if let Err(e) = self.add(source, destination, fact) {
            tracing::warn!(error = %e, "dropping edge that violates graph invariants");
        }
    }
}

impl fmt::Debug for EntityGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityGraph")
            .field("vertices", &self.vertex_count())
            .field("edges", &self.edge_count())
            .field("merge_strategy", &self.merge_strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use crate::fact::Provenance;

    fn per(name: &str) -> Entity {
        Entity::anonymous(name, EntityType::Person)
    }

    fn org(name: &str) -> Entity {
        Entity::anonymous(name, EntityType::Organization)
    }

    fn edge(from: &Entity, rel: &str, to: &Entity, score: f64) -> Fact {
        Fact::between(from.clone(), rel, to).with_score(score)
    }

    #[test]
    fn add_and_query() {
        let mut g = EntityGraph::new();
        let jane = per("Jane");
        let acme = org("Acme");
        g.add_fact(edge(&jane, "per:employee_or_member_of", &acme, 0.7))
            .unwrap();

        assert_eq!(g.vertex_count(), 2);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.outgoing_edges(&jane).count(), 1);
        assert_eq!(g.incoming_edges(&acme).count(), 1);
        assert_eq!(g.edges_between(&jane, &acme).count(), 1);
        assert_eq!(g.edges_between(&acme, &jane).count(), 0);
        assert!(g.is_valid());
    }

    #[test]
    fn same_relation_merges() {
        let mut g = EntityGraph::with_merge_strategy(MergeStrategy::NoisyOr);
        let jane = per("Jane");
        let acme = org("Acme");
        let first = edge(&jane, "per:employee_or_member_of", &acme, 0.5)
            .with_provenance(Provenance::new("d1"));
        let second = edge(&jane, "per:employee_or_member_of", &acme, 0.6)
            .with_provenance(Provenance::new("d2"));

        assert_eq!(g.add_fact(first).unwrap(), AddOutcome::Inserted);
        assert_eq!(g.add_fact(second).unwrap(), AddOutcome::Merged);
        assert_eq!(g.edge_count(), 1);

        let f = g.outgoing_edges(&jane).next().unwrap();
        assert!((f.score.unwrap() - 0.8).abs() < 1e-9);
        assert_eq!(f.provenance.as_ref().unwrap().doc_id, "d2");
    }

    #[test]
    fn different_relations_are_parallel_edges() {
        let mut g = EntityGraph::new();
        let jane = per("Jane");
        let acme = org("Acme");
        g.add_fact(edge(&jane, "per:employee_or_member_of", &acme, 0.5))
            .unwrap();
        g.add_fact(edge(&jane, "per:schools_attended", &acme, 0.2))
            .unwrap();
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.relations_named(&jane, "per:schools_attended").count(), 1);
        assert_eq!(g.all_relations_named("per:employee_or_member_of").count(), 1);
    }

    #[test]
    fn endpoint_mismatch_is_rejected() {
        let mut g = EntityGraph::new();
        let jane = per("Jane");
        let acme = org("Acme");
        let f = edge(&jane, "per:employee_or_member_of", &acme, 0.5);
        let err = g.add(&acme, &jane, f).unwrap_err();
        assert!(matches!(err, GraphError::EndpointMismatch { .. }));
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn missing_value_type_is_rejected() {
        let mut g = EntityGraph::new();
        let f = Fact::new(per("Jane"), "per:title", "CEO");
        assert!(matches!(
            g.add_fact(f),
            Err(GraphError::MissingValueEntity { .. })
        ));
    }

    #[test]
    fn official_vertex_upgrades_anonymous() {
        let mut g = EntityGraph::new();
        g.add_vertex(org("Acme"));
        g.add_vertex(Entity::official(
            "Acme",
            EntityType::Organization,
            Some("E1".into()),
            None,
        ));
        assert_eq!(g.vertex_count(), 1);
        assert!(g.vertex(&org("Acme")).unwrap().is_official());
    }

    #[test]
    fn connected_component_follows_outgoing_edges() {
        let mut g = EntityGraph::new();
        let (a, b, c, d) = (per("A"), per("B"), per("C"), per("D"));
        g.add_fact(edge(&a, "per:siblings", &b, 1.0)).unwrap();
        g.add_fact(edge(&b, "per:siblings", &c, 1.0)).unwrap();
        g.add_fact(edge(&d, "per:siblings", &a, 1.0)).unwrap();

        let comp = g.connected_component(&a);
        assert_eq!(comp.len(), 3);
        assert!(!comp.contains(&d));
        assert!(g.connected_component(&per("nobody")).is_empty());
    }

    #[test]
    fn restrict_drops_outside_vertices() {
        let mut g = EntityGraph::new();
        let (a, b, c) = (per("A"), per("B"), per("C"));
        g.add_fact(edge(&a, "per:siblings", &b, 1.0)).unwrap();
        g.add_fact(edge(&b, "per:siblings", &c, 1.0)).unwrap();

        let keep: HashSet<Entity> = [a.clone(), b.clone()].into_iter().collect();
        let r = g.restrict_to(&keep);
        assert_eq!(r.vertex_count(), 2);
        assert_eq!(r.edge_count(), 1);
        assert!(!r.contains(&c));
        assert!(r.is_valid());
    }

    #[test]
    fn transform_edges_rebuilds() {
        let mut g = EntityGraph::new();
        let (a, b) = (per("A"), per("B"));
        g.add_fact(edge(&a, "per:siblings", &b, 0.9)).unwrap();
        g.add_fact(edge(&a, "per:spouse", &b, 0.1)).unwrap();

        let t = g.transform_edges(|_, facts| {
            facts
                .into_iter()
                .filter(|f| f.score_or(0.0) > 0.5)
                .collect()
        });
        assert_eq!(t.vertex_count(), 2);
        assert_eq!(t.edge_count(), 1);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn transform_drops_facts_for_other_entities() {
        let mut g = EntityGraph::new();
        let (a, b) = (per("A"), per("B"));
        g.add_fact(edge(&a, "per:siblings", &b, 0.9)).unwrap();

        let t = g.transform_edges(|v, facts| {
            facts
                .into_iter()
                .map(|f| if v.name == "A" { f.with_entity(per("Z")) } else { f })
                .collect()
        });
        assert_eq!(t.edge_count(), 0);
        assert!(t.is_valid());
    }
}
