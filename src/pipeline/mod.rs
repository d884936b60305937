//! End-to-end reasoning for one query entity, and parallel batches of them.
//!
//! Stages, in order:
//!
//! 1. build an [`EntityGraph`] from the candidate facts
//! 2. entity merge (optional), transitive closure, symmetric completion
//! 3. rule inference rooted at the query entity (optional)
//! 4. restrict to the query's connected component
//! 5. per-entity post-processing (optional)
//! 6. flatten the query's official-relation edges
//! 7. consistency resolution
//!
//! Each query gets its own graph, so [`Reasoner::run_batch`] runs queries in
//! parallel with rayon.

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::checklist::{Checklist, DiscardReason};
use crate::config::ReasonerConfig;
use crate::entity::Entity;
use crate::error::SlotfillResult;
use crate::fact::Fact;
use crate::graph::EntityGraph;
use crate::infer::{RuleEngine, RuleSet};
use crate::oracle::{EntityLinker, NameLinker, NearDuplicate, TokenOverlap};
use crate::relation::RelationTable;
use crate::resolve::{
    ConsistencyResolver, NoSelfReference, NormalizeValue, RelationSignature, Resolution,
    SingletonChain, SlotfillPostProcessor,
};
use crate::rewrite::{
    EntityMergePass, GraphPass, PassPipeline, PostProcessPass, SymmetricPass, TransitivePass,
};

/// Named processing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    Build,
    Merge,
    Rewrite,
    Infer,
    Restrict,
    PostProcess,
    Resolve,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Build => "build",
            Self::Merge => "merge",
            Self::Rewrite => "rewrite",
            Self::Infer => "infer",
            Self::Restrict => "restrict",
            Self::PostProcess => "post-process",
            Self::Resolve => "resolve",
        };
        f.write_str(name)
    }
}

/// Graph size after a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: StageKind,
    pub vertices: usize,
    pub edges: usize,
}

/// One query and its candidate facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub query: Entity,
    #[serde(default)]
    pub candidates: Vec<Fact>,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct ReasonerOutput {
    /// The query entity as it survived merging.
    pub query: Entity,
    pub graph: EntityGraph,
    pub inferred: Vec<Fact>,
    pub resolution: Resolution,
    pub stages: Vec<StageReport>,
}

impl ReasonerOutput {
    pub fn accepted(&self) -> &[Fact] {
        &self.resolution.accepted
    }
}

/// Serializable summary of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonerSummary {
    pub query: Entity,
    pub accepted: Vec<Fact>,
    pub inferred: Vec<Fact>,
    pub stages: Vec<StageReport>,
}

impl From<&ReasonerOutput> for ReasonerSummary {
    fn from(out: &ReasonerOutput) -> Self {
        Self {
            query: out.query.clone(),
            accepted: out.resolution.accepted.clone(),
            inferred: out.inferred.clone(),
            stages: out.stages.clone(),
        }
    }
}

/// Per-entity reasoner: graph construction, rewriting, inference and
/// consistency resolution.
pub struct Reasoner {
    config: ReasonerConfig,
    relations: Arc<RelationTable>,
    linker: Arc<dyn EntityLinker>,
    near_duplicate: Arc<dyn NearDuplicate>,
    engine: RuleEngine,
    resolver: ConsistencyResolver,
    post_processor: Option<Arc<dyn SlotfillPostProcessor>>,
}

impl Reasoner {
    /// Build from configuration with the KBP relation inventory. Rules come
    /// from `inference.rules_path` or the builtin set; an unreadable rule
    /// file is an error.
    pub fn new(config: ReasonerConfig) -> SlotfillResult<Self> {
        config.validate()?;
        let rules = match &config.inference.rules_path {
            Some(path) => RuleSet::load(path)?,
            None => RuleSet::builtin(),
        };
        Ok(Self::from_parts(config, RelationTable::kbp(), rules))
    }

    /// Build from explicit parts, with the name-based linker and the
    /// standard resolver heuristics. Rule consequents must pass the same
    /// per-fact checks the resolver applies, so a match the resolver would
    /// reject makes the engine backtrack to the next binding.
    pub fn from_parts(config: ReasonerConfig, relations: RelationTable, rules: RuleSet) -> Self {
        let relations = Arc::new(relations);
        let linker: Arc<dyn EntityLinker> = Arc::new(NameLinker);
        let consequent_filter = SingletonChain::new()
            .with(NormalizeValue)
            .with(NoSelfReference)
            .with(RelationSignature::new(relations.clone()));
        let engine =
            RuleEngine::new(rules, &relations).with_consequent_filter(Arc::new(consequent_filter));
        let resolver = Self::standard_resolver(&config, &relations, linker.clone());
        Self {
            config,
            relations,
            linker,
            near_duplicate: Arc::new(TokenOverlap::default()),
            engine,
            resolver,
            post_processor: None,
        }
    }

    fn standard_resolver(
        config: &ReasonerConfig,
        relations: &Arc<RelationTable>,
        linker: Arc<dyn EntityLinker>,
    ) -> ConsistencyResolver {
        ConsistencyResolver::standard(relations.clone(), linker, config.resolver.min_score)
            .with_objective(config.resolver.objective.build())
            .with_mixing_iterations(config.resolver.mixing_iterations)
            .with_seed(config.resolver.seed)
    }

    /// Swap the entity linker. The standard resolver is rebuilt so that
    /// duplicate-value suppression uses the same linker.
    pub fn with_linker(mut self, linker: Arc<dyn EntityLinker>) -> Self {
        self.resolver = Self::standard_resolver(&self.config, &self.relations, linker.clone());
        self.linker = linker;
        self
    }

    pub fn with_near_duplicate(mut self, near_duplicate: Arc<dyn NearDuplicate>) -> Self {
        self.near_duplicate = near_duplicate;
        self
    }

    pub fn with_resolver(mut self, resolver: ConsistencyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_post_processor(mut self, processor: Arc<dyn SlotfillPostProcessor>) -> Self {
        self.post_processor = Some(processor);
        self
    }

    pub fn config(&self) -> &ReasonerConfig {
        &self.config
    }

    pub fn relations(&self) -> &RelationTable {
        &self.relations
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn resolver(&self) -> &ConsistencyResolver {
        &self.resolver
    }

    /// Build the entity graph. Candidates the rule engine has no use for are
    /// skipped; candidates that cannot become edges are discarded as
    /// malformed.
    pub fn build_graph(
        &self,
        query: &Entity,
        candidates: Vec<Fact>,
        checklist: &dyn Checklist,
    ) -> EntityGraph {
        let mut graph = EntityGraph::with_merge_strategy(self.config.graph.merge_strategy);
        graph.add_vertex(query.clone());
        for fact in candidates {
            checklist.register(&fact);
            if !self.engine.is_useful(&fact.relation) {
                tracing::debug!(%fact, "skipping candidate with unused relation");
                continue;
            }
            if let Err(e) = graph.add_fact(fact.clone()) {
                tracing::warn!(error = %e, "dropping candidate fact");
                checklist.discard(&fact, DiscardReason::Malformed);
            }
        }
        graph
    }

    /// Run every stage for one query entity.
    pub fn run(
        &self,
        query: &Entity,
        candidates: Vec<Fact>,
        checklist: &dyn Checklist,
    ) -> ReasonerOutput {
        let mut stages = Vec::new();
        let mut record = |stage: StageKind, graph: &EntityGraph| {
            stages.push(StageReport {
                stage,
                vertices: graph.vertex_count(),
                edges: graph.edge_count(),
            });
        };

        let proposed = candidates.len();
        let mut graph = self.build_graph(query, candidates, checklist);
        record(StageKind::Build, &graph);

        let mut pivot = graph.vertex(query).cloned().unwrap_or_else(|| query.clone());
        if self.config.merge.enabled {
            let merge = EntityMergePass::new(self.linker.clone(), self.near_duplicate.clone())
                .with_alternate_names(self.config.merge.assert_alternate_names);
            let reps = merge.representatives(&graph);
            if let Some(rep) = reps.get(&pivot) {
                pivot = rep.clone();
            }
            graph = merge.merge_with(graph, &reps, checklist);
            graph.debug_assert_valid();
            record(StageKind::Merge, &graph);
        }

        let rewrites = PassPipeline::new()
            .with_pass(TransitivePass::new(self.relations.clone()))
            .with_pass(SymmetricPass::new(self.relations.clone()));
        graph = rewrites.apply(graph, checklist);
        record(StageKind::Rewrite, &graph);

        let mut inferred = Vec::new();
        if self.config.inference.enabled {
            let report = self.engine.apply(&mut graph, &pivot);
            for fact in &report.inferred {
                checklist.register(fact);
            }
            inferred = report.inferred;
            record(StageKind::Infer, &graph);
        }

        graph = graph.restrict_to(&graph.connected_component(&pivot));
        record(StageKind::Restrict, &graph);

        if let Some(processor) = &self.post_processor {
            let pass = PostProcessPass::new(processor.clone(), self.relations.clone())
                .for_query(pivot.clone());
            graph = pass.apply(graph, checklist);
            graph.debug_assert_valid();
            record(StageKind::PostProcess, &graph);
        }

        let facts: Vec<Fact> = graph
            .facts_of(&pivot)
            .into_iter()
            .filter(|f| self.relations.is_official(&f.relation))
            .collect();
        let resolution = self.resolver.resolve(&pivot, facts, checklist);
        record(StageKind::Resolve, &graph);

        tracing::info!(
            query = %pivot,
            proposed,
            inferred = inferred.len(),
            accepted = resolution.accepted.len(),
            "reasoner run complete"
        );

        ReasonerOutput {
            query: pivot,
            graph,
            inferred,
            resolution,
            stages,
        }
    }

    /// Run independent queries in parallel. Output order follows input order.
    pub fn run_batch(&self, jobs: Vec<BatchJob>, checklist: &dyn Checklist) -> Vec<ReasonerOutput> {
        jobs.into_par_iter()
            .map(|job| self.run(&job.query, job.candidates, checklist))
            .collect()
    }
}

impl fmt::Debug for Reasoner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reasoner")
            .field("config", &self.config)
            .field("relations", &self.relations.len())
            .field("engine", &self.engine)
            .field("resolver", &self.resolver)
            .field("post_processor", &self.post_processor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checklist::{MemoryChecklist, NoopChecklist};
    use crate::entity::EntityType;

    fn query() -> Entity {
        Entity::official(
            "Jane Doe",
            EntityType::Person,
            Some("E0001".into()),
            Some("SF_001".into()),
        )
    }

    fn fact(relation: &str, value: &str, ty: EntityType, score: f64) -> Fact {
        Fact::new(query(), relation, value)
            .with_value_type(ty)
            .with_score(score)
    }

    fn reasoner() -> Reasoner {
        Reasoner::new(ReasonerConfig::default()).unwrap()
    }

    #[test]
    fn single_valued_conflict_is_resolved() {
        let candidates = vec![
            fact("per:date_of_birth", "1970-01-01", EntityType::Date, 0.9),
            fact("per:date_of_birth", "1971-02-02", EntityType::Date, 0.3),
            fact("per:title", "senator", EntityType::Title, 0.6),
        ];
        let out = reasoner().run(&query(), candidates, &NoopChecklist);
        let values: Vec<&str> = out.accepted().iter().map(|f| f.value.as_str()).collect();
        assert_eq!(values, vec!["1970-01-01", "senator"]);
        assert!(out.query.is_official());
    }

    #[test]
    fn merged_mentions_pool_their_facts() {
        // "Doe" links to "Jane Doe"; its facts move to the official query.
        let doe = Entity::anonymous("Doe", EntityType::Person);
        let candidates = vec![
            Fact::new(doe.clone(), "per:title", "senator")
                .with_value_type(EntityType::Title)
                .with_score(0.7),
            fact("per:city_of_birth", "Springfield", EntityType::City, 0.8),
        ];
        let out = reasoner().run(&query(), candidates, &NoopChecklist);
        assert!(out.accepted().iter().any(|f| f.value == "senator"));
        assert!(out.accepted().iter().all(|f| f.entity == query()));
        assert!(!out.graph.contains(&doe));
    }

    #[test]
    fn inference_and_symmetry_feed_the_resolver() {
        let spouse = Entity::anonymous("John Roe", EntityType::Person);
        let kid = Entity::anonymous("Kim Roe", EntityType::Person);
        let candidates = vec![
            Fact::between(query(), "per:children", &kid).with_score(0.8),
            Fact::between(query(), "per:spouse", &spouse).with_score(0.9),
        ];
        let checklist = MemoryChecklist::new();
        let out = reasoner().run(&query(), candidates, &checklist);

        // Symmetric completion adds the inverse edges.
        assert_eq!(out.graph.relations_named(&spouse, "per:spouse").count(), 1);
        assert_eq!(out.graph.relations_named(&kid, "per:parents").count(), 1);

        // The family rule makes the kid other family of the spouse.
        assert_eq!(out.inferred.len(), 1);
        let inferred = &out.inferred[0];
        assert_eq!(inferred.entity, spouse);
        assert_eq!(inferred.relation, "per:other_family");
        assert_eq!(inferred.value, "Kim Roe");
        assert!((inferred.score.unwrap() - 0.72).abs() < 1e-9);

        assert_eq!(out.accepted().len(), 2);
        assert_eq!(checklist.accepted().len(), 2);
        let stages: Vec<StageKind> = out.stages.iter().map(|s| s.stage).collect();
        assert_eq!(
            stages,
            vec![
                StageKind::Build,
                StageKind::Merge,
                StageKind::Rewrite,
                StageKind::Infer,
                StageKind::Restrict,
                StageKind::Resolve
            ]
        );
    }

    #[test]
    fn unreachable_entities_are_dropped() {
        let stranger = Entity::anonymous("Zed Q", EntityType::Person);
        let org = Entity::anonymous("Acme", EntityType::Organization);
        let candidates = vec![
            Fact::between(stranger.clone(), "per:employee_or_member_of", &org).with_score(0.9),
            fact("per:title", "senator", EntityType::Title, 0.6),
        ];
        let out = reasoner().run(&query(), candidates, &NoopChecklist);
        assert!(!out.graph.contains(&stranger));
        assert_eq!(out.accepted().len(), 1);
    }

    #[test]
    fn entity_linking_scans_each_pair_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        use crate::oracle::EntityContext;

        #[derive(Default)]
        struct CountingLinker {
            calls: AtomicUsize,
        }
        impl EntityLinker for CountingLinker {
            fn same_entity(&self, a: &EntityContext<'_>, b: &EntityContext<'_>) -> bool {
                self.calls.fetch_add(1, Ordering::Relaxed);
                NameLinker.same_entity(a, b)
            }
        }

        let linker = Arc::new(CountingLinker::default());
        let r = reasoner()
            .with_linker(linker.clone())
            .with_resolver(ConsistencyResolver::new());
        let candidates = vec![
            fact("per:title", "senator", EntityType::Title, 0.6),
            fact("per:city_of_birth", "Springfield", EntityType::City, 0.8),
        ];
        let out = r.run(&query(), candidates, &NoopChecklist);
        assert_eq!(out.stages[0].vertices, 3);
        assert_eq!(linker.calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn malformed_candidates_are_discarded() {
        let untyped = Fact::new(query(), "per:title", "senator").with_score(0.5);
        let checklist = MemoryChecklist::new();
        let out = reasoner().run(&query(), vec![untyped.clone()], &checklist);
        assert!(out.accepted().is_empty());
        assert_eq!(checklist.discarded(DiscardReason::Malformed), vec![untyped.key()]);
    }

    #[test]
    fn batch_matches_sequential_runs() {
        let r = reasoner();
        let jobs: Vec<BatchJob> = (0..4)
            .map(|i| {
                let q = Entity::official(
                    format!("Person {i}"),
                    EntityType::Person,
                    Some(format!("E{i}")),
                    Some(format!("Q{i}")),
                );
                BatchJob {
                    candidates: vec![
                        Fact::new(q.clone(), "per:age", format!("{}", 30 + i))
                            .with_value_type(EntityType::Number)
                            .with_score(0.8),
                        Fact::new(q.clone(), "per:age", "99")
                            .with_value_type(EntityType::Number)
                            .with_score(0.1),
                    ],
                    query: q,
                }
            })
            .collect();
        let parallel = r.run_batch(jobs.clone(), &NoopChecklist);
        assert_eq!(parallel.len(), 4);
        for (job, out) in jobs.into_iter().zip(&parallel) {
            let seq = r.run(&job.query, job.candidates, &NoopChecklist);
            assert_eq!(seq.accepted(), out.accepted());
            assert_eq!(out.accepted().len(), 1);
        }
    }
}
