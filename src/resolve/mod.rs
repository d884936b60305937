//! Consistency resolution: choose a maximal self-consistent subset of an
//! entity's candidate facts.
//!
//! [`ConsistencyResolver::resolve`] runs `filter(generate(filter(candidates)))`:
//!
//! 1. **filter**: singleton validity (with rewrite), then a greedy
//!    activation in descending score order under pairwise and leave-one-out
//!    consistency, refined by seeded random restarts that maximize an
//!    [`Objective`];
//! 2. **generate**: breadth-first closure over the direct-entailment
//!    strategy;
//! 3. **filter** again, so entailed facts meet the same bar.
//!
//! Every strategy is a trait object, and [`AcceptAll`] is the identity for
//! each family. The random source is injectable via
//! [`ConsistencyResolver::resolve_with_rng`]; [`ConsistencyResolver::resolve`]
//! seeds a [`StdRng`] from the configured seed, so results are reproducible.

pub mod entail;
pub mod heuristics;
pub mod objective;
pub mod strategy;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::checklist::{Checklist, DiscardReason};
use crate::entity::Entity;
use crate::fact::{Fact, FactKey, sanitize_score};
use crate::oracle::EntityLinker;
use crate::relation::RelationTable;

pub use entail::{Gazetteer, GeoEntailment, ImpliedRelation};
pub use heuristics::{
    CardinalityLimit, DuplicateValue, ExclusiveRelations, MinScore, NoSelfReference,
    NormalizeValue, RelationSignature, SingleValued,
};
pub use objective::{Mean, Objective, ObjectiveKind, Sum, Top, resolver_score};
pub use strategy::{
    AcceptAll, AllLeaveOneOut, AllPairwise, AnyEntailment, Entailment, EntailmentStrategy,
    LeaveOneOutStrategy, PairwiseStrategy, SingletonChain, SingletonStrategy,
};

/// Per-entity filter/rewrite over an entity's official facts.
pub trait SlotfillPostProcessor: Send + Sync {
    fn process(&self, pivot: &Entity, facts: Vec<Fact>, checklist: &dyn Checklist) -> Vec<Fact>;
}

/// Result of one filter step.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Accepted facts, in descending score order.
    pub active: Vec<Fact>,
    /// Facts left inactive by the consistency search.
    pub inconsistent: Vec<Fact>,
    /// Objective value of `active`.
    pub objective: f64,
    /// Best objective after the greedy pass and after every refinement
    /// iteration. Never decreases.
    pub trace: Vec<f64>,
}

/// Result of a full resolve.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub accepted: Vec<Fact>,
    /// Facts added by the entailment step (before the second filter).
    pub entailed: Vec<Fact>,
    pub first_pass: FilterOutcome,
    pub second_pass: FilterOutcome,
}

impl Resolution {
    pub fn objective(&self) -> f64 {
        self.second_pass.objective
    }
}

/// Strategy-driven consistency resolver for one pivot entity at a time.
#[derive(Clone)]
pub struct ConsistencyResolver {
    singleton: Arc<dyn SingletonStrategy>,
    pairwise: Arc<dyn PairwiseStrategy>,
    leave_one_out: Arc<dyn LeaveOneOutStrategy>,
    entailment: Arc<dyn EntailmentStrategy>,
    objective: Arc<dyn Objective>,
    mixing_iterations: usize,
    seed: u64,
}

impl Default for ConsistencyResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsistencyResolver {
    pub const DEFAULT_MIXING_ITERATIONS: usize = 100;
    pub const DEFAULT_SEED: u64 = 42;

    /// A resolver that accepts everything, with the sum objective.
    pub fn new() -> Self {
        Self {
            singleton: Arc::new(AcceptAll),
            pairwise: Arc::new(AcceptAll),
            leave_one_out: Arc::new(AcceptAll),
            entailment: Arc::new(AcceptAll),
            objective: Arc::new(Sum),
            mixing_iterations: Self::DEFAULT_MIXING_ITERATIONS,
            seed: Self::DEFAULT_SEED,
        }
    }

    /// The slot-filling heuristics over the given relation inventory.
    pub fn standard(
        relations: Arc<RelationTable>,
        linker: Arc<dyn EntityLinker>,
        min_score: f64,
    ) -> Self {
        Self::new()
            .with_singleton(
                SingletonChain::new()
                    .with(MinScore::new(min_score))
                    .with(NormalizeValue)
                    .with(NoSelfReference)
                    .with(RelationSignature::new(relations.clone())),
            )
            .with_pairwise(
                AllPairwise::new()
                    .with(SingleValued::new(relations))
                    .with(DuplicateValue::new(linker))
                    .with(ExclusiveRelations::kbp()),
            )
            .with_leave_one_out(CardinalityLimit::kbp())
            .with_entailment(ImpliedRelation::kbp())
    }

    pub fn with_singleton(mut self, strategy: impl SingletonStrategy + 'static) -> Self {
        self.singleton = Arc::new(strategy);
        self
    }

    pub fn with_pairwise(mut self, strategy: impl PairwiseStrategy + 'static) -> Self {
        self.pairwise = Arc::new(strategy);
        self
    }

    pub fn with_leave_one_out(mut self, strategy: impl LeaveOneOutStrategy + 'static) -> Self {
        self.leave_one_out = Arc::new(strategy);
        self
    }

    pub fn with_entailment(mut self, strategy: impl EntailmentStrategy + 'static) -> Self {
        self.entailment = Arc::new(strategy);
        self
    }

    pub fn with_objective(mut self, objective: Arc<dyn Objective>) -> Self {
        self.objective = objective;
        self
    }

    pub fn with_mixing_iterations(mut self, iterations: usize) -> Self {
        self.mixing_iterations = iterations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn objective_name(&self) -> &str {
        self.objective.name()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// `filter(generate(filter(candidates)))` with the configured seed.
    pub fn resolve(
        &self,
        pivot: &Entity,
        candidates: Vec<Fact>,
        checklist: &dyn Checklist,
    ) -> Resolution {
        let mut rng = StdRng::seed_from_u64(self.seed);
        self.resolve_with_rng(pivot, candidates, checklist, &mut rng)
    }

    /// Like [`resolve`](Self::resolve) with a caller-supplied random source.
    pub fn resolve_with_rng<R: Rng + ?Sized>(
        &self,
        pivot: &Entity,
        candidates: Vec<Fact>,
        checklist: &dyn Checklist,
        rng: &mut R,
    ) -> Resolution {
        let proposed = candidates.len();
        let first_pass = self.filter_step(pivot, candidates, checklist, rng);
        let expanded = self.generate_step(pivot, first_pass.active.clone(), checklist);
        let seen: HashSet<FactKey> = first_pass.active.iter().map(Fact::key).collect();
        let entailed: Vec<Fact> = expanded
            .iter()
            .filter(|f| !seen.contains(&f.key()))
            .cloned()
            .collect();
        let second_pass = self.filter_step(pivot, expanded, checklist, rng);

        for fact in &second_pass.active {
            checklist.accept(fact);
        }
        tracing::debug!(
            pivot = %pivot,
            proposed,
            entailed = entailed.len(),
            accepted = second_pass.active.len(),
            objective = second_pass.objective,
            "resolved candidate facts"
        );

        Resolution {
            accepted: second_pass.active.clone(),
            entailed,
            first_pass,
            second_pass,
        }
    }

    // -----------------------------------------------------------------------
    // Filter
    // -----------------------------------------------------------------------

    /// Singleton pass followed by the nonlocal consistency search.
    pub fn filter_step<R: Rng + ?Sized>(
        &self,
        pivot: &Entity,
        candidates: Vec<Fact>,
        checklist: &dyn Checklist,
        rng: &mut R,
    ) -> FilterOutcome {
        let facts = self.rank(self.singleton_pass(pivot, candidates, checklist));
        let n = facts.len();

        let greedy_order: Vec<usize> = (0..n).collect();
        let mut best = self.activate(pivot, &facts, &greedy_order);
        let mut best_score = self.objective.evaluate(&best, &facts);
        let mut trace = vec![best_score];

        if !self.objective.is_trivial() && n > 1 {
            let mut order = greedy_order;
            for _ in 0..self.mixing_iterations {
                order.shuffle(rng);
                let candidate = self.activate(pivot, &facts, &order);
                let score = self.objective.evaluate(&candidate, &facts);
                if score > best_score {
                    best = candidate;
                    best_score = score;
                }
                trace.push(best_score);
            }
        }

        let mut active = Vec::new();
        let mut inconsistent = Vec::new();
        for (fact, on) in facts.into_iter().zip(best) {
            if on {
                active.push(fact);
            } else {
                checklist.discard(&fact, DiscardReason::Inconsistent);
                inconsistent.push(fact);
            }
        }

        FilterOutcome {
            active,
            inconsistent,
            objective: best_score,
            trace,
        }
    }

    /// Apply the singleton strategy, recording rewrites and rejections.
    /// Surviving scores are clamped into `[0, 1]`, with NaN and infinities
    /// becoming `0.0`. Facts that rewrite onto the same key collapse to the
    /// higher-scoring one.
    fn singleton_pass(
        &self,
        pivot: &Entity,
        candidates: Vec<Fact>,
        checklist: &dyn Checklist,
    ) -> Vec<Fact> {
        let mut out: Vec<Fact> = Vec::with_capacity(candidates.len());
        let mut by_key: HashMap<FactKey, usize> = HashMap::new();
        for candidate in candidates {
            let Some(mut valid) = self.singleton.is_valid(pivot, &candidate) else {
                checklist.discard(&candidate, DiscardReason::Singleton);
                continue;
            };
            if let Some(raw) = valid.score {
                let clean = sanitize_score(raw, 0.0);
                if clean.to_bits() != raw.to_bits() {
                    valid.score = Some(clean);
                }
            }
            if valid != candidate {
                checklist.rewrite(&candidate, &valid);
            }
            match by_key.get(&valid.key()) {
                Some(&slot) => {
                    if resolver_score(&valid) > resolver_score(&out[slot]) {
                        out[slot] = valid;
                    }
                }
                None => {
                    by_key.insert(valid.key(), out.len());
                    out.push(valid);
                }
            }
        }
        out
    }

    /// Sort by descending score, ties broken by fact key.
    fn rank(&self, mut facts: Vec<Fact>) -> Vec<Fact> {
        facts.sort_by(|a, b| {
            resolver_score(b)
                .total_cmp(&resolver_score(a))
                .then_with(|| a.key().cmp(&b.key()))
        });
        facts
    }

    /// Greedy activation visiting `facts` in `order`. Each fact is activated
    /// iff the enlarged active set is still consistent.
    fn activate(&self, pivot: &Entity, facts: &[Fact], order: &[usize]) -> Vec<bool> {
        let mut active = vec![false; facts.len()];
        let mut members: Vec<usize> = Vec::with_capacity(facts.len());
        for &i in order {
            if self.consistent_with(pivot, facts, &members, i) {
                active[i] = true;
                members.push(i);
            }
        }
        active
    }

    /// Whether `members ∪ {candidate}` satisfies the pairwise and
    /// leave-one-out strategies. `members` is assumed consistent already.
    /// Singleton validity holds for every fact after the singleton pass.
    fn consistent_with(
        &self,
        pivot: &Entity,
        facts: &[Fact],
        members: &[usize],
        candidate: usize,
    ) -> bool {
        // A lower index is a higher rank.
        for &m in members {
            let (hi, lo) = if m < candidate { (m, candidate) } else { (candidate, m) };
            if !self.pairwise.keep_lower(pivot, &facts[hi], &facts[lo]) {
                return false;
            }
        }

        let mut trial: Vec<usize> = members.to_vec();
        trial.push(candidate);
        for (pos, &held_out) in trial.iter().enumerate() {
            let others: Vec<&Fact> = trial
                .iter()
                .enumerate()
                .filter(|(p, _)| *p != pos)
                .map(|(_, &j)| &facts[j])
                .collect();
            if !self.leave_one_out.keep_held_out(pivot, &others, &facts[held_out]) {
                return false;
            }
        }
        true
    }

    // -----------------------------------------------------------------------
    // Generate
    // -----------------------------------------------------------------------

    /// Breadth-first closure over direct entailment. Returns the input facts
    /// followed by every newly entailed fact, each at most once.
    pub fn generate_step(
        &self,
        pivot: &Entity,
        facts: Vec<Fact>,
        checklist: &dyn Checklist,
    ) -> Vec<Fact> {
        let mut visited: HashSet<FactKey> = facts.iter().map(Fact::key).collect();
        let mut queue: VecDeque<Fact> = facts.iter().cloned().collect();
        let mut out = facts;

        while let Some(antecedent) = queue.pop_front() {
            for entailment in self.entailment.entailments(pivot, &antecedent) {
                let weight = sanitize_score(entailment.weight, 0.0);
                let entailed = Fact {
                    entity: pivot.clone(),
                    relation: entailment.relation,
                    value: entailment.value,
                    value_type: entailment.value_type,
                    provenance: antecedent.provenance.clone(),
                    score: Some(antecedent.bounded_score() * weight),
                };
                if !visited.insert(entailed.key()) {
                    continue;
                }
                checklist.register(&entailed);
                queue.push_back(entailed.clone());
                out.push(entailed);
            }
        }
        out
    }
}

impl SlotfillPostProcessor for ConsistencyResolver {
    fn process(&self, pivot: &Entity, facts: Vec<Fact>, checklist: &dyn Checklist) -> Vec<Fact> {
        self.resolve(pivot, facts, checklist).accepted
    }
}

impl std::fmt::Debug for ConsistencyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyResolver")
            .field("objective", &self.objective.name())
            .field("mixing_iterations", &self.mixing_iterations)
            .field("seed", &self.seed)
            .finish()
    }
}
