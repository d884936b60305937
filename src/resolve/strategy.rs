//! Pluggable consistency strategies and their combinators.
//!
//! Four families, one trait each:
//!
//! - [`SingletonStrategy`]: is a fact plausible on its own, possibly after a rewrite?
//! - [`PairwiseStrategy`]: does the lower-scoring of two facts survive the higher one?
//! - [`LeaveOneOutStrategy`]: does a fact survive against everything else accepted?
//! - [`EntailmentStrategy`]: which further facts does a fact directly imply?
//!
//! [`AcceptAll`] is the identity for all of them. Combinators chain several
//! strategies of one family with logical AND: [`SingletonChain`] threads
//! rewrites through and stops at the first rejection, while [`AllPairwise`]
//! and [`AllLeaveOneOut`] always ask every member.

use std::sync::Arc;

use crate::entity::{Entity, EntityType};
use crate::fact::Fact;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Single-fact validity with optional rewrite.
pub trait SingletonStrategy: Send + Sync {
    /// `Some(fact)` (possibly rewritten) if the candidate is acceptable,
    /// `None` to reject it.
    fn is_valid(&self, pivot: &Entity, candidate: &Fact) -> Option<Fact>;
}

/// Pairwise consistency between a higher- and a lower-scoring fact.
pub trait PairwiseStrategy: Send + Sync {
    fn keep_lower(&self, pivot: &Entity, higher: &Fact, lower: &Fact) -> bool;
}

/// Consistency of one fact against all other currently accepted facts.
pub trait LeaveOneOutStrategy: Send + Sync {
    fn keep_held_out(&self, pivot: &Entity, others: &[&Fact], candidate: &Fact) -> bool;
}

/// A `(relation, value)` consequence of a fact about the same pivot.
#[derive(Debug, Clone, PartialEq)]
pub struct Entailment {
    pub relation: String,
    pub value: String,
    pub value_type: Option<EntityType>,
    /// Multiplied into the antecedent's score.
    pub weight: f64,
}

impl Entailment {
    pub fn new(relation: impl Into<String>, value: impl Into<String>, weight: f64) -> Self {
        Self {
            relation: relation.into(),
            value: value.into(),
            value_type: None,
            weight,
        }
    }

    pub fn with_value_type(mut self, value_type: EntityType) -> Self {
        self.value_type = Some(value_type);
        self
    }
}

/// Direct entailment: facts implied by one antecedent.
pub trait EntailmentStrategy: Send + Sync {
    fn entailments(&self, pivot: &Entity, antecedent: &Fact) -> Vec<Entailment>;
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Accepts everything and entails nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl SingletonStrategy for AcceptAll {
    fn is_valid(&self, _pivot: &Entity, candidate: &Fact) -> Option<Fact> {
        Some(candidate.clone())
    }
}

impl PairwiseStrategy for AcceptAll {
    fn keep_lower(&self, _pivot: &Entity, _higher: &Fact, _lower: &Fact) -> bool {
        true
    }
}

impl LeaveOneOutStrategy for AcceptAll {
    fn keep_held_out(&self, _pivot: &Entity, _others: &[&Fact], _candidate: &Fact) -> bool {
        true
    }
}

impl EntailmentStrategy for AcceptAll {
    fn entailments(&self, _pivot: &Entity, _antecedent: &Fact) -> Vec<Entailment> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Combinators
// ---------------------------------------------------------------------------

/// Logical AND over singleton strategies.
///
/// Each member sees the previous member's rewrite. The first rejection ends
/// the chain; later members are not asked.
#[derive(Clone, Default)]
pub struct SingletonChain {
    members: Vec<Arc<dyn SingletonStrategy>>,
}

impl SingletonChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, strategy: impl SingletonStrategy + 'static) -> Self {
        self.members.push(Arc::new(strategy));
        self
    }

    pub fn push(&mut self, strategy: Arc<dyn SingletonStrategy>) {
        self.members.push(strategy);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl SingletonStrategy for SingletonChain {
    fn is_valid(&self, pivot: &Entity, candidate: &Fact) -> Option<Fact> {
        let mut current = candidate.clone();
        for member in &self.members {
            current = member.is_valid(pivot, &current)?;
        }
        Some(current)
    }
}

/// Logical AND over pairwise strategies. Every member is evaluated.
#[derive(Clone, Default)]
pub struct AllPairwise {
    members: Vec<Arc<dyn PairwiseStrategy>>,
}

impl AllPairwise {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, strategy: impl PairwiseStrategy + 'static) -> Self {
        self.members.push(Arc::new(strategy));
        self
    }

    pub fn push(&mut self, strategy: Arc<dyn PairwiseStrategy>) {
        self.members.push(strategy);
    }
}

impl PairwiseStrategy for AllPairwise {
    fn keep_lower(&self, pivot: &Entity, higher: &Fact, lower: &Fact) -> bool {
        self.members
            .iter()
            .fold(true, |keep, m| m.keep_lower(pivot, higher, lower) & keep)
    }
}

/// Logical AND over leave-one-out strategies. Every member is evaluated.
#[derive(Clone, Default)]
pub struct AllLeaveOneOut {
    members: Vec<Arc<dyn LeaveOneOutStrategy>>,
}

impl AllLeaveOneOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, strategy: impl LeaveOneOutStrategy + 'static) -> Self {
        self.members.push(Arc::new(strategy));
        self
    }

    pub fn push(&mut self, strategy: Arc<dyn LeaveOneOutStrategy>) {
        self.members.push(strategy);
    }
}

impl LeaveOneOutStrategy for AllLeaveOneOut {
    fn keep_held_out(&self, pivot: &Entity, others: &[&Fact], candidate: &Fact) -> bool {
        self.members
            .iter()
            .fold(true, |keep, m| m.keep_held_out(pivot, others, candidate) & keep)
    }
}

/// Union of the entailments of several strategies.
#[derive(Clone, Default)]
pub struct AnyEntailment {
    members: Vec<Arc<dyn EntailmentStrategy>>,
}

impl AnyEntailment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, strategy: impl EntailmentStrategy + 'static) -> Self {
        self.members.push(Arc::new(strategy));
        self
    }

    pub fn push(&mut self, strategy: Arc<dyn EntailmentStrategy>) {
        self.members.push(strategy);
    }
}

impl EntailmentStrategy for AnyEntailment {
    fn entailments(&self, pivot: &Entity, antecedent: &Fact) -> Vec<Entailment> {
        self.members
            .iter()
            .flat_map(|m| m.entailments(pivot, antecedent))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn pivot() -> Entity {
        Entity::anonymous("Jane Doe", EntityType::Person)
    }

    fn fact(value: &str) -> Fact {
        Fact::new(pivot(), "per:title", value).with_score(0.5)
    }

    struct Counting<T> {
        calls: Arc<AtomicUsize>,
        answer: T,
    }

    impl SingletonStrategy for Counting<bool> {
        fn is_valid(&self, _pivot: &Entity, candidate: &Fact) -> Option<Fact> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.then(|| candidate.clone())
        }
    }

    impl PairwiseStrategy for Counting<bool> {
        fn keep_lower(&self, _pivot: &Entity, _h: &Fact, _l: &Fact) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    impl LeaveOneOutStrategy for Counting<bool> {
        fn keep_held_out(&self, _pivot: &Entity, _o: &[&Fact], _c: &Fact) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    struct Uppercase;

    impl SingletonStrategy for Uppercase {
        fn is_valid(&self, _pivot: &Entity, candidate: &Fact) -> Option<Fact> {
            Some(candidate.with_value(candidate.value.to_uppercase()))
        }
    }

    struct RequireUppercase;

    impl SingletonStrategy for RequireUppercase {
        fn is_valid(&self, _pivot: &Entity, candidate: &Fact) -> Option<Fact> {
            (candidate.value == candidate.value.to_uppercase()).then(|| candidate.clone())
        }
    }

    #[test]
    fn accept_all_is_identity() {
        let f = fact("ceo");
        assert_eq!(AcceptAll.is_valid(&pivot(), &f), Some(f.clone()));
        assert!(PairwiseStrategy::keep_lower(&AcceptAll, &pivot(), &f, &f));
        assert!(LeaveOneOutStrategy::keep_held_out(&AcceptAll, &pivot(), &[], &f));
        assert!(AcceptAll.entailments(&pivot(), &f).is_empty());
    }

    #[test]
    fn singleton_chain_threads_rewrites() {
        let chain = SingletonChain::new().with(Uppercase).with(RequireUppercase);
        let out = chain.is_valid(&pivot(), &fact("ceo")).unwrap();
        assert_eq!(out.value, "CEO");

        let reversed = SingletonChain::new().with(RequireUppercase).with(Uppercase);
        assert!(reversed.is_valid(&pivot(), &fact("ceo")).is_none());
    }

    #[test]
    fn singleton_chain_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = SingletonChain::new()
            .with(Counting {
                calls: calls.clone(),
                answer: false,
            })
            .with(Counting {
                calls: calls.clone(),
                answer: true,
            });
        assert!(chain.is_valid(&pivot(), &fact("ceo")).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pairwise_and_evaluates_every_member() {
        let calls = Arc::new(AtomicUsize::new(0));
        let all = AllPairwise::new()
            .with(Counting {
                calls: calls.clone(),
                answer: false,
            })
            .with(Counting {
                calls: calls.clone(),
                answer: true,
            });
        assert!(!all.keep_lower(&pivot(), &fact("a"), &fact("b")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn leave_one_out_and_evaluates_every_member() {
        let calls = Arc::new(AtomicUsize::new(0));
        let all = AllLeaveOneOut::new()
            .with(Counting {
                calls: calls.clone(),
                answer: false,
            })
            .with(Counting {
                calls: calls.clone(),
                answer: false,
            });
        assert!(!all.keep_held_out(&pivot(), &[], &fact("a")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_combinators_accept() {
        let f = fact("ceo");
        assert_eq!(SingletonChain::new().is_valid(&pivot(), &f), Some(f.clone()));
        assert!(AllPairwise::new().keep_lower(&pivot(), &f, &f));
        assert!(AllLeaveOneOut::new().keep_held_out(&pivot(), &[], &f));
        assert!(AnyEntailment::new().entailments(&pivot(), &f).is_empty());
    }
}
