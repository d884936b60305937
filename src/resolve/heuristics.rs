//! Concrete consistency heuristics for TAC-KBP style slot filling.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use unicode_normalization::UnicodeNormalization;

use crate::entity::{Entity, EntityType};
use crate::fact::{Fact, sanitize_score};
use crate::oracle::{EntityContext, EntityLinker, normalize_name};
use crate::relation::RelationTable;

use super::strategy::{LeaveOneOutStrategy, PairwiseStrategy, SingletonStrategy};

// ---------------------------------------------------------------------------
// Singleton
// ---------------------------------------------------------------------------

/// Rejects facts scoring below a threshold.
///
/// NaN and infinite scores are rewritten to `0.0` before the comparison. An
/// absent score passes.
#[derive(Debug, Clone, Copy)]
pub struct MinScore {
    pub threshold: f64,
}

impl MinScore {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl SingletonStrategy for MinScore {
    fn is_valid(&self, _pivot: &Entity, candidate: &Fact) -> Option<Fact> {
        let Some(raw) = candidate.score else {
            return Some(candidate.clone());
        };
        let score = sanitize_score(raw, 0.0);
        if score < self.threshold {
            return None;
        }
        if score == raw {
            Some(candidate.clone())
        } else {
            Some(candidate.clone().with_score(score))
        }
    }
}

/// Checks a fact against the relation inventory: the relation must be
/// known, the pivot must have its subject type, and the value type (when
/// present) must be one the relation accepts.
#[derive(Debug, Clone)]
pub struct RelationSignature {
    relations: Arc<RelationTable>,
}

impl RelationSignature {
    pub fn new(relations: Arc<RelationTable>) -> Self {
        Self { relations }
    }
}

impl SingletonStrategy for RelationSignature {
    fn is_valid(&self, pivot: &Entity, candidate: &Fact) -> Option<Fact> {
        let info = self.relations.get(&candidate.relation)?;
        if info.subject_type != pivot.entity_type {
            return None;
        }
        match candidate.value_type {
            Some(ty) if !info.accepts_value_type(ty) => None,
            _ => Some(candidate.clone()),
        }
    }
}

/// Rejects facts whose value is the pivot's own name.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSelfReference;

impl SingletonStrategy for NoSelfReference {
    fn is_valid(&self, pivot: &Entity, candidate: &Fact) -> Option<Fact> {
        if normalize_name(&candidate.value) == normalize_name(&pivot.name) {
            None
        } else {
            Some(candidate.clone())
        }
    }
}

/// Rewrites the value to Unicode NFC with trimmed, single-spaced
/// whitespace. Empty values are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeValue;

impl NormalizeValue {
    pub fn normalize(value: &str) -> String {
        let composed: String = value.nfc().collect();
        composed.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl SingletonStrategy for NormalizeValue {
    fn is_valid(&self, _pivot: &Entity, candidate: &Fact) -> Option<Fact> {
        let normalized = Self::normalize(&candidate.value);
        if normalized.is_empty() {
            None
        } else if normalized == candidate.value {
            Some(candidate.clone())
        } else {
            Some(candidate.with_value(normalized))
        }
    }
}

// ---------------------------------------------------------------------------
// Pairwise
// ---------------------------------------------------------------------------

/// A single-valued slot holds one value: the lower-scoring of two different
/// values for the same single-valued relation is dropped.
#[derive(Debug, Clone)]
pub struct SingleValued {
    relations: Arc<RelationTable>,
}

impl SingleValued {
    pub fn new(relations: Arc<RelationTable>) -> Self {
        Self { relations }
    }
}

impl PairwiseStrategy for SingleValued {
    fn keep_lower(&self, _pivot: &Entity, higher: &Fact, lower: &Fact) -> bool {
        if higher.relation != lower.relation || !self.relations.is_single_valued(&higher.relation) {
            return true;
        }
        normalize_name(&higher.value) == normalize_name(&lower.value)
    }
}

/// The same relation should not list one referent twice. Values are
/// compared with an [`EntityLinker`], so "IBM" and "International Business
/// Machines" count as one value.
#[derive(Clone)]
pub struct DuplicateValue {
    linker: Arc<dyn EntityLinker>,
}

impl DuplicateValue {
    pub fn new(linker: Arc<dyn EntityLinker>) -> Self {
        Self { linker }
    }

    fn value_entity(fact: &Fact) -> Entity {
        fact.value_entity()
            .unwrap_or_else(|| Entity::anonymous(fact.value.clone(), EntityType::Misc))
    }
}

impl PairwiseStrategy for DuplicateValue {
    fn keep_lower(&self, _pivot: &Entity, higher: &Fact, lower: &Fact) -> bool {
        if higher.relation != lower.relation {
            return true;
        }
        if normalize_name(&higher.value) == normalize_name(&lower.value) {
            return false;
        }
        let (a, b) = (Self::value_entity(higher), Self::value_entity(lower));
        !self
            .linker
            .same_entity(&EntityContext::bare(&a), &EntityContext::bare(&b))
    }
}

/// Relations that cannot hold between the pivot and the same value at once,
/// such as someone being both a parent and a child of the same person.
#[derive(Debug, Clone, Default)]
pub struct ExclusiveRelations {
    pairs: HashSet<(String, String)>,
}

impl ExclusiveRelations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `a` and `b` mutually exclusive (in both directions).
    pub fn with_pair(mut self, a: &str, b: &str) -> Self {
        self.pairs.insert((a.to_string(), b.to_string()));
        self.pairs.insert((b.to_string(), a.to_string()));
        self
    }

    pub fn are_exclusive(&self, a: &str, b: &str) -> bool {
        self.pairs.contains(&(a.to_string(), b.to_string()))
    }

    /// Family and corporate-structure exclusions.
    pub fn kbp() -> Self {
        Self::new()
            .with_pair("per:parents", "per:children")
            .with_pair("per:parents", "per:siblings")
            .with_pair("per:parents", "per:spouse")
            .with_pair("per:children", "per:siblings")
            .with_pair("per:children", "per:spouse")
            .with_pair("per:siblings", "per:spouse")
            .with_pair("org:subsidiaries", "org:parents")
            .with_pair("org:members", "org:member_of")
    }
}

impl PairwiseStrategy for ExclusiveRelations {
    fn keep_lower(&self, _pivot: &Entity, higher: &Fact, lower: &Fact) -> bool {
        if !self.are_exclusive(&higher.relation, &lower.relation) {
            return true;
        }
        normalize_name(&higher.value) != normalize_name(&lower.value)
    }
}

// ---------------------------------------------------------------------------
// Leave-one-out
// ---------------------------------------------------------------------------

/// Caps how many values a list-valued relation may carry.
///
/// A fact survives if fewer than `limit` of the other accepted facts share
/// its relation.
#[derive(Debug, Clone, Default)]
pub struct CardinalityLimit {
    limits: HashMap<String, usize>,
}

impl CardinalityLimit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, relation: &str, limit: usize) -> Self {
        self.limits.insert(relation.to_string(), limit);
        self
    }

    pub fn limit_for(&self, relation: &str) -> Option<usize> {
        self.limits.get(relation).copied()
    }

    /// A person has at most two parents.
    pub fn kbp() -> Self {
        Self::new().with_limit("per:parents", 2)
    }
}

impl LeaveOneOutStrategy for CardinalityLimit {
    fn keep_held_out(&self, _pivot: &Entity, others: &[&Fact], candidate: &Fact) -> bool {
        let Some(limit) = self.limit_for(&candidate.relation) else {
            return true;
        };
        let siblings = others
            .iter()
            .filter(|f| f.relation == candidate.relation)
            .count();
        siblings < limit
    }
}
