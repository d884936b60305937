//! External collaborators consumed by the engine.
//!
//! Entity linking, near-duplicate name detection and relation scoring are
//! supplied from outside; this module defines their contracts plus simple
//! name-based baselines that are good enough for tests and small batches.
//! All implementations must be pure: the engine calls them repeatedly and in
//! any order.

use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;

use crate::entity::{Entity, EntityType};
use crate::fact::{Fact, Provenance};

// ---------------------------------------------------------------------------
// Entity linking
// ---------------------------------------------------------------------------

/// An entity together with the evidence attached to it in the graph.
#[derive(Debug, Clone, Copy)]
pub struct EntityContext<'a> {
    pub entity: &'a Entity,
    /// The entity's outgoing facts.
    pub evidence: &'a [Fact],
}

impl<'a> EntityContext<'a> {
    pub fn new(entity: &'a Entity, evidence: &'a [Fact]) -> Self {
        Self { entity, evidence }
    }

    /// Context with no supporting evidence.
    pub fn bare(entity: &'a Entity) -> Self {
        Self {
            entity,
            evidence: &[],
        }
    }
}

/// Decides whether two contexts denote the same real-world referent.
pub trait EntityLinker: Send + Sync {
    fn same_entity(&self, a: &EntityContext<'_>, b: &EntityContext<'_>) -> bool;
}

/// Name-based linker.
///
/// Two entities link when their types are compatible and either their
/// normalized names are equal, one is the acronym of an organization name, or
/// one is the last name of a multi-token person name.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameLinker;

impl NameLinker {
    fn types_compatible(a: EntityType, b: EntityType) -> bool {
        a == b || (a.is_place() && b.is_place())
    }
}

impl EntityLinker for NameLinker {
    fn same_entity(&self, a: &EntityContext<'_>, b: &EntityContext<'_>) -> bool {
        let (ea, eb) = (a.entity, b.entity);
        if !Self::types_compatible(ea.entity_type, eb.entity_type) {
            return false;
        }
        let na = normalize_name(&ea.name);
        let nb = normalize_name(&eb.name);
        if na.is_empty() || nb.is_empty() {
            return false;
        }
        if na == nb {
            return true;
        }
        match ea.entity_type {
            EntityType::Organization => is_acronym(&ea.name, &nb) || is_acronym(&eb.name, &na),
            EntityType::Person => is_last_name_of(&na, &nb) || is_last_name_of(&nb, &na),
            _ => false,
        }
    }
}

/// `short` is a single token equal to the last token of the multi-token `full`.
fn is_last_name_of(short: &str, full: &str) -> bool {
    let mut short_tokens = short.split_whitespace();
    let (Some(only), None) = (short_tokens.next(), short_tokens.next()) else {
        return false;
    };
    let full_tokens: Vec<&str> = full.split_whitespace().collect();
    full_tokens.len() > 1 && full_tokens.last() == Some(&only)
}

/// `candidate` (raw) is an acronym of the already-normalized `full`.
fn is_acronym(candidate: &str, full: &str) -> bool {
    let letters: String = candidate.chars().filter(|c| c.is_alphanumeric()).collect();
    if letters.len() < 2 || !letters.chars().all(|c| c.is_uppercase() || c.is_ascii_digit()) {
        return false;
    }
    let initials: String = full
        .split_whitespace()
        .filter(|t| !STOPWORDS.contains(t))
        .filter_map(|t| t.chars().next())
        .collect();
    initials.len() > 1 && initials == letters.to_lowercase()
}

const STOPWORDS: &[&str] = &["of", "the", "and", "for", "de", "la"];

// ---------------------------------------------------------------------------
// Near-duplicate names
// ---------------------------------------------------------------------------

/// Decides whether two names are too similar to be worth recording as
/// alternate names of one another.
pub trait NearDuplicate: Send + Sync {
    fn near_duplicate(&self, a: &str, b: &str) -> bool;
}

/// Token-set Jaccard similarity over normalized names.
#[derive(Debug, Clone, Copy)]
pub struct TokenOverlap {
    pub threshold: f64,
}

impl Default for TokenOverlap {
    fn default() -> Self {
        Self { threshold: 0.75 }
    }
}

impl NearDuplicate for TokenOverlap {
    fn near_duplicate(&self, a: &str, b: &str) -> bool {
        let na = normalize_name(a);
        let nb = normalize_name(b);
        if na == nb {
            return true;
        }
        token_jaccard(&na, &nb) >= self.threshold
    }
}

/// Jaccard similarity of the whitespace token sets of two strings.
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let ta: HashSet<&str> = a.split_whitespace().collect();
    let tb: HashSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let inter = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    inter / union
}

/// NFKC-normalize, lowercase, drop punctuation and collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .nfkc()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Relation scoring
// ---------------------------------------------------------------------------

/// Evidence for one (entity mention, value mention) pair in a sentence.
#[derive(Debug, Clone)]
pub struct PairEvidence {
    pub entity: Entity,
    pub value: String,
    pub value_type: Option<EntityType>,
    pub provenance: Option<Provenance>,
    /// Sentence tokens, for scorers that look at surface context.
    pub tokens: Vec<String>,
}

/// Statistical relation classifier: a weighted distribution over relation
/// names for a candidate pair.
pub trait RelationScorer: Send + Sync {
    fn score(&self, evidence: &PairEvidence) -> Vec<(String, f64)>;
}

/// Scorer backed by a fixed list of trigger words per relation, mostly for
/// tests and demos. A relation scores `weight` when any of its triggers
/// occurs in the sentence.
#[derive(Debug, Clone, Default)]
pub struct KeywordScorer {
    triggers: Vec<(String, Vec<String>, f64)>,
}

impl KeywordScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trigger(mut self, relation: &str, words: &[&str], weight: f64) -> Self {
        self.triggers.push((
            relation.to_string(),
            words.iter().map(|w| w.to_lowercase()).collect(),
            weight,
        ));
        self
    }
}

impl RelationScorer for KeywordScorer {
    fn score(&self, evidence: &PairEvidence) -> Vec<(String, f64)> {
        let lowered: HashSet<String> = evidence.tokens.iter().map(|t| t.to_lowercase()).collect();
        self.triggers
            .iter()
            .filter(|(_, words, _)| words.iter().any(|w| lowered.contains(w)))
            .map(|(rel, _, w)| (rel.clone(), *w))
            .collect()
    }
}
