//! Facts (slot fills): scored `(entity, relation, value)` assertions.
//!
//! Facts are immutable values. "Updating" a fact means building a new one with
//! one of the `with_*` methods.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityType};

/// Half-open token span `[start, end)` within a sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a fact came from: the supporting document, sentence and mention spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub doc_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_span: Option<Span>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_span: Option<Span>,
    /// Confidence of the extractor that produced this evidence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Provenance {
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            sentence_index: None,
            entity_span: None,
            value_span: None,
            score: None,
        }
    }

    pub fn with_sentence(mut self, sentence_index: usize) -> Self {
        self.sentence_index = Some(sentence_index);
        self
    }

    pub fn with_spans(mut self, entity_span: Span, value_span: Span) -> Self {
        self.entity_span = Some(entity_span);
        self.value_span = Some(value_span);
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// A scored `(entity, relation, value)` assertion with optional provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub entity: Entity,
    pub relation: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Fact {
    pub fn new(entity: Entity, relation: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            entity,
            relation: relation.into(),
            value: value.into(),
            value_type: None,
            provenance: None,
            score: None,
        }
    }

    /// Fact whose value is another entity; sets both the value string and type.
    pub fn between(entity: Entity, relation: impl Into<String>, value: &Entity) -> Self {
        Self::new(entity, relation, value.name.clone()).with_value_type(value.entity_type)
    }

    pub fn with_entity(&self, entity: Entity) -> Self {
        Self {
            entity,
            ..self.clone()
        }
    }

    pub fn with_relation(&self, relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            ..self.clone()
        }
    }

    pub fn with_value(&self, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..self.clone()
        }
    }

    pub fn with_value_type(self, value_type: EntityType) -> Self {
        Self {
            value_type: Some(value_type),
            ..self
        }
    }

    pub fn with_provenance(self, provenance: Provenance) -> Self {
        Self {
            provenance: Some(provenance),
            ..self
        }
    }

    pub fn with_score(self, score: f64) -> Self {
        Self {
            score: Some(score),
            ..self
        }
    }

    pub fn without_score(self) -> Self {
        Self {
            score: None,
            ..self
        }
    }

    /// Score, or `default` when absent.
    pub fn score_or(&self, default: f64) -> f64 {
        self.score.unwrap_or(default)
    }

    /// Score sanitized for arithmetic: absent, NaN and infinite scores count
    /// as `1.0`, everything else is clamped into `[0, 1]`.
    pub fn bounded_score(&self) -> f64 {
        sanitize_score(self.score.unwrap_or(1.0), 1.0)
    }

    /// The value interpreted as an entity, if the value type is known.
    pub fn value_entity(&self) -> Option<Entity> {
        self.value_type
            .map(|ty| Entity::anonymous(self.value.clone(), ty))
    }

    /// Key identifying the assertion independent of score and provenance.
    pub fn key(&self) -> FactKey {
        FactKey {
            entity: self.entity.name.clone(),
            relation: self.relation.clone(),
            value: self.value.clone(),
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} --{}--> \"{}\"", self.entity.name, self.relation, self.value)?;
        match self.score {
            Some(score) => write!(f, " @ {score:.4})"),
            None => write!(f, ")"),
        }
    }
}

/// `(entity, relation, value)` identity of a fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactKey {
    pub entity: String,
    pub relation: String,
    pub value: String,
}

impl fmt::Display for FactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.entity, self.relation, self.value)
    }
}

/// Clamp a score into `[0, 1]`, replacing NaN and infinities with `fallback`.
pub fn sanitize_score(score: f64, fallback: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        fallback
    }
}
