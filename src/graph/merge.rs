//! Score-merging strategies for facts that share `(source, destination, relation)`.

use serde::{Deserialize, Serialize};

use crate::fact::{Fact, sanitize_score};

/// How two scores for the same assertion are combined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// `max(a, b)`
    #[default]
    Max,
    /// `min(1, max(a, b) + bonus)`: corroboration nudges the score upwards.
    MaxPlus { bonus: f64 },
    /// `(a + b) / 2`
    Mean,
    /// `1 - (1 - a)(1 - b)` for independent evidence.
    NoisyOr,
}

impl MergeStrategy {
    /// Combine two optional scores. A missing score defers to the other one;
    /// NaN and infinities count as no evidence (`0.0`).
    pub fn combine(&self, a: Option<f64>, b: Option<f64>) -> Option<f64> {
        match (a, b) {
            (Some(a), Some(b)) => Some(self.combine_defined(a, b)),
            (Some(s), None) | (None, Some(s)) => Some(sanitize_score(s, 0.0)),
            (None, None) => None,
        }
    }

    fn combine_defined(&self, a: f64, b: f64) -> f64 {
        let a = sanitize_score(a, 0.0);
        let b = sanitize_score(b, 0.0);
        match self {
            Self::Max => a.max(b),
            Self::MaxPlus { bonus } => (a.max(b) + sanitize_score(*bonus, 0.0)).min(1.0),
            Self::Mean => (a + b) / 2.0,
            Self::NoisyOr => 1.0 - (1.0 - a) * (1.0 - b),
        }
    }

    /// Merge `incoming` into `existing`.
    ///
    /// The result keeps `existing`'s identity fields, combines the scores, and
    /// takes the provenance of the higher-scoring side, falling back to
    /// whichever provenance is defined.
    pub fn merge(&self, existing: &Fact, incoming: &Fact) -> Fact {
        let provenance = match (existing.score, incoming.score) {
            (Some(a), Some(b)) if sanitize_score(b, 0.0) > sanitize_score(a, 0.0) => incoming
                .provenance
                .clone()
                .or_else(|| existing.provenance.clone()),
            (Some(_), Some(_)) => existing
                .provenance
                .clone()
                .or_else(|| incoming.provenance.clone()),
            _ => existing
                .provenance
                .clone()
                .or_else(|| incoming.provenance.clone()),
        };

        let entity = if incoming.entity.is_official() && !existing.entity.is_official() {
            incoming.entity.clone()
        } else {
            existing.entity.clone()
        };

        Fact {
            entity,
            relation: existing.relation.clone(),
            value: existing.value.clone(),
            value_type: existing.value_type.or(incoming.value_type),
            provenance,
            score: self.combine(existing.score, incoming.score),
        }
    }
}
