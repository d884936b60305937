//! Aggregate objectives scored over an activation vector.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::fact::{Fact, sanitize_score};

/// Scores an accepted subset, given as an activation mask over `facts`.
pub trait Objective: Send + Sync {
    fn name(&self) -> &str;

    /// A trivial objective makes randomized refinement pointless; the
    /// resolver keeps the greedy result.
    fn is_trivial(&self) -> bool {
        false
    }

    fn evaluate(&self, active: &[bool], facts: &[Fact]) -> f64;
}

/// The score the resolver ranks and aggregates by: absent, NaN and infinite
/// scores count as `0.0`, the rest are clamped into `[0, 1]`.
pub fn resolver_score(fact: &Fact) -> f64 {
    fact.score.map_or(0.0, |s| sanitize_score(s, 0.0))
}

fn active_scores<'a>(active: &'a [bool], facts: &'a [Fact]) -> impl Iterator<Item = f64> + 'a {
    active
        .iter()
        .zip(facts)
        .filter(|(on, _)| **on)
        .map(|(_, f)| resolver_score(f))
}

/// Keep the greedy top-down activation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Top;

impl Objective for Top {
    fn name(&self) -> &str {
        "top"
    }

    fn is_trivial(&self) -> bool {
        true
    }

    fn evaluate(&self, active: &[bool], facts: &[Fact]) -> f64 {
        Sum.evaluate(active, facts)
    }
}

/// Sum of active scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl Objective for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn evaluate(&self, active: &[bool], facts: &[Fact]) -> f64 {
        active_scores(active, facts).sum()
    }
}

/// Mean of active scores; `0.0` for an empty activation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mean;

impl Objective for Mean {
    fn name(&self) -> &str {
        "mean"
    }

    fn evaluate(&self, active: &[bool], facts: &[Fact]) -> f64 {
        let (total, count) = active_scores(active, facts)
            .fold((0.0, 0usize), |(t, n), s| (t + s, n + 1));
        if count == 0 { 0.0 } else { total / count as f64 }
    }
}

/// Configurable choice of objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveKind {
    Top,
    #[default]
    Sum,
    Mean,
}

impl ObjectiveKind {
    pub fn build(self) -> Arc<dyn Objective> {
        match self {
            Self::Top => Arc::new(Top),
            Self::Sum => Arc::new(Sum),
            Self::Mean => Arc::new(Mean),
        }
    }
}

impl fmt::Display for ObjectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => write!(f, "top"),
            Self::Sum => write!(f, "sum"),
            Self::Mean => write!(f, "mean"),
        }
    }
}

impl FromStr for ObjectiveKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "top" => Ok(Self::Top),
            "sum" => Ok(Self::Sum),
            "mean" => Ok(Self::Mean),
            other => Err(format!("unknown objective \"{other}\" (expected top, sum or mean)")),
        }
    }
}
