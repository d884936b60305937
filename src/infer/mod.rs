//! Rule inference: weighted Horn rules matched against an [`EntityGraph`]
//! by backtracking unification.
//!
//! [`EntityGraph`]: crate::graph::EntityGraph

pub mod bindings;
pub mod engine;
pub mod rules;

pub use bindings::Bindings;
pub use engine::{InferResult, Inference, InferenceReport, RuleEngine};
pub use rules::{HEAD_VARIABLE, Predicate, Rule, RuleSet};
