// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # slotfill
//!
//! Graph consistency and inference engine for slot-filling knowledge base
//! population. Candidate facts about a query entity are assembled into an
//! entity graph, rewritten (entity merge, transitive closure, symmetric
//! completion), extended by weighted Horn rules, and finally pruned to a
//! mutually consistent subset.
//!
//! ## Architecture
//!
//! - **Entity graph** (`graph`): petgraph-backed multigraph, one edge per fact,
//!   duplicate facts combined by a [`graph::MergeStrategy`]
//! - **Rewrites** (`rewrite`): composable whole-graph passes
//! - **Inference** (`infer`): rule parsing and backtracking rule matching
//! - **Resolution** (`resolve`): singleton, pairwise and leave-one-out
//!   filters, seeded hill-climbing, entailment expansion
//! - **Pipeline** (`pipeline`): per-query orchestration and rayon batches
//!
//! ## Library usage
//!
//! ```no_run
//! use slotfill::checklist::NoopChecklist;
//! use slotfill::config::ReasonerConfig;
//! use slotfill::entity::{Entity, EntityType};
//! use slotfill::fact::Fact;
//! use slotfill::pipeline::Reasoner;
//!
//! let reasoner = Reasoner::new(ReasonerConfig::default()).unwrap();
//! let query = Entity::official("Jane Doe", EntityType::Person, None, Some("SF_001".into()));
//! let candidates = vec![
//!     Fact::new(query.clone(), "per:title", "senator")
//!         .with_value_type(EntityType::Title)
//!         .with_score(0.8),
//! ];
//! let out = reasoner.run(&query, candidates, &NoopChecklist);
//! for fact in out.accepted() {
//!     println!("{fact}");
//! }
//! ```

pub mod candidates;
pub mod checklist;
pub mod config;
pub mod entity;
pub mod error;
pub mod fact;
pub mod graph;
pub mod infer;
pub mod oracle;
pub mod pipeline;
pub mod relation;
pub mod resolve;
pub mod rewrite;
