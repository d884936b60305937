//! Rich diagnostic error types for the slotfill engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so callers know exactly what
//! went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the slotfill engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum SlotfillError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Infer(#[from] InferError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error(
        "edge endpoint mismatch: fact ({entity} --{relation}--> {value}) attached as ({source_name} -> {destination})"
    )]
    #[diagnostic(
        code(slotfill::graph::endpoint_mismatch),
        help(
            "An edge must be attached from its owning entity to its value entity. \
             Use `EntityGraph::add_fact`, which derives both endpoints from the fact."
        )
    )]
    EndpointMismatch {
        entity: String,
        relation: String,
        value: String,
        source_name: String,
        destination: String,
    },

    #[error("fact ({entity} --{relation}--> \"{value}\") has no value type")]
    #[diagnostic(
        code(slotfill::graph::missing_value_entity),
        help(
            "Graph edges point at entities, so every fact needs a value type. \
             Annotate the value mention with an entity type before inserting it."
        )
    )]
    MissingValueEntity {
        entity: String,
        relation: String,
        value: String,
    },

    #[error("fact for {entity} has an empty relation name")]
    #[diagnostic(
        code(slotfill::graph::empty_relation),
        help("Every fact must name the relation it asserts.")
    )]
    EmptyRelation { entity: String },

    #[error("vertex not found: {name}")]
    #[diagnostic(
        code(slotfill::graph::vertex_not_found),
        help("Add the entity with `EntityGraph::add_vertex` before referring to it.")
    )]
    VertexNotFound { name: String },
}

// ---------------------------------------------------------------------------
// Rule errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RuleError {
    #[error("rule parse error on line {line}: {message}")]
    #[diagnostic(
        code(slotfill::rule::parse),
        help(
            "Rules have the form `[weight] pred(x_0) pred(x_0,x_1) ... => pred(x_0,x_1)`. \
             Variables are written `x_<n>` and `x_0` is bound to the head entity."
        )
    )]
    Parse { line: usize, message: String },

    #[error("consequent variable {var} is never bound by the antecedents")]
    #[diagnostic(
        code(slotfill::rule::unbound_consequent),
        help("Every variable in the consequent must appear in at least one antecedent.")
    )]
    UnboundConsequent { var: String },

    #[error("could not read rule file {path}: {source}")]
    #[diagnostic(
        code(slotfill::rule::io),
        help("Check that the rule file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Inference errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum InferError {
    #[error("variable {var} is unbound when building the consequent")]
    #[diagnostic(
        code(slotfill::infer::unbound_variable),
        help(
            "The rule matched but its consequent references a variable that no \
             antecedent bound. Fix the rule so that every consequent variable is bound."
        )
    )]
    UnboundVariable { var: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    #[diagnostic(
        code(slotfill::config::read),
        help("Check that the configuration file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config {path}: {message}")]
    #[diagnostic(
        code(slotfill::config::parse),
        help("The configuration must be valid TOML. See README.md for the layout.")
    )]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(slotfill::config::invalid), help("{message}"))]
    Invalid { message: String },
}

/// Convenience alias for functions returning slotfill results.
pub type SlotfillResult<T> = std::result::Result<T, SlotfillError>;
