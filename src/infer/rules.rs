//! Rule syntax: predicates, rules and the line-oriented rule file format.
//!
//! ```text
//! # comment
//! 0.8 per:parents(x_0,x_1) per:spouse(x_1,x_2) => per:parents(x_0,x_2)
//! ORGANIZATION(x_0) org:alternate_names(x_0,x_1) => org:alternate_names(x_1,x_0)
//! ```
//!
//! The leading weight is optional and defaults to `1.0`. A unary predicate
//! `TYPE(x_i)` asserts an entity type; a binary predicate `rel(x_i,x_j)`
//! asserts an edge. `x_0` is bound to the head entity before matching.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::RuleError;

/// Name of the variable bound to the head entity.
pub const HEAD_VARIABLE: &str = "x_0";

static PREDICATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z_][A-Za-z0-9_:.\-]*)\(\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:,\s*([A-Za-z_][A-Za-z0-9_]*)\s*)?\)")
        .unwrap()
});

static WEIGHT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\[?\s*([-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)\s*\]?\s+").unwrap()
});

/// `relation(first)` or `relation(first, second)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Predicate {
    pub relation: String,
    pub first: String,
    pub second: Option<String>,
}

impl Predicate {
    pub fn unary(relation: impl Into<String>, var: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            first: var.into(),
            second: None,
        }
    }

    pub fn binary(
        relation: impl Into<String>,
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        Self {
            relation: relation.into(),
            first: first.into(),
            second: Some(second.into()),
        }
    }

    pub fn is_unary(&self) -> bool {
        self.second.is_none()
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.first.as_str()).chain(self.second.as_deref())
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.second {
            Some(second) => write!(f, "{}({},{})", self.relation, self.first, second),
            None => write!(f, "{}({})", self.relation, self.first),
        }
    }
}

/// A weighted Horn rule with a binary consequent.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub weight: f64,
    pub antecedents: Vec<Predicate>,
    pub consequent: Predicate,
}

impl Rule {
    /// Build a rule, checking that the consequent is binary and that both of
    /// its variables are bound by the head or an antecedent.
    pub fn new(
        weight: f64,
        antecedents: Vec<Predicate>,
        consequent: Predicate,
    ) -> Result<Self, RuleError> {
        if consequent.is_unary() {
            return Err(RuleError::Parse {
                line: 0,
                message: format!("consequent {consequent} must be a binary predicate"),
            });
        }
        let bound: HashSet<&str> = antecedents
            .iter()
            .flat_map(Predicate::variables)
            .chain(std::iter::once(HEAD_VARIABLE))
            .collect();
        if let Some(var) = consequent.variables().find(|v| !bound.contains(v)) {
            return Err(RuleError::UnboundConsequent { var: var.to_string() });
        }
        Ok(Self {
            weight,
            antecedents,
            consequent,
        })
    }

    /// Parse one line of rule text. Blank lines and comments yield `None`.
    pub fn parse_line(text: &str, line: usize) -> Result<Option<Self>, RuleError> {
        let text = text.split('#').next().unwrap_or_default().trim();
        if text.is_empty() {
            return Ok(None);
        }
        let parse_err = |message: String| RuleError::Parse { line, message };

        let mut halves = text.split("=>");
        let (Some(lhs), Some(rhs), None) = (halves.next(), halves.next(), halves.next()) else {
            return Err(parse_err("expected exactly one `=>`".into()));
        };

        let (weight, body) = match WEIGHT.captures(lhs) {
            Some(caps) => {
                let raw = &caps[1];
                let weight: f64 = raw
                    .parse()
                    .map_err(|_| parse_err(format!("invalid weight `{raw}`")))?;
                (weight, &lhs[caps.get(0).map_or(0, |m| m.end())..])
            }
            None => (1.0, lhs),
        };

        let antecedents = parse_predicates(body).map_err(parse_err)?;
        if antecedents.is_empty() {
            return Err(parse_err("rule has no antecedents".into()));
        }
        let mut consequents = parse_predicates(rhs).map_err(parse_err)?;
        if consequents.len() != 1 {
            return Err(parse_err(format!(
                "expected one consequent, found {}",
                consequents.len()
            )));
        }
        let consequent = consequents.remove(0);

        Rule::new(weight, antecedents, consequent)
            .map(Some)
            .map_err(|e| match e {
                RuleError::Parse { message, .. } => RuleError::Parse { line, message },
                other => other,
            })
    }

    /// Every predicate name the rule mentions.
    pub fn predicate_names(&self) -> impl Iterator<Item = &str> {
        self.antecedents
            .iter()
            .chain(std::iter::once(&self.consequent))
            .map(|p| p.relation.as_str())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.weight)?;
        for p in &self.antecedents {
            write!(f, " {p}")?;
        }
        write!(f, " => {}", self.consequent)
    }
}

/// Parse whitespace-separated predicates; anything else is an error.
fn parse_predicates(text: &str) -> Result<Vec<Predicate>, String> {
    let mut out = Vec::new();
    let mut cursor = 0;
    for caps in PREDICATE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let gap = &text[cursor..whole.start()];
        if !gap.trim().is_empty() {
            return Err(format!("unexpected `{}`", gap.trim()));
        }
        cursor = whole.end();
        out.push(Predicate {
            relation: caps[1].to_string(),
            first: caps[2].to_string(),
            second: caps.get(3).map(|m| m.as_str().to_string()),
        });
    }
    let tail = text[cursor..].trim();
    if !tail.is_empty() {
        return Err(format!("unexpected `{tail}`"));
    }
    Ok(out)
}

/// A loaded collection of rules.
///
/// Parsing is lenient: malformed lines are skipped with a warning and kept
/// in [`errors`](Self::errors).
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    errors: Vec<RuleError>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            errors: Vec::new(),
        }
    }

    pub fn parse(text: &str) -> Self {
        let mut set = Self::default();
        for (idx, line) in text.lines().enumerate() {
            match Rule::parse_line(line, idx + 1) {
                Ok(Some(rule)) => set.rules.push(rule),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed rule");
                    set.errors.push(e);
                }
            }
        }
        set
    }

    /// Parse and fail on the first malformed line.
    pub fn parse_strict(text: &str) -> Result<Self, RuleError> {
        let mut set = Self::parse(text);
        if set.errors.is_empty() {
            Ok(set)
        } else {
            Err(set.errors.remove(0))
        }
    }

    /// Read and leniently parse a rule file. An unreadable file is an error.
    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let text = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let set = Self::parse(&text);
        tracing::info!(
            path = %path.display(),
            rules = set.len(),
            skipped = set.errors.len(),
            "loaded rule file"
        );
        Ok(set)
    }

    /// The rules shipped with the crate.
    pub fn builtin() -> Self {
        Self::parse(include_str!("../../data/kbp.rules"))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn errors(&self) -> &[RuleError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Every predicate name mentioned by any rule.
    pub fn predicate_names(&self) -> BTreeSet<String> {
        self.rules
            .iter()
            .flat_map(Rule::predicate_names)
            .map(str::to_string)
            .collect()
    }

    pub fn into_rules(self) -> Vec<Rule> {
        self.rules
    }
}
