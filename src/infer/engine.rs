//! Backtracking rule matcher.
//!
//! `match_rule` binds `x_0` to the head entity and satisfies antecedents one
//! at a time, preferring predicates whose first variable is bound to the
//! current pivot. A binary predicate with an unbound second variable tries
//! every matching outgoing edge, binding the destination and recursing with
//! it as the new pivot; failed branches are rolled back via the binding
//! trail before the next edge is tried.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::entity::{Entity, EntityType};
use crate::error::{GraphError, InferError};
use crate::fact::Fact;
use crate::graph::EntityGraph;
use crate::relation::RelationTable;
use crate::resolve::SingletonStrategy;

use super::bindings::Bindings;
use super::rules::{HEAD_VARIABLE, Predicate, Rule, RuleSet};

/// Result type for inference operations.
pub type InferResult<T> = std::result::Result<T, InferError>;

/// A successful rule match.
#[derive(Debug, Clone)]
pub struct Inference {
    /// The consequent, ready to insert.
    pub fact: Fact,
    /// Variable bindings in the order they were made.
    pub bindings: Vec<(String, Entity)>,
    /// The antecedent edges the match used, in match order.
    pub support: Vec<Fact>,
}

/// What one `apply` call did.
#[derive(Debug, Clone, Default)]
pub struct InferenceReport {
    pub inferred: Vec<Fact>,
    /// Rules that raised an error and were treated as non-matching.
    pub failed_rules: usize,
}

/// Weighted Horn-rule engine over an [`EntityGraph`].
pub struct RuleEngine {
    rules: Vec<Rule>,
    useful: BTreeSet<String>,
    consequent_filter: Option<Arc<dyn SingletonStrategy>>,
}

impl RuleEngine {
    /// Rules with non-positive weight are dropped; the rest are applied in
    /// descending weight order.
    pub fn new(rules: RuleSet, relations: &RelationTable) -> Self {
        let mut useful: BTreeSet<String> = relations.names().map(str::to_string).collect();
        useful.extend(rules.predicate_names());

        let mut rules: Vec<Rule> = rules
            .into_rules()
            .into_iter()
            .filter(|r| {
                let keep = r.weight > 0.0;
                if !keep {
                    tracing::warn!(rule = %r, "ignoring rule with non-positive weight");
                }
                keep
            })
            .collect();
        rules.sort_by(|a, b| b.weight.total_cmp(&a.weight));

        Self {
            rules,
            useful,
            consequent_filter: None,
        }
    }

    /// Reject consequents that this strategy refuses.
    pub fn with_consequent_filter(mut self, filter: Arc<dyn SingletonStrategy>) -> Self {
        self.consequent_filter = Some(filter);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Relation names worth keeping as candidates: every inventory relation
    /// plus every predicate a rule mentions.
    pub fn useful_predicates(&self) -> &BTreeSet<String> {
        &self.useful
    }

    pub fn is_useful(&self, relation: &str) -> bool {
        self.useful.contains(relation)
    }

    /// Match `rule` rooted at `head`, which must be a vertex of `graph`.
    pub fn match_rule(
        &self,
        graph: &EntityGraph,
        rule: &Rule,
        head: &Entity,
    ) -> InferResult<Option<Inference>> {
        self.match_rule_as(graph, rule, head, None)
    }

    /// Match with `head` treated as having type `head_type` for unary
    /// predicates.
    pub fn match_rule_as(
        &self,
        graph: &EntityGraph,
        rule: &Rule,
        head: &Entity,
        head_type: Option<EntityType>,
    ) -> InferResult<Option<Inference>> {
        let head = graph
            .vertex(head)
            .cloned()
            .ok_or_else(|| GraphError::VertexNotFound {
                name: head.to_string(),
            })?;
        let mut state = MatchState {
            graph,
            rule,
            head: &head,
            head_type: head_type.unwrap_or(head.entity_type),
            bindings: Bindings::new(),
            support: Vec::new(),
        };
        state.bindings.bind(HEAD_VARIABLE, &head);
        let remaining: Vec<&Predicate> = rule.antecedents.iter().collect();
        let Some(fact) = self.satisfy(&mut state, &remaining, &head)? else {
            return Ok(None);
        };
        Ok(Some(Inference {
            fact,
            bindings: state.bindings.in_order(),
            support: state.support,
        }))
    }

    fn satisfy(
        &self,
        state: &mut MatchState<'_>,
        remaining: &[&Predicate],
        pivot: &Entity,
    ) -> InferResult<Option<Fact>> {
        if remaining.is_empty() {
            return self.conclude(state);
        }

        let position = remaining
            .iter()
            .position(|p| state.bindings.get(&p.first) == Some(pivot));
        let Some(position) = position else {
            // Nothing hangs off the current pivot: continue from the first
            // predicate whose subject is bound.
            let next = remaining
                .iter()
                .find_map(|p| state.bindings.get(&p.first).cloned());
            return match next {
                Some(next) => self.satisfy(state, remaining, &next),
                None => Err(InferError::UnboundVariable {
                    var: remaining[0].first.clone(),
                }),
            };
        };

        let predicate = remaining[position];
        let rest: Vec<&Predicate> = remaining
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != position)
            .map(|(_, p)| *p)
            .collect();

        let Some(second) = predicate.second.as_deref() else {
            if type_matches(&predicate.relation, state.type_of(pivot)) {
                return self.satisfy(state, &rest, pivot);
            }
            return Ok(None);
        };

        let edges: Vec<Fact> = state
            .graph
            .facts_of(pivot)
            .into_iter()
            .filter(|f| f.relation == predicate.relation)
            .collect();

        for edge in edges {
            let Some(destination) = state.resolve_destination(&edge) else {
                continue;
            };

            if let Some(bound) = state.bindings.get(second) {
                if bound.name != destination.name {
                    continue;
                }
                state.support.push(edge);
                if let Some(fact) = self.satisfy(state, &rest, pivot)? {
                    return Ok(Some(fact));
                }
                state.support.pop();
                continue;
            }

            let mark = state.bindings.mark();
            if !state.bindings.bind(second, &destination) {
                continue;
            }
            state.support.push(edge);
            if let Some(fact) = self.satisfy(state, &rest, &destination)? {
                return Ok(Some(fact));
            }
            state.support.pop();
            state.bindings.undo_to(mark);
        }
        Ok(None)
    }

    /// Build the consequent from the final bindings and run the filter.
    fn conclude(&self, state: &MatchState<'_>) -> InferResult<Option<Fact>> {
        let consequent = &state.rule.consequent;
        let lookup = |var: &str| {
            state
                .bindings
                .get(var)
                .cloned()
                .ok_or_else(|| InferError::UnboundVariable { var: var.to_string() })
        };
        let subject = lookup(&consequent.first)?;
        let second = consequent
            .second
            .as_deref()
            .ok_or_else(|| InferError::UnboundVariable {
                var: consequent.first.clone(),
            })?;
        let value = lookup(second)?;

        let score: f64 = state.support.iter().map(Fact::bounded_score).product();
        let mut fact =
            Fact::between(subject, consequent.relation.clone(), &value).with_score(score);
        if let Some(provenance) = state.support.iter().find_map(|f| f.provenance.clone()) {
            fact = fact.with_provenance(provenance);
        }

        match &self.consequent_filter {
            Some(filter) => Ok(filter.is_valid(&fact.entity, &fact)),
            None => Ok(Some(fact)),
        }
    }

    /// Try every rule once at `entity`, inserting each inferred fact.
    pub fn apply(&self, graph: &mut EntityGraph, entity: &Entity) -> InferenceReport {
        let mut report = InferenceReport::default();
        for rule in &self.rules {
            let inference = match self.match_rule(graph, rule, entity) {
                Ok(Some(inference)) => inference,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(%rule, error = %e, "rule failed, treating as no match");
                    report.failed_rules += 1;
                    continue;
                }
            };
            tracing::info!(%rule, fact = %inference.fact, "inferred fact");
            match graph.add_fact(inference.fact.clone()) {
                Ok(_) => report.inferred.push(inference.fact),
                Err(e) => {
                    tracing::warn!(%rule, error = %e, "inferred fact could not be added");
                    report.failed_rules += 1;
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("rules", &self.rules.len())
            .field("useful", &self.useful.len())
            .field("consequent_filter", &self.consequent_filter.is_some())
            .finish()
    }
}

struct MatchState<'a> {
    graph: &'a EntityGraph,
    rule: &'a Rule,
    head: &'a Entity,
    head_type: EntityType,
    bindings: Bindings,
    support: Vec<Fact>,
}

impl MatchState<'_> {
    fn type_of(&self, entity: &Entity) -> EntityType {
        if entity == self.head {
            self.head_type
        } else {
            entity.entity_type
        }
    }

    /// The graph vertex an edge points at, preferring the stored vertex.
    fn resolve_destination(&self, edge: &Fact) -> Option<Entity> {
        let target = edge.value_entity()?;
        self.graph
            .vertex(&target)
            .or_else(|| self.graph.find_by_name(&edge.value))
            .cloned()
            .or(Some(target))
    }
}

fn type_matches(name: &str, ty: EntityType) -> bool {
    name.parse::<EntityType>().is_ok_and(|parsed| parsed == ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::Provenance;

    fn org(name: &str) -> Entity {
        Entity::anonymous(name, EntityType::Organization)
    }

    fn per(name: &str) -> Entity {
        Entity::anonymous(name, EntityType::Person)
    }

    fn rule(text: &str) -> Rule {
        Rule::parse_line(text, 1).unwrap().unwrap()
    }

    fn engine(text: &str) -> RuleEngine {
        RuleEngine::new(RuleSet::parse(text), &RelationTable::kbp())
    }

    const ALT_TO_HQ: &str =
        "1.0 ORGANIZATION(x_0) org:alt_names(x_0,x_1) => org:city_of_hq(x_0,x_1)";

    #[test]
    fn unary_and_binary_match() {
        let (e, f) = (org("Acme"), org("Acme Inc"));
        let mut g = EntityGraph::new();
        g.add_fact(Fact::between(e.clone(), "org:alt_names", &f)).unwrap();

        let eng = engine(ALT_TO_HQ);
        let inf = eng.match_rule(&g, &rule(ALT_TO_HQ), &e).unwrap().unwrap();
        assert_eq!(inf.fact.value, "Acme Inc");
        assert_eq!(inf.fact.relation, "org:city_of_hq");
        assert_eq!(inf.fact.score, Some(1.0));
        assert_eq!(inf.support.len(), 1);
    }

    #[test]
    fn unknown_head_is_an_error() {
        let mut g = EntityGraph::new();
        g.add_vertex(org("Acme"));
        let eng = engine(ALT_TO_HQ);
        let err = eng.match_rule(&g, &rule(ALT_TO_HQ), &org("Globex")).unwrap_err();
        assert!(matches!(
            err,
            InferError::Graph(GraphError::VertexNotFound { ref name }) if name.contains("Globex")
        ));

        let report = eng.apply(&mut g, &org("Globex"));
        assert!(report.inferred.is_empty());
        assert_eq!(report.failed_rules, 1);
    }

    #[test]
    fn type_mismatch_fails() {
        let (e, f) = (per("Acme"), org("Acme Inc"));
        let mut g = EntityGraph::new();
        g.add_fact(Fact::between(e.clone(), "org:alt_names", &f)).unwrap();
        let eng = engine(ALT_TO_HQ);
        assert!(eng.match_rule(&g, &rule(ALT_TO_HQ), &e).unwrap().is_none());
        // Overriding the head type makes it match.
        let inf = eng
            .match_rule_as(&g, &rule(ALT_TO_HQ), &e, Some(EntityType::Organization))
            .unwrap();
        assert!(inf.is_some());
    }

    #[test]
    fn backtracks_across_bindings() {
        let text = "1.0 per:parents(x_0,x_1) per:employee_or_member_of(x_1,x_2) \
                    => per:other_family(x_0,x_1)";
        let (kid, mom, dad, acme) = (per("Kid"), per("Mom"), per("Dad"), org("Acme"));
        let mut g = EntityGraph::new();
        // "Dad" sorts first, so it is tried first and must be abandoned.
        g.add_fact(Fact::between(kid.clone(), "per:parents", &dad).with_score(0.9))
            .unwrap();
        g.add_fact(Fact::between(kid.clone(), "per:parents", &mom).with_score(0.8))
            .unwrap();
        g.add_fact(Fact::between(mom.clone(), "per:employee_or_member_of", &acme).with_score(0.5))
            .unwrap();

        let eng = engine(text);
        let inf = eng.match_rule(&g, &rule(text), &kid).unwrap().unwrap();
        assert_eq!(inf.fact.value, "Mom");
        assert!((inf.fact.score.unwrap() - 0.4).abs() < 1e-9);
        let vars: Vec<&str> = inf.bindings.iter().map(|(v, _)| v.as_str()).collect();
        assert_eq!(vars, vec!["x_0", "x_1", "x_2"]);
        assert_eq!(inf.bindings[1].1, mom);
    }

    #[test]
    fn bound_second_variable_must_agree() {
        let text = "1.0 per:spouse(x_0,x_1) per:siblings(x_0,x_2) per:spouse(x_2,x_1) \
                    => per:other_family(x_0,x_1)";
        let (a, b, c) = (per("A"), per("B"), per("C"));
        let mut g = EntityGraph::new();
        g.add_fact(Fact::between(a.clone(), "per:spouse", &b)).unwrap();
        g.add_fact(Fact::between(a.clone(), "per:siblings", &c)).unwrap();
        g.add_fact(Fact::between(c.clone(), "per:spouse", &a)).unwrap();
        let eng = engine(text);
        // x_1 = B but C's spouse is A.
        assert!(eng.match_rule(&g, &rule(text), &a).unwrap().is_none());
    }

    #[test]
    fn provenance_from_first_supporting_edge() {
        let text = "1.0 per:parents(x_0,x_1) per:parents(x_1,x_2) => per:other_family(x_0,x_2)";
        let (a, b, c) = (per("A"), per("B"), per("C"));
        let mut g = EntityGraph::new();
        g.add_fact(Fact::between(a.clone(), "per:parents", &b).with_score(f64::NAN))
            .unwrap();
        g.add_fact(
            Fact::between(b, "per:parents", &c)
                .with_score(0.5)
                .with_provenance(Provenance::new("doc-2")),
        )
        .unwrap();
        let eng = engine(text);
        let inf = eng.match_rule(&g, &rule(text), &a).unwrap().unwrap();
        assert_eq!(inf.fact.value, "C");
        assert_eq!(inf.fact.score, Some(0.5));
        assert_eq!(inf.fact.provenance.unwrap().doc_id, "doc-2");
    }

    #[test]
    fn consequent_filter_forces_backtracking() {
        struct NotDad;
        impl SingletonStrategy for NotDad {
            fn is_valid(&self, _pivot: &Entity, candidate: &Fact) -> Option<Fact> {
                (candidate.value != "Dad").then(|| candidate.clone())
            }
        }
        let text = "1.0 per:parents(x_0,x_1) => per:other_family(x_0,x_1)";
        let (kid, mom, dad) = (per("Kid"), per("Mom"), per("Dad"));
        let mut g = EntityGraph::new();
        g.add_fact(Fact::between(kid.clone(), "per:parents", &dad)).unwrap();
        g.add_fact(Fact::between(kid.clone(), "per:parents", &mom)).unwrap();
        let eng = engine(text).with_consequent_filter(Arc::new(NotDad));
        let inf = eng.match_rule(&g, &rule(text), &kid).unwrap().unwrap();
        assert_eq!(inf.fact.value, "Mom");
    }

    #[test]
    fn apply_adds_inferred_facts() {
        let text = "0.5 per:parents(x_0,x_1) => per:other_family(x_0,x_1)\n\
                    0.9 ORGANIZATION(x_0) org:subsidiaries(x_0,x_1) => org:members(x_0,x_1)\n\
                    -1 per:parents(x_0,x_1) => per:siblings(x_0,x_1)";
        let (kid, mom) = (per("Kid"), per("Mom"));
        let mut g = EntityGraph::new();
        g.add_fact(Fact::between(kid.clone(), "per:parents", &mom).with_score(0.7))
            .unwrap();

        let eng = engine(text);
        assert_eq!(eng.rules().len(), 2);
        assert_eq!(eng.rules()[0].weight, 0.9);

        let report = eng.apply(&mut g, &kid);
        assert_eq!(report.inferred.len(), 1);
        assert_eq!(report.failed_rules, 0);
        let family: Vec<&Fact> = g.relations_named(&kid, "per:other_family").collect();
        assert_eq!(family.len(), 1);
        assert_eq!(family[0].score, Some(0.7));
        assert!(g.is_valid());
    }

    #[test]
    fn useful_predicates_include_rule_names() {
        let eng = engine(ALT_TO_HQ);
        assert!(eng.is_useful("per:title"));
        assert!(eng.is_useful("org:alt_names"));
        assert!(eng.is_useful("ORGANIZATION"));
        assert!(!eng.is_useful("per:favourite_colour"));
    }
}
