//! Candidate facts from a relation scorer.

use crate::fact::{Fact, sanitize_score};
use crate::oracle::{PairEvidence, RelationScorer};

/// Turns scored pair evidence into candidate facts.
///
/// Relations outside the `keep` predicate (normally the rule engine's
/// useful-predicate set) and non-positive scores are dropped.
pub struct CandidateGenerator<'a> {
    scorer: &'a dyn RelationScorer,
    keep: Box<dyn Fn(&str) -> bool + 'a>,
}

impl<'a> CandidateGenerator<'a> {
    pub fn new(scorer: &'a dyn RelationScorer) -> Self {
        Self {
            scorer,
            keep: Box::new(|_| true),
        }
    }

    /// Only keep relations for which `keep` returns true.
    pub fn keeping(mut self, keep: impl Fn(&str) -> bool + 'a) -> Self {
        self.keep = Box::new(keep);
        self
    }

    /// Candidate facts for one pair, in the scorer's order.
    pub fn candidates_for(&self, evidence: &PairEvidence) -> Vec<Fact> {
        self.scorer
            .score(evidence)
            .into_iter()
            .filter(|(relation, _)| (self.keep)(relation))
            .filter_map(|(relation, raw)| {
                let score = sanitize_score(raw, 0.0);
                if score <= 0.0 {
                    return None;
                }
                let mut fact = Fact::new(evidence.entity.clone(), relation, evidence.value.clone())
                    .with_score(score);
                if let Some(ty) = evidence.value_type {
                    fact = fact.with_value_type(ty);
                }
                if let Some(provenance) = &evidence.provenance {
                    fact = fact.with_provenance(provenance.clone());
                }
                Some(fact)
            })
            .collect()
    }

    /// Candidates for every pair.
    pub fn generate<'e>(&self, evidence: impl IntoIterator<Item = &'e PairEvidence>) -> Vec<Fact> {
        let facts: Vec<Fact> = evidence
            .into_iter()
            .flat_map(|e| self.candidates_for(e))
            .collect();
        tracing::debug!(candidates = facts.len(), "generated candidate facts");
        facts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityType};
    use crate::fact::Provenance;
    use crate::infer::{RuleEngine, RuleSet};
    use crate::oracle::KeywordScorer;
    use crate::relation::RelationTable;

    fn evidence(sentence: &str) -> PairEvidence {
        PairEvidence {
            entity: Entity::anonymous("Jane Doe", EntityType::Person),
            value: "John Doe".into(),
            value_type: Some(EntityType::Person),
            provenance: Some(Provenance::new("doc-1").with_sentence(3)),
            tokens: sentence.split_whitespace().map(String::from).collect(),
        }
    }

    #[test]
    fn scored_relations_become_facts() {
        let scorer = KeywordScorer::new()
            .with_trigger("per:spouse", &["married"], 0.8)
            .with_trigger("per:siblings", &["brother"], 0.6);
        let generator = CandidateGenerator::new(&scorer);
        let facts = generator.candidates_for(&evidence("Jane Doe married John Doe"));
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].relation, "per:spouse");
        assert_eq!(facts[0].value_type, Some(EntityType::Person));
        assert_eq!(facts[0].provenance.as_ref().unwrap().sentence_index, Some(3));
    }

    #[test]
    fn useless_relations_and_zero_scores_are_dropped() {
        let scorer = KeywordScorer::new()
            .with_trigger("per:spouse", &["married"], 0.8)
            .with_trigger("per:favourite_colour", &["married"], 0.9)
            .with_trigger("per:siblings", &["married"], 0.0);
        let engine = RuleEngine::new(RuleSet::default(), &RelationTable::kbp());
        let generator = CandidateGenerator::new(&scorer).keeping(|r| engine.is_useful(r));
        let all = generator.generate([&evidence("Jane married John"), &evidence("they married")]);
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|f| f.relation == "per:spouse"));
    }
}
