//! Bookkeeping sink for accept/discard/rewrite decisions.
//!
//! The engine reports what happens to every candidate fact so an outer layer
//! can explain its output. The engine never reads the checklist back.

use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::fact::{Fact, FactKey};

/// Why a fact was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscardReason {
    /// Rejected by the singleton validity strategy.
    Singleton,
    /// Left inactive by the consistency search (pairwise or leave-one-out).
    Inconsistent,
    /// Fact could not be placed in the graph.
    Malformed,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton => write!(f, "singleton"),
            Self::Inconsistent => write!(f, "inconsistent"),
            Self::Malformed => write!(f, "malformed"),
        }
    }
}

/// A single recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ChecklistEvent {
    Registered,
    Rewritten { into: FactKey },
    Discarded { reason: DiscardReason },
    Accepted,
}

/// Observability sink for per-fact decisions.
pub trait Checklist: Send + Sync {
    /// A fact entered the system (from upstream or from inference).
    fn register(&self, fact: &Fact);
    /// A strategy rewrote `from` into `to`.
    fn rewrite(&self, from: &Fact, to: &Fact);
    /// A fact was discarded.
    fn discard(&self, fact: &Fact, reason: DiscardReason);
    /// A fact made it into the final accepted set.
    fn accept(&self, fact: &Fact);
}

/// Checklist that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopChecklist;

impl Checklist for NoopChecklist {
    fn register(&self, _fact: &Fact) {}
    fn rewrite(&self, _from: &Fact, _to: &Fact) {}
    fn discard(&self, _fact: &Fact, _reason: DiscardReason) {}
    fn accept(&self, _fact: &Fact) {}
}

/// Checklist that emits `tracing` debug events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingChecklist;

impl Checklist for TracingChecklist {
    fn register(&self, fact: &Fact) {
        tracing::debug!(%fact, "checklist: registered");
    }

    fn rewrite(&self, from: &Fact, to: &Fact) {
        tracing::debug!(%from, %to, "checklist: rewritten");
    }

    fn discard(&self, fact: &Fact, reason: DiscardReason) {
        tracing::debug!(%fact, %reason, "checklist: discarded");
    }

    fn accept(&self, fact: &Fact) {
        tracing::debug!(%fact, "checklist: accepted");
    }
}

/// In-memory checklist, safe to share across parallel entity runs.
#[derive(Debug, Default)]
pub struct MemoryChecklist {
    events: DashMap<FactKey, Vec<ChecklistEvent>>,
}

impl MemoryChecklist {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, key: FactKey, event: ChecklistEvent) {
        self.events.entry(key).or_default().push(event);
    }

    /// Events recorded for a fact, in order.
    pub fn events_for(&self, key: &FactKey) -> Vec<ChecklistEvent> {
        self.events
            .get(key)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    /// The most recent event for a fact.
    pub fn last_event(&self, key: &FactKey) -> Option<ChecklistEvent> {
        self.events.get(key).and_then(|e| e.value().last().cloned())
    }

    /// Keys of all facts whose latest event is a discard for `reason`.
    pub fn discarded(&self, reason: DiscardReason) -> Vec<FactKey> {
        let mut keys: Vec<FactKey> = self
            .events
            .iter()
            .filter(|e| {
                matches!(
                    e.value().last(),
                    Some(ChecklistEvent::Discarded { reason: r }) if *r == reason
                )
            })
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Keys of all facts whose latest event is an accept.
    pub fn accepted(&self) -> Vec<FactKey> {
        let mut keys: Vec<FactKey> = self
            .events
            .iter()
            .filter(|e| matches!(e.value().last(), Some(ChecklistEvent::Accepted)))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Checklist for MemoryChecklist {
    fn register(&self, fact: &Fact) {
        self.push(fact.key(), ChecklistEvent::Registered);
    }

    fn rewrite(&self, from: &Fact, to: &Fact) {
        self.push(from.key(), ChecklistEvent::Rewritten { into: to.key() });
        if from.key() != to.key() {
            self.push(to.key(), ChecklistEvent::Registered);
        }
    }

    fn discard(&self, fact: &Fact, reason: DiscardReason) {
        self.push(fact.key(), ChecklistEvent::Discarded { reason });
    }

    fn accept(&self, fact: &Fact) {
        self.push(fact.key(), ChecklistEvent::Accepted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityType};

    fn fact(value: &str) -> Fact {
        Fact::new(
            Entity::anonymous("Jane Doe", EntityType::Person),
            "per:title",
            value,
        )
    }

    #[test]
    fn memory_checklist_tracks_latest_event() {
        let cl = MemoryChecklist::new();
        let f = fact("CEO");
        cl.register(&f);
        cl.discard(&f, DiscardReason::Inconsistent);

        assert_eq!(cl.events_for(&f.key()).len(), 2);
        assert_eq!(
            cl.last_event(&f.key()),
            Some(ChecklistEvent::Discarded {
                reason: DiscardReason::Inconsistent
            })
        );
        assert_eq!(cl.discarded(DiscardReason::Inconsistent), vec![f.key()]);
        assert!(cl.accepted().is_empty());
    }

    #[test]
    fn rewrite_registers_target() {
        let cl = MemoryChecklist::new();
        let from = fact("  CEO ");
        let to = fact("CEO");
        cl.rewrite(&from, &to);
        cl.accept(&to);
        assert_eq!(cl.accepted(), vec![to.key()]);
        assert!(matches!(
            cl.last_event(&from.key()),
            Some(ChecklistEvent::Rewritten { .. })
        ));
    }

    #[test]
    fn noop_checklist_is_silent() {
        let cl = NoopChecklist;
        cl.register(&fact("CEO"));
        cl.accept(&fact("CEO"));
    }
}
