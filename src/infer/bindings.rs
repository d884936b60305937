//! Variable bindings for unification, with a trail for cheap rollback.

use std::collections::HashMap;

use crate::entity::Entity;

/// Bijective partial map between rule variables and entities.
///
/// Every successful [`bind`](Self::bind) that creates a new binding is
/// recorded on a trail; [`undo_to`](Self::undo_to) truncates the trail back
/// to a [`mark`](Self::mark), removing exactly the bindings made since.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    by_var: HashMap<String, Entity>,
    by_entity: HashMap<Entity, String>,
    trail: Vec<String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `var` to `entity`.
    ///
    /// Returns `true` if the binding is new or already present, `false` if
    /// `var` is bound elsewhere or `entity` is bound to another variable.
    pub fn bind(&mut self, var: &str, entity: &Entity) -> bool {
        if let Some(existing) = self.by_var.get(var) {
            return existing == entity;
        }
        if self.by_entity.contains_key(entity) {
            return false;
        }
        self.by_var.insert(var.to_string(), entity.clone());
        self.by_entity.insert(entity.clone(), var.to_string());
        self.trail.push(var.to_string());
        true
    }

    pub fn get(&self, var: &str) -> Option<&Entity> {
        self.by_var.get(var)
    }

    pub fn variable_of(&self, entity: &Entity) -> Option<&str> {
        self.by_entity.get(entity).map(String::as_str)
    }

    pub fn is_bound(&self, var: &str) -> bool {
        self.by_var.contains_key(var)
    }

    pub fn mark(&self) -> usize {
        self.trail.len()
    }

    pub fn undo_to(&mut self, mark: usize) {
        while self.trail.len() > mark {
            let Some(var) = self.trail.pop() else { break };
            if let Some(entity) = self.by_var.remove(&var) {
                self.by_entity.remove(&entity);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_var.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_var.is_empty()
    }

    /// Bindings in the order they were made.
    pub fn in_order(&self) -> Vec<(String, Entity)> {
        self.trail
            .iter()
            .filter_map(|v| self.by_var.get(v).map(|e| (v.clone(), e.clone())))
            .collect()
    }
}
