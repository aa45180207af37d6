//! Per-table constraint collections.

use super::constraint::{Constraint, ConstraintId};

/// The constraints of one table, held in validation order.
///
/// Order is by kind priority (CHECK < PRIMARY KEY < UNIQUE <
/// REFERENTIAL) regardless of creation order; constraints of equal
/// priority keep their registration order. Insertion places each new
/// constraint at its stable position, so iteration never needs a sort
/// and repeated calls see the same order.
#[derive(Default)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
}

impl ConstraintSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a constraint at its priority position, after any existing
    /// constraint of the same priority.
    pub fn insert(&mut self, constraint: Constraint) {
        let position = self
            .constraints
            .iter()
            .rposition(|c| c.priority() <= constraint.priority())
            .map(|p| p + 1)
            .unwrap_or(0);
        self.constraints.insert(position, constraint);
    }

    /// Remove a constraint by name.
    pub fn remove(&mut self, name: &str) -> Option<Constraint> {
        let position = self.constraints.iter().position(|c| c.name() == name)?;
        Some(self.constraints.remove(position))
    }

    /// Get a constraint by name.
    pub fn get(&self, name: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.name() == name)
    }

    /// Get a constraint by name, mutably. Used by schema-change paths
    /// that hold exclusive metadata access.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Constraint> {
        self.constraints.iter_mut().find(|c| c.name() == name)
    }

    /// Get a constraint by id.
    pub fn get_by_id(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.id() == id)
    }

    /// Iterate in validation order.
    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    /// Iterate mutably, preserving order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Constraint> {
        self.constraints.iter_mut()
    }

    /// Constraints validated before the physical row mutation.
    pub fn iter_before(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(|c| c.is_before())
    }

    /// Constraints validated after the physical row mutation.
    pub fn iter_after(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(|c| !c.is_before())
    }

    /// Whether a constraint with this name exists.
    pub fn contains_name(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of constraints.
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Names in validation order.
    pub fn names(&self) -> Vec<&str> {
        self.constraints.iter().map(|c| c.name()).collect()
    }
}
