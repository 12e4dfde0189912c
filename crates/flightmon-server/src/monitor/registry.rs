//! The active-variable set.

use std::collections::HashSet;
use std::sync::Arc;

use flightmon_core::{VariableDef, VariableId};

/// Ordered set of catalog variables currently polled and broadcast.
///
/// Membership is by catalog id; a variable appears at most once. Only
/// [`Monitor`](crate::Monitor) mutates it, under its state lock.
#[derive(Debug, Default)]
pub struct ActiveVariableRegistry {
    order: Vec<Arc<VariableDef>>,
    ids: HashSet<VariableId>,
}

impl ActiveVariableRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is active.
    pub fn contains(&self, id: VariableId) -> bool {
        self.ids.contains(&id)
    }

    /// Append `variable` unless already present. Returns whether it was added.
    pub fn insert(&mut self, variable: Arc<VariableDef>) -> bool {
        if !self.ids.insert(variable.id) {
            return false;
        }
        self.order.push(variable);
        true
    }

    /// Active variables in subscription order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<VariableDef>> {
        self.order.iter()
    }

    /// Owned copy of the active variables.
    pub fn snapshot(&self) -> Vec<Arc<VariableDef>> {
        self.order.clone()
    }

    /// Number of active variables.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is active.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Remove every variable.
    pub fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }
}
