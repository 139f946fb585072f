//! Target registry

use std::collections::BTreeMap;

use tracing::debug;

use crate::target::{TargetId, TargetState};

/// Owns every target's state, keyed and iterated in id order
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<TargetId, TargetState>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with `ids`
    pub fn with_targets(ids: impl IntoIterator<Item = TargetId>) -> Self {
        let mut registry = Self::new();
        for id in ids {
            registry.get_or_insert(&id);
        }
        registry
    }

    /// State for `id`, created on first use
    pub fn get_or_insert(&mut self, id: &TargetId) -> &mut TargetState {
        self.targets.entry(id.clone()).or_insert_with(|| {
            debug!("Registering target {}", id);
            TargetState::new(id.clone())
        })
    }

    pub fn get(&self, id: &TargetId) -> Option<&TargetState> {
        self.targets.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetState> {
        self.targets.values()
    }

    /// Disjoint mutable access to every target
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TargetState> {
        self.targets.values_mut()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
