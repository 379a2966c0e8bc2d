//! Maps step types to their `Activity` implementations.

use std::collections::HashMap;
use std::sync::Arc;

use activities::{builtin_activities, ActionType, Activity, Services};

#[derive(Default, Clone)]
pub struct ActivityRegistry {
    activities: HashMap<ActionType, Arc<dyn Activity>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in step wired to `services`.
    pub fn builtin(services: &Services) -> Self {
        builtin_activities(services)
            .into_iter()
            .fold(Self::new(), |registry, (t, a)| registry.with(t, a))
    }

    /// Register `activity` for `action_type`, replacing any previous one.
    pub fn with(mut self, action_type: ActionType, activity: Arc<dyn Activity>) -> Self {
        self.activities.insert(action_type, activity);
        self
    }

    pub fn get(&self, action_type: ActionType) -> Option<&Arc<dyn Activity>> {
        self.activities.get(&action_type)
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}
