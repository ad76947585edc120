//! Mapping from state identity to definition.

use std::{collections::HashMap, sync::Arc};

use crate::state::State;

/// All states known to a machine.
///
/// Filled in by [`StateMachineBuilder`](crate::StateMachineBuilder) and
/// frozen when the machine is built, so lookups need no locking.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    states: HashMap<String, Arc<State>>,
}

impl Registry {
    /// Stores `state` under its id. A previous definition with the same id is
    /// replaced and returned.
    pub fn register(&mut self, state: State) -> Option<Arc<State>> {
        self.states.insert(state.id().to_owned(), Arc::new(state))
    }

    pub fn get(&self, id: &str) -> Option<Arc<State>> {
        self.states.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.states.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Registered ids, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn last_registration_wins() {
        let mut registry = Registry::default();
        assert!(registry.is_empty());

        registry.register(State::builder("a").build());
        let replaced = registry.register(
            State::builder("a")
                .dwell_timeout(Duration::from_secs(1))
                .build(),
        );

        assert!(replaced.is_some());
        assert_eq!(registry.len(), 1);
        let state = registry.get("a").unwrap();
        assert_eq!(state.dwell_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn unknown_id_is_absent() {
        let mut registry = Registry::default();
        registry.register(State::builder("a").build());
        assert!(registry.contains("a"));
        assert!(registry.get("b").is_none());
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["a"]);
    }
}
