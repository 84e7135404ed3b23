//! Lifecycle State Machine (C11, spec §4.11).

use parking_lot::RwLock;

use crate::error::{IndexError, IndexResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Initializing,
    Indexing,
    Indexed,
    Refreshing,
    Failed,
}

impl State {
    /// Queries are permitted in `Indexed` and `Refreshing` (a possibly
    /// stale view); rejected everywhere else with `NOT_READY`.
    pub fn accepts_queries(self) -> bool {
        matches!(self, State::Indexed | State::Refreshing)
    }
}

/// Guards the single allowed transitions between states, rejecting any
/// edge the state machine doesn't name (spec §4.11: "Transitions are
/// explicit and observable").
fn allowed(from: State, to: State) -> bool {
    use State::*;
    if to == Failed {
        return true;
    }
    matches!(
        (from, to),
        (Uninitialized, Initializing)
            | (Initializing, Indexing)
            | (Initializing, Indexed)
            | (Indexing, Indexed)
            | (Indexed, Refreshing)
            | (Refreshing, Indexed)
    )
}

pub struct Lifecycle {
    state: RwLock<State>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::Uninitialized),
        }
    }

    pub fn current(&self) -> State {
        *self.state.read()
    }

    /// Moves to `to`, rejecting transitions the state machine doesn't
    /// define. `Failed` is reachable from any state.
    pub fn transition(&self, to: State) -> IndexResult<()> {
        let mut guard = self.state.write();
        if !allowed(*guard, to) {
            return Err(IndexError::NotReady(format!(
                "illegal transition {:?} -> {:?}",
                *guard, to
            )));
        }
        *guard = to;
        Ok(())
    }

    /// Returns `Ok(())` if queries are currently permitted, else
    /// `NOT_READY` naming the current state.
    pub fn require_ready_for_query(&self) -> IndexResult<()> {
        let state = self.current();
        if state.accepts_queries() {
            Ok(())
        } else {
            Err(IndexError::NotReady(format!("indexer is {state:?}")))
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_are_rejected_before_the_first_index_completes() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.require_ready_for_query().is_err());
        lifecycle.transition(State::Initializing).unwrap();
        assert!(lifecycle.require_ready_for_query().is_err());
    }

    #[test]
    fn queries_are_permitted_while_indexed_or_refreshing() {
        let lifecycle = Lifecycle::new();
        lifecycle.transition(State::Initializing).unwrap();
        lifecycle.transition(State::Indexed).unwrap();
        assert!(lifecycle.require_ready_for_query().is_ok());
        lifecycle.transition(State::Refreshing).unwrap();
        assert!(lifecycle.require_ready_for_query().is_ok());
    }

    #[test]
    fn failed_is_reachable_from_any_state() {
        let lifecycle = Lifecycle::new();
        lifecycle.transition(State::Failed).unwrap();
        assert_eq!(lifecycle.current(), State::Failed);
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.transition(State::Indexed).is_err());
    }
}
