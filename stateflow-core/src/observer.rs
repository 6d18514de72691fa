//! Observation hooks for traversal progress.

use crate::context::ExecutionContext;
use crate::state::State;
use crate::transition::Transition;

/// Observer of traversal progress.
///
/// Callbacks run inline on the traversal thread, synchronously with the
/// step they report; a slow or blocking observer stalls the whole
/// traversal. Every callback defaults to a no-op. Observers may look up
/// states on the engine from within a callback; the engine holds no lock
/// across these calls.
pub trait Observer: Send + Sync {
    /// Called when a state is entered, before its entry actions run.
    fn on_state_enter(&self, _ctx: &ExecutionContext, _state: &State) {}

    /// Called when a state is being left, before its exit actions run.
    fn on_state_exit(&self, _ctx: &ExecutionContext, _state: &State) {}

    /// Called after a selected transition's actions ran, immediately before
    /// the current-state pointer advances to `to`.
    fn on_transition(
        &self,
        _ctx: &ExecutionContext,
        _from: &State,
        _to: &State,
        _transition: &Transition,
    ) {
    }
}

/// Observer that reports traversal progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_state_enter(&self, _ctx: &ExecutionContext, state: &State) {
        tracing::debug!(state = state.id(), "state entered");
    }

    fn on_state_exit(&self, _ctx: &ExecutionContext, state: &State) {
        tracing::debug!(state = state.id(), "state exited");
    }

    fn on_transition(
        &self,
        _ctx: &ExecutionContext,
        from: &State,
        to: &State,
        transition: &Transition,
    ) {
        tracing::info!(
            from = from.id(),
            to = to.id(),
            transition = transition.name(),
            "transition taken"
        );
    }
}
