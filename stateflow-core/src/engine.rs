//! Traversal engine - owns the state table and resolves transitions.

use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::guard::GuardEvaluator;
use crate::observer::Observer;
use crate::state::State;
use crate::transition::Transition;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Configuration for an [`Engine`].
///
/// Defaults:
///
/// | field       | default                                          |
/// |-------------|--------------------------------------------------|
/// | `evaluator` | a fresh evaluator with an empty compile cache    |
/// | `observer`  | no observation                                   |
/// | `metadata`  | empty map                                        |
#[derive(Default)]
pub struct EngineConfig {
    /// Guard evaluator, shareable with other engines to pool the compile
    /// cache.
    pub evaluator: Option<Arc<GuardEvaluator>>,
    /// Observer invoked inline on traversal progress.
    pub observer: Option<Arc<dyn Observer>>,
    /// Free-form engine metadata.
    pub metadata: HashMap<String, Value>,
}

/// Drives an execution context through a graph of guarded transitions.
///
/// Traversal is single-threaded, synchronous, call-and-return: `start`
/// blocks the calling thread until it reaches a state where no transition
/// fires, or an error aborts the run. An engine value is logically
/// single-run - its current-state pointer represents exactly one active
/// traversal; rerunning the same engine must be serialized by the caller.
///
/// There is no cycle detection: a guard configuration that is always
/// satisfied recurses once per transition taken, without bound.
pub struct Engine {
    states: DashMap<String, Arc<State>>,
    initial: RwLock<Option<String>>,
    current: RwLock<Option<String>>,
    evaluator: Arc<GuardEvaluator>,
    observer: Option<Arc<dyn Observer>>,
    metadata: HashMap<String, Value>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            states: DashMap::new(),
            initial: RwLock::new(None),
            current: RwLock::new(None),
            evaluator: config.evaluator.unwrap_or_default(),
            observer: config.observer,
            metadata: config.metadata,
        }
    }

    /// Adds a state to the table. Ids are unique per engine.
    pub fn add_state(&self, state: State) -> Result<(), EngineError> {
        match self.states.entry(state.id().to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(EngineError::DuplicateState {
                id: state.id().to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(state));
                Ok(())
            }
        }
    }

    /// Sets the state a traversal begins at. The state must already have
    /// been added.
    pub fn set_initial_state(&self, id: &str) -> Result<(), EngineError> {
        if !self.states.contains_key(id) {
            return Err(EngineError::Configuration {
                reason: format!("initial state '{id}' has not been added"),
            });
        }
        *self.initial.write() = Some(id.to_string());
        Ok(())
    }

    /// Runs one traversal to completion.
    ///
    /// Blocks until the traversal reaches a state with no firing transition
    /// (a silent halt, `Ok`) or an error aborts it. On error the
    /// current-state pointer is left at the last successfully entered
    /// state, never advanced past the failed step.
    pub fn start(&self, ctx: &ExecutionContext) -> Result<(), EngineError> {
        let initial_id =
            self.initial
                .read()
                .clone()
                .ok_or_else(|| EngineError::Configuration {
                    reason: "initial state is empty".to_string(),
                })?;

        let initial = self
            .states
            .get(&initial_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| EngineError::Configuration {
                reason: format!("initial state '{initial_id}' has not been added"),
            })?;

        tracing::debug!(state = initial_id.as_str(), "traversal started");
        *self.current.write() = Some(initial_id);
        self.execute_state(ctx, initial)
    }

    /// Executes one state: entry actions, then transition resolution.
    ///
    /// Recursion depth equals the number of transitions taken in the run.
    fn execute_state(&self, ctx: &ExecutionContext, state: Arc<State>) -> Result<(), EngineError> {
        if let Some(observer) = &self.observer {
            observer.on_state_enter(ctx, &state);
        }

        state.enter(ctx)?;

        for transition in state.transitions() {
            let selected = match transition.guard() {
                // An unconditional transition fires without evaluation;
                // anything after it in the list is unreachable by contract.
                None => true,
                Some(expression) => self.evaluator.evaluate(expression, ctx)?,
            };
            if selected {
                return self.take(ctx, &state, &transition);
            }
        }

        tracing::debug!(state = state.id(), "no transition fired, traversal halted");
        Ok(())
    }

    /// Takes a selected transition: exit the source, run the transition's
    /// actions, commit the pointer, recurse into the target.
    fn take(
        &self,
        ctx: &ExecutionContext,
        from: &Arc<State>,
        transition: &Arc<Transition>,
    ) -> Result<(), EngineError> {
        let target = self
            .states
            .get(transition.target())
            .map(|s| s.value().clone())
            .ok_or_else(|| EngineError::MissingTransitionTarget {
                from: from.id().to_string(),
                target: transition.target().to_string(),
            })?;

        if let Some(observer) = &self.observer {
            observer.on_state_exit(ctx, from);
        }
        from.exit(ctx)?;
        transition.execute(ctx)?;

        if let Some(observer) = &self.observer {
            observer.on_transition(ctx, from, &target, transition);
        }

        tracing::debug!(from = from.id(), to = target.id(), "transition taken");
        *self.current.write() = Some(target.id().to_string());

        self.execute_state(ctx, target)
    }

    /// Id of the last successfully entered state. Errors until a traversal
    /// has started.
    pub fn current_state(&self) -> Result<String, EngineError> {
        self.current
            .read()
            .clone()
            .ok_or(EngineError::EmptyCurrentState)
    }

    /// Looks up a state by id.
    pub fn state(&self, id: &str) -> Result<Arc<State>, EngineError> {
        self.states
            .get(id)
            .map(|s| s.value().clone())
            .ok_or_else(|| EngineError::StateNotFound { id: id.to_string() })
    }

    /// The guard evaluator backing this engine.
    pub fn evaluator(&self) -> &Arc<GuardEvaluator> {
        &self.evaluator
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("states", &self.states.len())
            .field("initial", &*self.initial.read())
            .field("current", &*self.current.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionError, FnAction};
    use crate::state::StateConfig;
    use crate::transition::TransitionConfig;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        entered: Mutex<Vec<String>>,
        exited: Mutex<Vec<String>>,
        transitions: Mutex<Vec<(String, String)>>,
    }

    impl Observer for Recorder {
        fn on_state_enter(&self, _ctx: &ExecutionContext, state: &State) {
            self.entered.lock().push(state.id().to_string());
        }

        fn on_state_exit(&self, _ctx: &ExecutionContext, state: &State) {
            self.exited.lock().push(state.id().to_string());
        }

        fn on_transition(
            &self,
            _ctx: &ExecutionContext,
            from: &State,
            to: &State,
            _transition: &Transition,
        ) {
            self.transitions
                .lock()
                .push((from.id().to_string(), to.id().to_string()));
        }
    }

    fn failing_action(name: &str) -> Arc<dyn Action> {
        Arc::new(FnAction::new(
            name,
            |_ctx: &ExecutionContext| -> Result<(), ActionError> { Err("boom".into()) },
        ))
    }

    fn bare_state(id: &str) -> State {
        State::new(id, StateConfig::default())
    }

    fn unconditional(source: &str, target: &str) -> Transition {
        Transition::new(source, target, TransitionConfig::default())
    }

    fn guarded(source: &str, target: &str, guard: &str) -> Transition {
        Transition::new(
            source,
            target,
            TransitionConfig {
                guard: Some(guard.to_string()),
                ..Default::default()
            },
        )
    }

    /// Start --(unconditional)--> Review; Review --(approved)--> Done;
    /// Review --(unconditional)--> Rejected.
    fn approval_engine(config: EngineConfig) -> Engine {
        let engine = Engine::new(config);
        engine.add_state(bare_state("start")).unwrap();
        engine.add_state(bare_state("review")).unwrap();
        engine
            .add_state(State::new(
                "done",
                StateConfig {
                    terminal: true,
                    ..Default::default()
                },
            ))
            .unwrap();
        engine
            .add_state(State::new(
                "rejected",
                StateConfig {
                    terminal: true,
                    ..Default::default()
                },
            ))
            .unwrap();

        engine
            .state("start")
            .unwrap()
            .add_transition(unconditional("start", "review"));
        let review = engine.state("review").unwrap();
        review.add_transition(guarded("review", "done", "data.approved == true"));
        review.add_transition(unconditional("review", "rejected"));

        engine.set_initial_state("start").unwrap();
        engine
    }

    #[test]
    fn test_approval_scenario_rejected_on_empty_data() {
        let engine = approval_engine(EngineConfig::default());
        let ctx = ExecutionContext::new();

        engine.start(&ctx).unwrap();
        assert_eq!(engine.current_state().unwrap(), "rejected");
    }

    #[test]
    fn test_approval_scenario_done_when_approved() {
        let engine = approval_engine(EngineConfig::default());
        let ctx = ExecutionContext::new();
        ctx.set_data("approved", json!(true));

        engine.start(&ctx).unwrap();
        assert_eq!(engine.current_state().unwrap(), "done");
    }

    #[test]
    fn test_visited_sequence_is_deterministic() {
        let mut sequences = Vec::new();
        for _ in 0..3 {
            let recorder = Arc::new(Recorder::default());
            let engine = approval_engine(EngineConfig {
                observer: Some(recorder.clone()),
                ..Default::default()
            });
            let ctx = ExecutionContext::new();
            ctx.set_data("approved", json!(true));
            engine.start(&ctx).unwrap();
            sequences.push(recorder.entered.lock().clone());
        }

        assert_eq!(sequences[0], vec!["start", "review", "done"]);
        assert_eq!(sequences[0], sequences[1]);
        assert_eq!(sequences[1], sequences[2]);
    }

    #[test]
    fn test_guard_priority_over_fallback() {
        let build = || {
            let engine = Engine::new(EngineConfig::default());
            engine.add_state(bare_state("s")).unwrap();
            engine.add_state(bare_state("a")).unwrap();
            engine.add_state(bare_state("b")).unwrap();
            let s = engine.state("s").unwrap();
            s.add_transition(guarded("s", "a", "x > 0"));
            s.add_transition(unconditional("s", "b"));
            engine.set_initial_state("s").unwrap();
            engine
        };

        let engine = build();
        let ctx = ExecutionContext::new();
        ctx.set_data("x", json!(5));
        engine.start(&ctx).unwrap();
        assert_eq!(engine.current_state().unwrap(), "a");

        let engine = build();
        let ctx = ExecutionContext::new();
        ctx.set_data("x", json!(-1));
        engine.start(&ctx).unwrap();
        assert_eq!(engine.current_state().unwrap(), "b");
    }

    #[test]
    fn test_unconditional_shadows_later_transitions() {
        for x in [-1, 0, 5] {
            let engine = Engine::new(EngineConfig::default());
            engine.add_state(bare_state("s")).unwrap();
            engine.add_state(bare_state("shadow")).unwrap();
            engine.add_state(bare_state("never")).unwrap();
            let s = engine.state("s").unwrap();
            s.add_transition(unconditional("s", "shadow"));
            s.add_transition(guarded("s", "never", "x > 0"));
            engine.set_initial_state("s").unwrap();

            let ctx = ExecutionContext::new();
            ctx.set_data("x", json!(x));
            engine.start(&ctx).unwrap();
            assert_eq!(engine.current_state().unwrap(), "shadow");
        }
    }

    #[test]
    fn test_guard_error_aborts_without_fallthrough() {
        // A later unconditional transition must not rescue a malformed
        // guard on the first transition.
        let engine = Engine::new(EngineConfig::default());
        engine.add_state(bare_state("s")).unwrap();
        engine.add_state(bare_state("a")).unwrap();
        engine.add_state(bare_state("b")).unwrap();
        let s = engine.state("s").unwrap();
        s.add_transition(guarded("s", "a", "data.(("));
        s.add_transition(unconditional("s", "b"));
        engine.set_initial_state("s").unwrap();

        let err = engine.start(&ExecutionContext::new()).unwrap_err();
        assert!(matches!(err, EngineError::Guard { .. }));
        assert_eq!(engine.current_state().unwrap(), "s");
    }

    #[test]
    fn test_silent_halt_on_non_terminal_state() {
        let engine = Engine::new(EngineConfig::default());
        engine.add_state(bare_state("s")).unwrap();
        engine.add_state(bare_state("a")).unwrap();
        let s = engine.state("s").unwrap();
        s.add_transition(guarded("s", "a", "x > 0"));
        engine.set_initial_state("s").unwrap();

        let ctx = ExecutionContext::new();
        ctx.set_data("x", json!(-3));
        engine.start(&ctx).unwrap();
        assert_eq!(engine.current_state().unwrap(), "s");
        assert!(!engine.state("s").unwrap().is_terminal());
    }

    #[test]
    fn test_missing_target_surfaces_only_when_selected() {
        let build = || {
            let engine = Engine::new(EngineConfig::default());
            engine.add_state(bare_state("s")).unwrap();
            let s = engine.state("s").unwrap();
            // Target never added via add_state
            s.add_transition(guarded("s", "nowhere", "go == true"));
            engine.set_initial_state("s").unwrap();
            engine
        };

        // Guard false: the dangling target is never noticed
        let engine = build();
        let ctx = ExecutionContext::new();
        ctx.set_data("go", json!(false));
        engine.start(&ctx).unwrap();
        assert_eq!(engine.current_state().unwrap(), "s");

        // Guard true: selection discovers the missing target
        let engine = build();
        let ctx = ExecutionContext::new();
        ctx.set_data("go", json!(true));
        let err = engine.start(&ctx).unwrap_err();
        match err {
            EngineError::MissingTransitionTarget { from, target } => {
                assert_eq!(from, "s");
                assert_eq!(target, "nowhere");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(engine.current_state().unwrap(), "s");
    }

    #[test]
    fn test_compile_cache_shared_across_engines() {
        let evaluator = Arc::new(GuardEvaluator::new());

        for _ in 0..5 {
            let engine = approval_engine(EngineConfig {
                evaluator: Some(evaluator.clone()),
                ..Default::default()
            });
            let ctx = ExecutionContext::new();
            ctx.set_data("approved", json!(true));
            engine.start(&ctx).unwrap();
        }

        // One distinct guard expression, compiled exactly once across all
        // five traversals.
        assert_eq!(evaluator.compile_count(), 1);
    }

    #[test]
    fn test_add_state_rejects_duplicate_id() {
        let engine = Engine::new(EngineConfig::default());
        engine.add_state(bare_state("s")).unwrap();

        let err = engine.add_state(bare_state("s")).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateState { id } if id == "s"));
    }

    #[test]
    fn test_set_initial_state_requires_known_id() {
        let engine = Engine::new(EngineConfig::default());
        let err = engine.set_initial_state("missing").unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));

        engine.add_state(bare_state("s")).unwrap();
        engine.set_initial_state("s").unwrap();
    }

    #[test]
    fn test_start_without_initial_state() {
        let engine = Engine::new(EngineConfig::default());
        engine.add_state(bare_state("s")).unwrap();

        let err = engine.start(&ExecutionContext::new()).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[test]
    fn test_current_state_before_start() {
        let engine = Engine::new(EngineConfig::default());
        let err = engine.current_state().unwrap_err();
        assert!(matches!(err, EngineError::EmptyCurrentState));
    }

    #[test]
    fn test_state_lookup_not_found() {
        let engine = Engine::new(EngineConfig::default());
        let err = engine.state("ghost").unwrap_err();
        assert!(matches!(err, EngineError::StateNotFound { id } if id == "ghost"));
    }

    #[test]
    fn test_entry_action_failure_keeps_current_at_entered_state() {
        let engine = Engine::new(EngineConfig::default());
        engine.add_state(bare_state("s")).unwrap();
        engine
            .add_state(State::new(
                "broken",
                StateConfig {
                    entry_actions: vec![failing_action("entry-fail")],
                    ..Default::default()
                },
            ))
            .unwrap();
        engine
            .state("s")
            .unwrap()
            .add_transition(unconditional("s", "broken"));
        engine.set_initial_state("s").unwrap();

        let err = engine.start(&ExecutionContext::new()).unwrap_err();
        assert!(matches!(err, EngineError::Action { .. }));
        // The pointer had already committed to the entered state.
        assert_eq!(engine.current_state().unwrap(), "broken");
    }

    #[test]
    fn test_exit_action_failure_keeps_current_at_source() {
        let engine = Engine::new(EngineConfig::default());
        engine
            .add_state(State::new(
                "s",
                StateConfig {
                    exit_actions: vec![failing_action("exit-fail")],
                    ..Default::default()
                },
            ))
            .unwrap();
        engine.add_state(bare_state("t")).unwrap();
        engine
            .state("s")
            .unwrap()
            .add_transition(unconditional("s", "t"));
        engine.set_initial_state("s").unwrap();

        let err = engine.start(&ExecutionContext::new()).unwrap_err();
        assert!(matches!(err, EngineError::Action { .. }));
        assert_eq!(engine.current_state().unwrap(), "s");
    }

    #[test]
    fn test_transition_action_failure_keeps_current_at_source() {
        let engine = Engine::new(EngineConfig::default());
        engine.add_state(bare_state("s")).unwrap();
        engine.add_state(bare_state("t")).unwrap();
        engine.state("s").unwrap().add_transition(Transition::new(
            "s",
            "t",
            TransitionConfig {
                actions: vec![failing_action("transition-fail")],
                ..Default::default()
            },
        ));
        engine.set_initial_state("s").unwrap();

        let err = engine.start(&ExecutionContext::new()).unwrap_err();
        assert!(matches!(err, EngineError::Action { .. }));
        assert_eq!(engine.current_state().unwrap(), "s");
    }

    #[test]
    fn test_observer_sees_exits_and_transitions_in_order() {
        let recorder = Arc::new(Recorder::default());
        let engine = approval_engine(EngineConfig {
            observer: Some(recorder.clone()),
            ..Default::default()
        });

        engine.start(&ExecutionContext::new()).unwrap();

        assert_eq!(
            recorder.entered.lock().clone(),
            vec!["start", "review", "rejected"]
        );
        assert_eq!(recorder.exited.lock().clone(), vec!["start", "review"]);
        assert_eq!(
            recorder.transitions.lock().clone(),
            vec![
                ("start".to_string(), "review".to_string()),
                ("review".to_string(), "rejected".to_string())
            ]
        );
    }

    #[test]
    fn test_actions_can_read_engine_state_via_shared_reference() {
        // The state table lock is not held across action execution, so an
        // action may look states up without deadlocking.
        let engine = Arc::new(Engine::new(EngineConfig::default()));
        let engine_ref = engine.clone();

        engine
            .add_state(State::new(
                "s",
                StateConfig {
                    entry_actions: vec![Arc::new(FnAction::new(
                        "lookup",
                        move |ctx: &ExecutionContext| {
                            let state = engine_ref.state("s").map_err(Box::new)?;
                            ctx.set_data("looked_up", json!(state.id()));
                            Ok(())
                        },
                    ))],
                    ..Default::default()
                },
            ))
            .unwrap();
        engine.set_initial_state("s").unwrap();

        let ctx = ExecutionContext::new();
        engine.start(&ctx).unwrap();
        assert_eq!(ctx.get_data("looked_up"), Some(json!("s")));
    }

    #[test]
    fn test_guard_reads_fresh_snapshot_each_evaluation() {
        // An entry action mutates data; the guard evaluated afterwards must
        // see the mutation.
        let engine = Engine::new(EngineConfig::default());
        engine
            .add_state(State::new(
                "s",
                StateConfig {
                    entry_actions: vec![Arc::new(FnAction::new(
                        "flip",
                        |ctx: &ExecutionContext| {
                            ctx.set_data("ready", json!(true));
                            Ok(())
                        },
                    ))],
                    ..Default::default()
                },
            ))
            .unwrap();
        engine.add_state(bare_state("t")).unwrap();
        engine
            .state("s")
            .unwrap()
            .add_transition(guarded("s", "t", "ready == true"));
        engine.set_initial_state("s").unwrap();

        let ctx = ExecutionContext::new();
        ctx.set_data("ready", json!(false));
        engine.start(&ctx).unwrap();
        assert_eq!(engine.current_state().unwrap(), "t");
    }

    #[test]
    fn test_engine_debug_summarizes_pointers() {
        let engine = Engine::new(EngineConfig::default());
        engine.add_state(bare_state("s")).unwrap();
        engine.set_initial_state("s").unwrap();

        let repr = format!("{engine:?}");
        assert!(repr.contains("Engine"));
        assert!(repr.contains("\"s\""));
    }
}
