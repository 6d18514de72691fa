//! # stateflow-core
//!
//! Condition-guarded state machine engine.
//!
//! This crate provides:
//! - A thread-safe execution context shared by guards and actions
//! - The action capability and composite actions
//! - The state and transition graph model
//! - Guard expression compilation with a cached evaluator
//! - The traversal engine with observer hooks

pub mod action;
pub mod context;
pub mod engine;
pub mod error;
pub mod guard;
pub mod observer;
pub mod state;
pub mod transition;

pub use action::{Action, ActionError, CompositeAction, FnAction};
pub use context::{CancelToken, ExecutionContext};
pub use engine::{Engine, EngineConfig};
pub use error::EngineError;
pub use guard::{GuardEvaluator, GuardProgram};
pub use observer::{Observer, TracingObserver};
pub use state::{State, StateConfig};
pub use transition::{Transition, TransitionConfig};
