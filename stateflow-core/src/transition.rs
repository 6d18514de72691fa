//! Transitions between states.

use crate::action::{run_all, Action};
use crate::context::ExecutionContext;
use crate::error::EngineError;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Configuration for a [`Transition`].
///
/// Defaults:
///
/// | field         | default                      |
/// |---------------|------------------------------|
/// | `name`        | empty string                 |
/// | `description` | empty string                 |
/// | `guard`       | `None` (unconditional)       |
/// | `actions`     | none                         |
/// | `metadata`    | empty map                    |
#[derive(Default)]
pub struct TransitionConfig {
    pub name: String,
    pub description: String,
    /// Guard expression text. `None` or an empty string makes the
    /// transition unconditional.
    pub guard: Option<String>,
    pub actions: Vec<Arc<dyn Action>>,
    pub metadata: HashMap<String, Value>,
}

/// A directed edge between two states.
///
/// The target id is not validated against any state table at construction;
/// a dangling target surfaces as `MissingTransitionTarget` only when the
/// transition is actually selected during a traversal.
pub struct Transition {
    name: String,
    description: String,
    source: String,
    target: String,
    guard: Option<String>,
    actions: Vec<Arc<dyn Action>>,
    metadata: HashMap<String, Value>,
}

impl Transition {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        config: TransitionConfig,
    ) -> Self {
        Self {
            name: config.name,
            description: config.description,
            source: source.into(),
            target: target.into(),
            guard: config.guard.filter(|g| !g.trim().is_empty()),
            actions: config.actions,
            metadata: config.metadata,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Guard expression text; `None` for unconditional transitions.
    pub fn guard(&self) -> Option<&str> {
        self.guard.as_deref()
    }

    /// An unconditional transition always fires when reached, shadowing any
    /// transition after it in its state's list.
    pub fn is_unconditional(&self) -> bool {
        self.guard.is_none()
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Runs the transition's actions in order, stopping at the first
    /// failure.
    pub(crate) fn execute(&self, ctx: &ExecutionContext) -> Result<(), EngineError> {
        run_all(&self.actions, ctx)
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("guard", &self.guard)
            .field("actions", &self.actions.len())
            .finish()
    }
}
