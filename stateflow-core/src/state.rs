//! States and their outgoing transitions.

use crate::action::{run_all, Action};
use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::transition::Transition;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Configuration for a [`State`].
///
/// Defaults:
///
/// | field           | default      |
/// |-----------------|--------------|
/// | `name`          | empty string |
/// | `description`   | empty string |
/// | `entry_actions` | none         |
/// | `exit_actions`  | none         |
/// | `terminal`      | `false`      |
/// | `metadata`      | empty map    |
#[derive(Default)]
pub struct StateConfig {
    pub name: String,
    pub description: String,
    pub entry_actions: Vec<Arc<dyn Action>>,
    pub exit_actions: Vec<Arc<dyn Action>>,
    pub terminal: bool,
    pub metadata: HashMap<String, Value>,
}

/// A node in the machine graph.
///
/// The id is the primary key within an engine and is immutable once the
/// state is attached. The transition list may still be appended to, but
/// appending while a traversal is in flight is not a defined-safe
/// operation; callers must serialize graph mutation against traversal.
pub struct State {
    id: String,
    name: String,
    description: String,
    entry_actions: Vec<Arc<dyn Action>>,
    exit_actions: Vec<Arc<dyn Action>>,
    transitions: RwLock<Vec<Arc<Transition>>>,
    terminal: bool,
    metadata: HashMap<String, Value>,
}

impl State {
    pub fn new(id: impl Into<String>, config: StateConfig) -> Self {
        Self {
            id: id.into(),
            name: config.name,
            description: config.description,
            entry_actions: config.entry_actions,
            exit_actions: config.exit_actions,
            transitions: RwLock::new(Vec::new()),
            terminal: config.terminal,
            metadata: config.metadata,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The terminal flag is descriptive only: traversal halts wherever no
    /// transition fires, terminal or not.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Appends an outgoing transition. Order of addition is evaluation
    /// priority.
    pub fn add_transition(&self, transition: Transition) {
        self.transitions.write().push(Arc::new(transition));
    }

    /// Snapshot of the outgoing transitions in priority order.
    pub fn transitions(&self) -> Vec<Arc<Transition>> {
        self.transitions.read().clone()
    }

    /// Runs the entry actions in order, stopping at the first failure.
    pub(crate) fn enter(&self, ctx: &ExecutionContext) -> Result<(), EngineError> {
        run_all(&self.entry_actions, ctx)
    }

    /// Runs the exit actions in order, stopping at the first failure.
    pub(crate) fn exit(&self, ctx: &ExecutionContext) -> Result<(), EngineError> {
        run_all(&self.exit_actions, ctx)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("terminal", &self.terminal)
            .field("entry_actions", &self.entry_actions.len())
            .field("exit_actions", &self.exit_actions.len())
            .field("transitions", &self.transitions.read().len())
            .finish()
    }
}
