//! Action capability and composite actions.

use crate::context::ExecutionContext;
use crate::error::EngineError;
use std::sync::Arc;

/// Error produced by an action implementation.
pub type ActionError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An atomic unit of side effect, run when a state is entered or left and
/// when a transition fires.
///
/// The engine never inspects an action's internals; it only calls
/// [`execute`](Action::execute) and reports the [`name`](Action::name) in
/// logs and errors.
pub trait Action: Send + Sync {
    /// Runs the action against the shared context.
    fn execute(&self, ctx: &ExecutionContext) -> Result<(), ActionError>;

    /// Name used in logs and error reports.
    fn name(&self) -> &str;
}

/// Adapter turning a closure into an [`Action`].
pub struct FnAction<F> {
    name: String,
    f: F,
}

impl<F> FnAction<F>
where
    F: Fn(&ExecutionContext) -> Result<(), ActionError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Action for FnAction<F>
where
    F: Fn(&ExecutionContext) -> Result<(), ActionError> + Send + Sync,
{
    fn execute(&self, ctx: &ExecutionContext) -> Result<(), ActionError> {
        (self.f)(ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Ordered sequence of actions treated as one.
///
/// Children run strictly in order. The first failure is returned
/// immediately and the remaining children do not run; already-executed
/// children are not rolled back.
pub struct CompositeAction {
    name: String,
    actions: Vec<Arc<dyn Action>>,
}

impl CompositeAction {
    pub fn new(name: impl Into<String>, actions: Vec<Arc<dyn Action>>) -> Self {
        Self {
            name: name.into(),
            actions,
        }
    }
}

impl Action for CompositeAction {
    fn execute(&self, ctx: &ExecutionContext) -> Result<(), ActionError> {
        for action in &self.actions {
            action.execute(ctx)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Runs a list of actions in order, wrapping the first failure with the
/// failing action's name.
pub(crate) fn run_all(
    actions: &[Arc<dyn Action>],
    ctx: &ExecutionContext,
) -> Result<(), EngineError> {
    for action in actions {
        action.execute(ctx).map_err(|source| {
            tracing::warn!(action = action.name(), error = %source, "action failed");
            EngineError::Action {
                action: action.name().to_string(),
                source,
            }
        })?;
    }
    Ok(())
}
