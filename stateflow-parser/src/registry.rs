//! Action registry and the built-in action catalog.

use crate::error::ParseError;
use crate::schema::ActionSpec;
use dashmap::DashMap;
use serde_json::Value;
use stateflow_core::{Action, ActionError, ExecutionContext, FnAction};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Builds an action from its declarative spec.
pub type ActionFactory =
    Arc<dyn Fn(&ActionSpec) -> Result<Arc<dyn Action>, ParseError> + Send + Sync>;

/// Registry mapping action type discriminators to factories.
///
/// The core engine never sees this registry; it only consumes the actions
/// produced here.
pub struct ActionRegistry {
    factories: DashMap<String, ActionFactory>,
}

impl ActionRegistry {
    /// Empty registry with no action types.
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in catalog: `log`, `delay`,
    /// and `set_data`.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("log", Arc::new(make_log));
        registry.register("delay", Arc::new(make_delay));
        registry.register("set_data", Arc::new(make_set_data));
        registry
    }

    /// Registers a factory for `action_type`, replacing any existing one.
    pub fn register(&self, action_type: impl Into<String>, factory: ActionFactory) {
        self.factories.insert(action_type.into(), factory);
    }

    /// Creates an action for the given spec.
    pub fn create(&self, spec: &ActionSpec) -> Result<Arc<dyn Action>, ParseError> {
        let factory = self
            .factories
            .get(&spec.action_type)
            .map(|f| f.value().clone())
            .ok_or_else(|| ParseError::UnknownActionType {
                action_type: spec.action_type.clone(),
            })?;
        (*factory)(spec)
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn display_name(spec: &ActionSpec, fallback: &str) -> String {
    if spec.name.is_empty() {
        fallback.to_string()
    } else {
        spec.name.clone()
    }
}

fn param_str(spec: &ActionSpec, key: &str) -> Option<String> {
    spec.parameters
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// `log`: emits `message` through `tracing` at the configured `level`
/// (debug/info/warn/error, default info).
fn make_log(spec: &ActionSpec) -> Result<Arc<dyn Action>, ParseError> {
    let message = param_str(spec, "message").unwrap_or_default();
    let level = param_str(spec, "level").unwrap_or_else(|| "info".to_string());
    let name = display_name(spec, "log");

    match level.as_str() {
        "debug" | "info" | "warn" | "error" => {}
        other => {
            return Err(ParseError::InvalidAction {
                name,
                reason: format!("unknown log level: '{other}'"),
            })
        }
    }

    Ok(Arc::new(FnAction::new(
        name,
        move |_ctx: &ExecutionContext| -> Result<(), ActionError> {
            match level.as_str() {
                "debug" => tracing::debug!("{message}"),
                "warn" => tracing::warn!("{message}"),
                "error" => tracing::error!("{message}"),
                _ => tracing::info!("{message}"),
            }
            Ok(())
        },
    )))
}

/// `delay`: sleeps the traversal thread for the `duration` parameter.
/// Honors the context's cancellation token before sleeping; this is the
/// only cancellation check the system makes.
fn make_delay(spec: &ActionSpec) -> Result<Arc<dyn Action>, ParseError> {
    let name = display_name(spec, "delay");
    let raw = spec.parameters.get("duration").cloned().unwrap_or(Value::Null);
    let duration = parse_duration(&raw).ok_or_else(|| ParseError::InvalidAction {
        name: name.clone(),
        reason: format!("invalid duration: {raw}"),
    })?;

    Ok(Arc::new(FnAction::new(
        name,
        move |ctx: &ExecutionContext| -> Result<(), ActionError> {
            if ctx.cancel_token().is_cancelled() {
                return Err("cancelled before delay".into());
            }
            thread::sleep(duration);
            Ok(())
        },
    )))
}

/// `set_data`: writes the `value` parameter into the context's data map
/// under `key`.
fn make_set_data(spec: &ActionSpec) -> Result<Arc<dyn Action>, ParseError> {
    let name = display_name(spec, "set_data");
    let key = param_str(spec, "key").ok_or_else(|| ParseError::InvalidAction {
        name: name.clone(),
        reason: "missing 'key' parameter".to_string(),
    })?;
    let value = spec.parameters.get("value").cloned().unwrap_or(Value::Null);

    Ok(Arc::new(FnAction::new(
        name,
        move |ctx: &ExecutionContext| -> Result<(), ActionError> {
            ctx.set_data(key.clone(), value.clone());
            Ok(())
        },
    )))
}

/// Accepts `"250ms"`, `"2s"`, or a bare number of milliseconds.
fn parse_duration(value: &Value) -> Option<Duration> {
    match value {
        Value::Number(n) => n.as_u64().map(Duration::from_millis),
        Value::String(s) => {
            let s = s.trim();
            if let Some(millis) = s.strip_suffix("ms") {
                millis.trim().parse::<u64>().ok().map(Duration::from_millis)
            } else if let Some(secs) = s.strip_suffix('s') {
                let secs = secs.trim().parse::<f64>().ok()?;
                // Rejects negative, non-finite, and values beyond
                // Duration's range.
                Duration::try_from_secs_f64(secs).ok()
            } else {
                None
            }
        }
        _ => None,
    }
}
