//! Builds engines from parsed machine documents.

use crate::error::ParseError;
use crate::registry::ActionRegistry;
use crate::schema::{ActionSpec, MachineSpec, StateSpec, TransitionSpec};
use stateflow_core::{
    Action, Engine, EngineConfig, State, StateConfig, Transition, TransitionConfig,
};
use std::io::Read;
use std::sync::Arc;

/// Parses machine documents and assembles ready-to-run engines.
pub struct Parser {
    registry: ActionRegistry,
}

impl Parser {
    pub fn new(registry: ActionRegistry) -> Self {
        Self { registry }
    }

    /// Decodes a JSON machine document.
    pub fn parse_json(&self, reader: impl Read) -> Result<MachineSpec, ParseError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Decodes a YAML machine document.
    pub fn parse_yaml(&self, reader: impl Read) -> Result<MachineSpec, ParseError> {
        Ok(serde_yaml::from_reader(reader)?)
    }

    /// Builds an engine from a machine document with a default
    /// [`EngineConfig`].
    pub fn build(&self, spec: &MachineSpec) -> Result<Engine, ParseError> {
        self.build_with(spec, EngineConfig::default())
    }

    /// Builds an engine from a machine document.
    ///
    /// Adds every state, wires transitions in declared order, and sets the
    /// initial state. Transition targets are not validated here: a
    /// dangling target surfaces as `MissingTransitionTarget` only when the
    /// transition is selected during traversal.
    pub fn build_with(
        &self,
        spec: &MachineSpec,
        mut config: EngineConfig,
    ) -> Result<Engine, ParseError> {
        if config.metadata.is_empty() {
            config.metadata = spec.metadata.clone().into_iter().collect();
        }
        let engine = Engine::new(config);

        for (id, state_spec) in &spec.states {
            engine.add_state(self.build_state(id, state_spec)?)?;
        }

        // Second pass so transitions can reference any declared state.
        for (id, state_spec) in &spec.states {
            let state = engine.state(id)?;
            for transition_spec in &state_spec.transitions {
                state.add_transition(self.build_transition(id, transition_spec)?);
            }
        }

        engine.set_initial_state(&spec.initial_state)?;

        let checksum = spec.checksum()?;
        tracing::debug!(
            machine = spec.name.as_str(),
            checksum = checksum.as_str(),
            states = spec.states.len(),
            "machine built"
        );

        Ok(engine)
    }

    fn build_state(&self, id: &str, spec: &StateSpec) -> Result<State, ParseError> {
        Ok(State::new(
            id,
            StateConfig {
                name: spec.name.clone(),
                description: spec.description.clone(),
                entry_actions: self.build_actions(&spec.entry_actions)?,
                exit_actions: self.build_actions(&spec.exit_actions)?,
                terminal: spec.is_final,
                metadata: spec.metadata.clone().into_iter().collect(),
            },
        ))
    }

    fn build_transition(
        &self,
        source: &str,
        spec: &TransitionSpec,
    ) -> Result<Transition, ParseError> {
        Ok(Transition::new(
            source,
            &spec.target,
            TransitionConfig {
                name: spec.name.clone(),
                description: spec.description.clone(),
                guard: if spec.condition.is_empty() {
                    None
                } else {
                    Some(spec.condition.clone())
                },
                actions: self.build_actions(&spec.actions)?,
                metadata: spec.metadata.clone().into_iter().collect(),
            },
        ))
    }

    fn build_actions(&self, specs: &[ActionSpec]) -> Result<Vec<Arc<dyn Action>>, ParseError> {
        specs.iter().map(|s| self.registry.create(s)).collect()
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(ActionRegistry::with_builtins())
    }
}
