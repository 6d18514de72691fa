//! Declarative machine document schema.
//!
//! Machines are described in YAML or JSON:
//!
//! ```yaml
//! version: "1"
//! name: order
//! initialState: created
//! states:
//!   created:
//!     transitions:
//!       - target: review
//!   review:
//!     transitions:
//!       - target: done
//!         condition: data.approved == true
//!       - target: rejected
//!   done:
//!     isFinal: true
//!   rejected:
//!     isFinal: true
//!     entryActions:
//!       - type: log
//!         parameters:
//!           message: "order rejected"
//! ```
//!
//! An empty or absent `condition` makes a transition unconditional.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Top-level machine document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Id of the state a traversal begins at.
    pub initial_state: String,

    /// States keyed by id.
    #[serde(default)]
    pub states: BTreeMap<String, StateSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl MachineSpec {
    /// crc32c checksum of the canonical JSON encoding, for integrity
    /// checks and change detection.
    pub fn checksum(&self) -> Result<String, ParseError> {
        let bytes = serde_json::to_vec(self)?;
        Ok(format!("{:08x}", crc32c::crc32c(&bytes)))
    }
}

/// A state entry in the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSpec {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub is_final: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_actions: Vec<ActionSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exit_actions: Vec<ActionSpec>,

    /// Declared order is evaluation priority.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<TransitionSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

/// A transition entry in the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionSpec {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Target state id. Not validated at build time.
    pub target: String,

    /// Guard expression; empty means unconditional.
    #[serde(default)]
    pub condition: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

/// An action entry: a type discriminator plus free-form parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub action_type: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_document() {
        let spec: MachineSpec = serde_json::from_value(json!({
            "initialState": "s",
            "states": {"s": {}}
        }))
        .unwrap();

        assert_eq!(spec.initial_state, "s");
        assert!(spec.states["s"].transitions.is_empty());
        assert!(!spec.states["s"].is_final);
    }

    #[test]
    fn test_camel_case_field_names() {
        let spec: MachineSpec = serde_json::from_value(json!({
            "initialState": "a",
            "states": {
                "a": {
                    "isFinal": true,
                    "entryActions": [{"type": "log", "parameters": {"message": "hi"}}],
                    "exitActions": [],
                    "transitions": [{"target": "b", "condition": "data.ok"}]
                }
            }
        }))
        .unwrap();

        let a = &spec.states["a"];
        assert!(a.is_final);
        assert_eq!(a.entry_actions[0].action_type, "log");
        assert_eq!(a.transitions[0].condition, "data.ok");
    }

    #[test]
    fn test_checksum_is_stable_and_content_sensitive() {
        let doc = json!({
            "name": "m",
            "initialState": "s",
            "states": {"s": {}}
        });
        let a: MachineSpec = serde_json::from_value(doc.clone()).unwrap();
        let b: MachineSpec = serde_json::from_value(doc).unwrap();
        assert_eq!(a.checksum().unwrap(), b.checksum().unwrap());

        let c: MachineSpec = serde_json::from_value(json!({
            "name": "other",
            "initialState": "s",
            "states": {"s": {}}
        }))
        .unwrap();
        assert_ne!(a.checksum().unwrap(), c.checksum().unwrap());
    }

    #[test]
    fn test_missing_initial_state_is_a_parse_error() {
        let result: Result<MachineSpec, _> = serde_json::from_value(json!({
            "states": {"s": {}}
        }));
        assert!(result.is_err());
    }
}
