//! # stateflow-parser
//!
//! Declarative graph builder for stateflow engines.
//!
//! This crate provides:
//! - The machine document schema (YAML and JSON)
//! - An action registry mapping type discriminators to factories, with a
//!   built-in catalog (`log`, `delay`, `set_data`)
//! - The builder that turns a parsed document into a ready-to-run engine
//!
//! The builder performs no referential-integrity validation of transition
//! targets; a dangling target surfaces only at traversal time, when the
//! transition is actually selected.

pub mod builder;
pub mod error;
pub mod registry;
pub mod schema;

pub use builder::Parser;
pub use error::ParseError;
pub use registry::{ActionFactory, ActionRegistry};
pub use schema::{ActionSpec, MachineSpec, StateSpec, TransitionSpec};
