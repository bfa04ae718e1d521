//! Application-level orchestration.
//!
//! This module owns the query execution lifecycle (config bootstrap,
//! single-flight execute, state transitions) and the interactive session loop.
//! CLI layers call into this module and render the events it emits.

mod controller;
mod execution;

pub(crate) use controller::{run_controller, UiCommand};
pub(crate) use execution::ExecutionController;
