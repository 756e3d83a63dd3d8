//! TestRelay CLI
//!
//! Command-line interface for preparing runs, running test specs and
//! inspecting run reporting.

pub mod commands;
pub mod output;
