//! CLI command implementations

pub mod run;
pub mod setup;
pub mod snippet;
pub mod status;
pub mod summary;
