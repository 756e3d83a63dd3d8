//! TestRelay Common Library
//!
//! Shared types, configuration, run metadata persistence and the pure text
//! helpers (failure snippets, progress rendering) used by the reporter, the
//! test runner and the CLI.

pub mod config;
pub mod error;
pub mod metadata;
pub mod progress;
pub mod snippet;
pub mod types;

// Re-export commonly used types
pub use config::{DiscordConfig, FlushConfig, RelayConfig, RunConfig};
pub use error::{Error, Result};
pub use metadata::RunMetadataStore;
pub use snippet::extract_snippet;
pub use types::*;

/// TestRelay version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "testrelay.toml";
