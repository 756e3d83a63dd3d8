//! Error types for the test runner

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Test spec parse error in {path}: {reason}")]
    SpecParse { path: String, reason: String },

    #[error("Invalid test spec '{name}': {reason}")]
    SpecInvalid { name: String, reason: String },

    #[error("Duplicate test name '{0}'")]
    DuplicateSpec(String),

    #[error("Invalid tag filter '{0}'")]
    TagFilter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Config(#[from] testrelay_common::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
