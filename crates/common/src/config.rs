//! TestRelay configuration
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! process environment. The CLI applies its own flags last.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::metadata::DEFAULT_RUN_META_FILE;
use crate::types::Project;

/// Default GraphQL endpoint path, relative to the API base URL
pub const DEFAULT_GRAPHQL_PATH: &str = "/api/v1/pharmaserv/graphql";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Chat reporting
    pub discord: DiscordConfig,

    /// Test run selection and targets
    pub run: RunConfig,

    /// Notification queue timings
    pub flush: FlushConfig,
}

/// Discord reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token; reporting is disabled without it
    pub bot_token: Option<String>,

    /// Channel receiving the header message
    pub channel_id: Option<String>,

    /// REST API base
    pub api_base: String,

    /// Also post a message for every passed test
    pub log_passed: bool,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            channel_id: None,
            api_base: "https://discord.com/api/v10".to_string(),
            log_passed: false,
        }
    }
}

impl DiscordConfig {
    /// Token and channel, if both are present and non-blank
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let token = self.bot_token.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        let channel = self.channel_id.as_deref().map(str::trim).filter(|c| !c.is_empty())?;
        Some((token, channel))
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials().is_some()
    }
}

/// Per-environment base URLs for browser tests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseUrls {
    pub local: Option<String>,
    pub orange: Option<String>,
    pub prod: Option<String>,
}

/// Test run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Name shown at the top of the header message
    pub suite_name: String,

    /// Target environment (LOCAL, ORANGE, PROD)
    pub test_env: String,

    pub base_urls: BaseUrls,

    /// Base URL for API tests
    pub api_base_url: Option<String>,

    pub graphql_path: String,

    /// Tag expression such as `smoke|regression`
    pub tags: Option<String>,

    /// Concurrent tests
    pub threads: usize,

    /// Projects to run; empty runs all of them
    pub projects: Vec<Project>,

    /// Where the run metadata file lives
    pub run_meta_path: PathBuf,

    /// Published HTML report, linked from the final summary
    pub report_url: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            suite_name: "End2End Test Suite".to_string(),
            test_env: "LOCAL".to_string(),
            base_urls: BaseUrls::default(),
            api_base_url: None,
            graphql_path: DEFAULT_GRAPHQL_PATH.to_string(),
            tags: None,
            threads: 4,
            projects: Vec::new(),
            run_meta_path: PathBuf::from(DEFAULT_RUN_META_FILE),
            report_url: None,
        }
    }
}

impl RunConfig {
    /// Base URL for the configured environment.
    ///
    /// Fails fast naming the variable to set, since a browser run without a
    /// target cannot do anything useful.
    pub fn base_url(&self) -> Result<String> {
        let env = self.test_env.to_ascii_uppercase();
        let (value, var) = match env.as_str() {
            "PROD" => (&self.base_urls.prod, "BASE_URL_PROD"),
            "ORANGE" => (&self.base_urls.orange, "BASE_URL_ORANGE"),
            _ => (&self.base_urls.local, "BASE_URL_LOCAL"),
        };
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::MissingEnv {
                var: var.to_string(),
                hint: format!("no base URL for TEST_ENV={}", env),
            })
    }

    /// API base URL with `localhost` pinned to IPv4
    pub fn api_base_url(&self) -> Result<String> {
        self.api_base_url
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| v.replace("localhost", "127.0.0.1"))
            .ok_or_else(|| Error::MissingEnv {
                var: "API_BASE_URL".to_string(),
                hint: "required for api tests".to_string(),
            })
    }

    /// Projects selected for this run
    pub fn selected_projects(&self) -> Vec<Project> {
        if self.projects.is_empty() {
            Project::ALL.to_vec()
        } else {
            self.projects.clone()
        }
    }
}

/// Notification queue timings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Delay coalescing bursts of enqueues into one flush pass
    pub debounce_ms: u64,

    /// Delay before retrying when the run thread is not known yet
    pub retry_backoff_ms: u64,

    /// Consecutive unresolved attempts before a warning is logged
    pub retry_warn_after: u32,

    /// Upper bound on how long shutdown waits for the destination
    pub drain_timeout_ms: u64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            retry_backoff_ms: 150,
            retry_warn_after: 40,
            drain_timeout_ms: 10_000,
        }
    }
}

impl FlushConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Parse a comma separated project list; blank means "all"
pub fn parse_projects(raw: &str) -> Result<Vec<Project>> {
    let mut projects = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match Project::parse(name) {
            Some(p) if !projects.contains(&p) => projects.push(p),
            Some(_) => {}
            None => {
                return Err(Error::UnknownProject {
                    requested: raw.to_string(),
                    valid: Project::ALL.iter().map(Project::as_str).collect::<Vec<_>>().join(", "),
                })
            }
        }
    }
    Ok(projects)
}

impl RelayConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Load the file and apply process environment on top
    pub fn from_file_and_env(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DISCORD_BOT_TOKEN") {
            self.discord.bot_token = Some(v);
        }
        if let Some(v) = get("DISCORD_CHANNEL_ID") {
            self.discord.channel_id = Some(v);
        }
        if let Some(v) = get("DISCORD_API_BASE") {
            self.discord.api_base = v;
        }
        if let Some(v) = get("DISCORD_LOG_PASSED") {
            self.discord.log_passed = v.trim() == "1";
        }

        if let Some(v) = get("TEST_ENV") {
            self.run.test_env = v.trim().to_ascii_uppercase();
        }
        if let Some(v) = get("BASE_URL_LOCAL") {
            self.run.base_urls.local = Some(v);
        }
        if let Some(v) = get("BASE_URL_ORANGE") {
            self.run.base_urls.orange = Some(v);
        }
        if let Some(v) = get("BASE_URL_PROD") {
            self.run.base_urls.prod = Some(v);
        }
        if let Some(v) = get("API_BASE_URL") {
            self.run.api_base_url = Some(v);
        }
        if let Some(v) = get("GRAPHQL_PATH") {
            self.run.graphql_path = v;
        }
        if let Some(v) = get("TAGS") {
            self.run.tags = Some(v.trim().to_string());
        }
        if let Some(v) = get("THREADS") {
            self.run.threads = v.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("THREADS must be a positive integer, got {:?}", v))
            })?;
        }
        if let Some(v) = get("PROJECT").or_else(|| get("PROJECTS")) {
            self.run.projects = parse_projects(&v)?;
        }
        if let Some(v) = get("RUN_META_PATH") {
            self.run.run_meta_path = PathBuf::from(v);
        }
        if let Some(v) = get("REPORT_URL") {
            self.run.report_url = Some(v);
        }

        self.validate()
    }

    /// Reject values the runner cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.run.threads == 0 {
            return Err(Error::InvalidConfig("threads must be at least 1".into()));
        }
        if self.flush.debounce_ms == 0 && self.flush.retry_backoff_ms == 0 {
            return Err(Error::InvalidConfig(
                "flush.debounce_ms and flush.retry_backoff_ms cannot both be zero".into(),
            ));
        }
        Ok(())
    }
}
