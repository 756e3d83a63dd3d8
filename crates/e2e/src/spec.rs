//! Declarative YAML test specification

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use testrelay_common::Project;

use crate::error::{E2eError, E2eResult};
use crate::graphql::GraphqlStep;
use crate::timeouts::Budget;

/// A complete test specification parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name, also the test title in notifications
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Browser (`e2e`) or API (`api`) test
    #[serde(default)]
    pub project: Project,

    /// Tags for filtering tests
    #[serde(default)]
    pub tags: Vec<String>,

    /// Viewport size for the browser
    #[serde(default = "default_viewport")]
    pub viewport: Viewport,

    /// Counted as skipped without running
    #[serde(default)]
    pub skip: bool,

    /// Override of the whole-test timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Steps to execute in order
    pub steps: Vec<Step>,
}

fn default_viewport() -> Viewport {
    Viewport {
        width: 1280,
        height: 720,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// One step plus the reason reported if it fails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,

    /// Human failure reason passed to `mark_failed`
    #[serde(default)]
    pub on_fail: Option<String>,
}

/// What a step does
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Open a URL (relative to the base URL)
    Navigate {
        url: String,
        #[serde(default)]
        timeout: Budget,
    },

    /// Wait until visible, then click
    Click {
        target: Target,
        #[serde(default)]
        timeout: Budget,
    },

    /// Replace the content of a field by typing
    Input {
        target: Target,
        value: String,
        #[serde(default)]
        timeout: Budget,
    },

    Hover {
        target: Target,
        #[serde(default)]
        timeout: Budget,
    },

    WaitVisible {
        target: Target,
        #[serde(default)]
        timeout: Budget,
    },

    /// Wait until the page URL contains `url`
    WaitUrl {
        url: String,
        #[serde(default)]
        timeout: Budget,
    },

    /// Check an element's text or count
    Assert {
        target: Target,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        text_contains: Option<String>,
        #[serde(default)]
        count: Option<usize>,
        #[serde(default)]
        timeout: Budget,
    },

    Screenshot {
        name: String,
    },

    /// GraphQL request with expectations on the response
    Graphql(GraphqlStep),

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

impl Action {
    /// Short label for logs and results
    pub fn label(&self) -> String {
        match self {
            Action::Navigate { url, .. } => format!("navigate:{}", url),
            Action::Click { target, .. } => format!("click:{}", target),
            Action::Input { target, .. } => format!("input:{}", target),
            Action::Hover { target, .. } => format!("hover:{}", target),
            Action::WaitVisible { target, .. } => format!("wait_visible:{}", target),
            Action::WaitUrl { url, .. } => format!("wait_url:{}", url),
            Action::Assert { target, .. } => format!("assert:{}", target),
            Action::Screenshot { name } => format!("screenshot:{}", name),
            Action::Graphql(step) => format!(
                "graphql:{}",
                step.operation_name.as_deref().unwrap_or("anonymous")
            ),
            Action::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }

    fn is_browser_action(&self) -> bool {
        !matches!(self, Action::Graphql(_) | Action::Log { .. })
    }
}

/// Element to act on: a raw selector or a semantic locator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Selector(String),
    Locator(Locator),
}

/// Playwright semantic locators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Locator {
    Role {
        role: String,
        #[serde(default)]
        name: Option<String>,
    },
    TestId {
        test_id: String,
    },
    Label {
        label: String,
    },
    Placeholder {
        placeholder: String,
    },
    Text {
        text: String,
    },
}

/// Quote a string as a JavaScript literal
pub(crate) fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

impl Target {
    /// Playwright locator expression rooted at `page`
    pub fn to_js(&self) -> String {
        match self {
            Target::Selector(selector) => format!("page.locator({})", js_str(selector)),
            Target::Locator(Locator::Role { role, name }) => match name {
                Some(name) => format!(
                    "page.getByRole({}, {{ name: {} }})",
                    js_str(role),
                    js_str(name)
                ),
                None => format!("page.getByRole({})", js_str(role)),
            },
            Target::Locator(Locator::TestId { test_id }) => {
                format!("page.getByTestId({})", js_str(test_id))
            }
            Target::Locator(Locator::Label { label }) => {
                format!("page.getByLabel({})", js_str(label))
            }
            Target::Locator(Locator::Placeholder { placeholder }) => {
                format!("page.getByPlaceholder({})", js_str(placeholder))
            }
            Target::Locator(Locator::Text { text }) => {
                format!("page.getByText({})", js_str(text))
            }
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Selector(s) => write!(f, "{}", s),
            Target::Locator(Locator::Role { role, name: Some(name) }) => {
                write!(f, "role={}[name={}]", role, name)
            }
            Target::Locator(Locator::Role { role, name: None }) => write!(f, "role={}", role),
            Target::Locator(Locator::TestId { test_id }) => write!(f, "testid={}", test_id),
            Target::Locator(Locator::Label { label }) => write!(f, "label={}", label),
            Target::Locator(Locator::Placeholder { placeholder }) => {
                write!(f, "placeholder={}", placeholder)
            }
            Target::Locator(Locator::Text { text }) => write!(f, "text={}", text),
        }
    }
}

impl TestSpec {
    /// Parse a test spec from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a test spec from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let spec: Self = serde_yaml::from_str(&content).map_err(|e| E2eError::SpecParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load all test specs below a directory, in path order
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();
        let mut seen = HashSet::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let spec = Self::from_file(entry.path())?;
            if !seen.insert(spec.name.clone()) {
                return Err(E2eError::DuplicateSpec(spec.name));
            }
            specs.push(spec);
        }

        Ok(specs)
    }

    /// Reject specs that mix browser and API steps or have nothing to do
    pub fn validate(&self) -> E2eResult<()> {
        let invalid = |reason: &str| E2eError::SpecInvalid {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.steps.is_empty() {
            return Err(invalid("at least one step is required"));
        }
        match self.project {
            Project::Api if self.steps.iter().any(|s| s.action.is_browser_action()) => {
                Err(invalid("api tests may only use graphql and log steps"))
            }
            Project::E2e
                if self
                    .steps
                    .iter()
                    .any(|s| matches!(s.action, Action::Graphql(_))) =>
            {
                Err(invalid("graphql steps belong to api tests"))
            }
            _ => Ok(()),
        }
    }

    /// Name and tags, the text a tag filter is matched against
    pub fn tag_haystack(&self) -> String {
        std::iter::once(self.name.as_str())
            .chain(self.tags.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Whole-token, case-insensitive tag filter.
///
/// `smoke|regression` matches a test tagged `@smoke` or named
/// `checkout @regression`, but not one tagged `smoke-extended`.
#[derive(Debug, Clone)]
pub struct TagFilter {
    pattern: Regex,
    tokens: Vec<String>,
}

impl TagFilter {
    /// Parse a filter expression; blank means no filtering
    pub fn parse(expr: &str) -> E2eResult<Option<Self>> {
        let cleaned = expr.trim();
        let cleaned = cleaned
            .strip_prefix('/')
            .and_then(|s| s.rfind('/').map(|end| &s[..end]))
            .unwrap_or(cleaned);
        let cleaned = cleaned.replace("(?:", "").replace(['(', ')'], "");

        let tokens: Vec<String> = cleaned
            .split(['|', ','])
            .map(|t| t.trim().trim_start_matches('@').to_string())
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.is_empty() {
            return Ok(None);
        }

        let alternatives = tokens
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"(?i)(?:^|\s)@?(?:{})(?:\s|$)", alternatives))
            .map_err(|_| E2eError::TagFilter(expr.to_string()))?;

        Ok(Some(Self { pattern, tokens }))
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn matches(&self, spec: &TestSpec) -> bool {
        self.pattern.is_match(&spec.tag_haystack())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_browser_spec() {
        let yaml = r##"
name: login-flow
description: Sign in with a valid account
tags:
  - "@smoke"
steps:
  - action: navigate
    url: /login
  - action: input
    target: "#email"
    value: user@example.com
  - action: click
    target:
      role: button
      name: Sign in
    on_fail: Sign in button never appeared
  - action: wait_url
    url: /dashboard
    timeout: long
"##;
        let spec = TestSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.project, Project::E2e);
        assert_eq!(spec.steps.len(), 4);
        assert!(spec.validate().is_ok());

        match &spec.steps[2].action {
            Action::Click { target, timeout } => {
                assert_eq!(
                    target,
                    &Target::Locator(Locator::Role {
                        role: "button".to_string(),
                        name: Some("Sign in".to_string())
                    })
                );
                assert_eq!(*timeout, Budget::Standard);
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(
            spec.steps[2].on_fail.as_deref(),
            Some("Sign in button never appeared")
        );
    }

    #[test]
    fn test_parse_api_spec() {
        let yaml = r#"
name: pharmacies query
project: api
steps:
  - action: graphql
    operation_name: Pharmacies
    query: "query Pharmacies { pharmacies { id } }"
    expect:
      - path: data.pharmacies
        exists: true
"#;
        let spec = TestSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.project, Project::Api);
        assert!(spec.validate().is_ok());
        assert_eq!(spec.steps[0].action.label(), "graphql:Pharmacies");
    }

    #[test]
    fn test_mixed_projects_are_rejected() {
        let yaml = r##"
name: confused
project: api
steps:
  - action: click
    target: "#go"
"##;
        let spec = TestSpec::from_yaml(yaml).unwrap();
        assert!(matches!(spec.validate(), Err(E2eError::SpecInvalid { .. })));
    }

    #[test]
    fn test_target_to_js_quotes_safely() {
        let target = Target::Selector("button[title='it\"s']".to_string());
        assert_eq!(target.to_js(), r#"page.locator("button[title='it\"s']")"#);

        let target = Target::Locator(Locator::TestId {
            test_id: "save".to_string(),
        });
        assert_eq!(target.to_js(), r#"page.getByTestId("save")"#);
    }

    fn spec_named(name: &str, tags: &[&str]) -> TestSpec {
        TestSpec {
            name: name.to_string(),
            description: String::new(),
            project: Project::E2e,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            viewport: default_viewport(),
            skip: false,
            timeout_ms: None,
            steps: vec![],
        }
    }

    #[test]
    fn test_tag_filter_matches_whole_tokens() {
        let filter = TagFilter::parse("smoke|regression").unwrap().unwrap();
        assert!(filter.matches(&spec_named("login", &["@smoke"])));
        assert!(filter.matches(&spec_named("checkout @REGRESSION", &[])));
        assert!(!filter.matches(&spec_named("login", &["smoke-extended"])));
        assert!(!filter.matches(&spec_named("smokes", &[])));
    }

    #[test]
    fn test_tag_filter_accepts_grep_syntax() {
        let filter = TagFilter::parse("/(?:@smoke|@samples)/i").unwrap().unwrap();
        assert_eq!(filter.tokens(), ["smoke", "samples"]);
        assert!(TagFilter::parse("  ").unwrap().is_none());
    }

    #[test]
    fn test_load_all_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let body = "name: same\nsteps:\n  - action: log\n    message: hi\n";
        std::fs::write(dir.path().join("a.yaml"), body).unwrap();
        std::fs::write(dir.path().join("b.yml"), body).unwrap();

        let err = TestSpec::load_all(dir.path()).unwrap_err();
        assert!(matches!(err, E2eError::DuplicateSpec(name) if name == "same"));
    }
}
