//! Playwright browser automation
//!
//! Each browser test becomes one Node script. Every step runs inside a
//! guarded wrapper that prints a JSON event line, so the Rust side learns
//! which step failed and with what error without parsing Playwright output.
//! On the first failure the script takes a screenshot and stops.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use testrelay_common::snippet::short_error;
use tokio::process::Command as TokioCommand;
use tracing::{debug, warn};

use crate::error::{E2eError, E2eResult};
use crate::spec::{js_str, Action, TestSpec};
use crate::timeouts;

/// Prefix of event lines printed by generated scripts
pub const EVENT_PREFIX: &str = "@@testrelay ";

/// Longest sanitized title kept in screenshot names
const SCREENSHOT_TITLE_LIMIT: usize = 120;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Some(Browser::Chromium),
            "firefox" => Some(Browser::Firefox),
            "webkit" | "safari" => Some(Browser::Webkit),
            _ => None,
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub screenshot_dir: PathBuf,
    pub browser: Browser,
    pub headless: bool,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            screenshot_dir: PathBuf::from("screenshots"),
            browser: Browser::Chromium,
            headless: true,
        }
    }
}

/// Result of executing a test step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub step_name: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Everything a browser run reports back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserRun {
    pub steps: Vec<StepResult>,
    pub screenshot: Option<PathBuf>,
    pub timed_out: bool,
    /// Full error text of the failing step, or of the script itself
    pub raw_error: Option<String>,
    pub duration_ms: u64,
}

impl BrowserRun {
    pub fn success(&self) -> bool {
        !self.timed_out && self.raw_error.is_none() && self.steps.iter().all(|s| s.success)
    }

    /// First failed step
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.success)
    }
}

/// Runs a browser test spec
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn run(
        &self,
        spec: &TestSpec,
        screenshot_path: &Path,
        timeout: Duration,
    ) -> E2eResult<BrowserRun>;
}

/// Event line printed by the generated script
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ScriptEvent {
    Step {
        index: usize,
        ok: bool,
        #[serde(default)]
        error: Option<String>,
    },
    Screenshot {
        path: String,
    },
    ScreenshotFailed {
        error: String,
    },
}

/// Replace anything outside `[A-Za-z0-9-_]` and cap the length
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(SCREENSHOT_TITLE_LIMIT)
        .collect()
}

/// `{dir}/{timestamp}__{sanitized title}.png`
pub fn screenshot_path(dir: &Path, title: &str) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
    dir.join(format!("{}__{}.png", stamp, sanitize_title(title)))
}

/// Playwright-backed driver
pub struct PlaywrightDriver {
    config: PlaywrightConfig,
}

impl PlaywrightDriver {
    /// Create a driver, failing early when Playwright is missing
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;
        std::fs::create_dir_all(&config.screenshot_dir)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }

    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Build the Node script for a whole spec
    pub fn build_script(&self, spec: &TestSpec, screenshot_path: &Path) -> String {
        build_script(&self.config, spec, screenshot_path)
    }
}

pub fn build_script(config: &PlaywrightConfig, spec: &TestSpec, screenshot_path: &Path) -> String {
    let mut script = String::new();

    script.push_str(&format!(
        r#"const {{ chromium, firefox, webkit }} = require('playwright');

const report = (event) => console.log({prefix} + JSON.stringify(event));
const modifier = process.platform === 'darwin' ? 'Meta' : 'Control';

async function step(index, run) {{
  try {{
    await run();
    report({{ event: 'step', index, ok: true }});
  }} catch (error) {{
    report({{ event: 'step', index, ok: false, error: String((error && error.message) || error) }});
    throw error;
  }}
}}

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
  const page = await context.newPage();
  const baseUrl = {base_url};

  try {{
"#,
        prefix = js_str(EVENT_PREFIX),
        browser = config.browser.as_str(),
        headless = config.headless,
        width = spec.viewport.width,
        height = spec.viewport.height,
        base_url = js_str(config.base_url.trim_end_matches('/')),
    ));

    for (i, step) in spec.steps.iter().enumerate() {
        script.push_str(&format!(
            "    // Step {}: {}\n",
            i + 1,
            step.action.label().replace(['\n', '\r'], " ")
        ));
        script.push_str(&format!("    await step({}, async () => {{\n", i));
        script.push_str(&action_to_js(&step.action));
        script.push_str("\n    });\n");
    }

    script.push_str(&format!(
        r#"  }} catch (error) {{
    try {{
      await page.screenshot({{ path: {shot} }});
      report({{ event: 'screenshot', path: {shot} }});
    }} catch (shotError) {{
      report({{ event: 'screenshot_failed', error: String(shotError) }});
    }}
    process.exitCode = 1;
  }} finally {{
    await browser.close();
  }}
}})();
"#,
        shot = js_str(&screenshot_path.to_string_lossy()),
    ));

    script
}

/// JavaScript for one action, run inside a step wrapper
fn action_to_js(action: &Action) -> String {
    match action {
        Action::Navigate { url, timeout } => {
            let target = if url.starts_with("http://") || url.starts_with("https://") {
                js_str(url)
            } else {
                format!("baseUrl + {}", js_str(url))
            };
            format!(
                "      await page.goto({}, {{ timeout: {}, waitUntil: 'load' }});",
                target,
                timeout.as_millis()
            )
        }
        Action::Click { target, timeout } => format!(
            "      const el = {};\n      await el.waitFor({{ state: 'visible', timeout: {t} }});\n      await el.click({{ timeout: {t} }});",
            target.to_js(),
            t = timeout.as_millis()
        ),
        Action::Input {
            target,
            value,
            timeout,
        } => format!(
            "      const el = {};\n      await el.waitFor({{ state: 'visible', timeout: {t} }});\n      await el.click({{ timeout: {t} }});\n      await page.keyboard.press(modifier + '+A');\n      await page.keyboard.press('Backspace');\n      await el.pressSequentially({}, {{ delay: {} }});",
            target.to_js(),
            js_str(value),
            timeouts::TYPE_DELAY.as_millis(),
            t = timeout.as_millis()
        ),
        Action::Hover { target, timeout } => format!(
            "      const el = {};\n      await el.waitFor({{ state: 'visible', timeout: {t} }});\n      await el.hover({{ timeout: {t} }});",
            target.to_js(),
            t = timeout.as_millis()
        ),
        Action::WaitVisible { target, timeout } => format!(
            "      await {}.waitFor({{ state: 'visible', timeout: {} }});",
            target.to_js(),
            timeout.as_millis()
        ),
        Action::WaitUrl { url, timeout } => format!(
            "      const fragment = {};\n      await page.waitForURL((u) => u.toString().includes(fragment), {{ timeout: {} }});",
            js_str(url),
            timeout.as_millis()
        ),
        Action::Assert {
            target,
            text,
            text_contains,
            count,
            timeout,
        } => {
            let mut lines = vec![format!("      const el = {};", target.to_js())];
            if let Some(expected) = count {
                lines.push(format!(
                    "      const count = await el.count();\n      if (count !== {n}) throw new Error('Error: expect(locator).toHaveCount(expected)\\nExpected: {n}\\nReceived: ' + count);",
                    n = expected
                ));
            } else {
                lines.push(format!(
                    "      await el.first().waitFor({{ state: 'visible', timeout: {} }});",
                    timeout.as_millis()
                ));
            }
            if let Some(expected) = text {
                lines.push(format!(
                    "      const text = (await el.first().innerText()).trim();\n      if (text !== {e}) throw new Error('Error: expect(locator).toHaveText(expected)\\nExpected: ' + JSON.stringify({e}) + '\\nReceived: ' + JSON.stringify(text));",
                    e = js_str(expected)
                ));
            }
            if let Some(expected) = text_contains {
                lines.push(format!(
                    "      const content = await el.first().innerText();\n      if (!content.includes({e})) throw new Error('Error: expect(locator).toContainText(expected)\\nExpected: ' + JSON.stringify({e}) + '\\nReceived: ' + JSON.stringify(content));",
                    e = js_str(expected)
                ));
            }
            lines.join("\n")
        }
        Action::Screenshot { name } => format!(
            "      await page.screenshot({{ path: {}, fullPage: true }});",
            js_str(&format!("screenshots/{}.png", sanitize_title(name)))
        ),
        Action::Log { message } => format!("      console.log({});", js_str(&format!("[TEST] {}", message))),
        Action::Graphql(_) => {
            "      throw new Error('graphql steps are not supported in browser tests');".to_string()
        }
    }
}

/// Parse event lines out of script stdout
fn parse_events(stdout: &str) -> Vec<ScriptEvent> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix(EVENT_PREFIX))
        .filter_map(|json| match serde_json::from_str::<ScriptEvent>(json) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!("Ignoring malformed script event: {}", e);
                None
            }
        })
        .collect()
}

/// Fold script output into a run result
pub fn collect_run(spec: &TestSpec, stdout: &str, stderr: &str, exit_ok: bool) -> BrowserRun {
    let mut run = BrowserRun::default();

    for event in parse_events(stdout) {
        match event {
            ScriptEvent::Step { index, ok, error } => {
                let step_name = spec
                    .steps
                    .get(index)
                    .map(|s| s.action.label())
                    .unwrap_or_else(|| format!("step-{}", index));
                if !ok {
                    run.raw_error = error.clone();
                }
                run.steps.push(StepResult {
                    index,
                    step_name,
                    success: ok,
                    error: error.map(|e| short_error(&e)),
                });
            }
            ScriptEvent::Screenshot { path } => run.screenshot = Some(PathBuf::from(path)),
            ScriptEvent::ScreenshotFailed { error } => {
                warn!("Failure screenshot not captured: {}", short_error(&error));
            }
        }
    }

    if !exit_ok && run.raw_error.is_none() {
        let stderr = stderr.trim();
        run.raw_error = Some(if stderr.is_empty() {
            "Playwright script exited with an error".to_string()
        } else {
            stderr.to_string()
        });
    }

    run
}

#[async_trait]
impl BrowserDriver for PlaywrightDriver {
    async fn run(
        &self,
        spec: &TestSpec,
        screenshot_path: &Path,
        timeout: Duration,
    ) -> E2eResult<BrowserRun> {
        let start = Instant::now();
        if let Some(parent) = screenshot_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("test.js");
        tokio::fs::write(&script_path, self.build_script(spec, screenshot_path)).await?;

        debug!("Running Playwright script for '{}': {}", spec.name, script_path.display());

        let child = TokioCommand::new("node")
            .arg(&script_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut run = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                collect_run(
                    spec,
                    &String::from_utf8_lossy(&output.stdout),
                    &String::from_utf8_lossy(&output.stderr),
                    output.status.success(),
                )
            }
            Err(_) => {
                warn!("'{}' exceeded {}s", spec.name, timeout.as_secs());
                BrowserRun {
                    timed_out: true,
                    ..BrowserRun::default()
                }
            }
        };

        if run.screenshot.is_none() && screenshot_path.exists() {
            run.screenshot = Some(screenshot_path.to_path_buf());
        }
        run.duration_ms = start.elapsed().as_millis() as u64;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TestSpec {
        TestSpec::from_yaml(
            r#"
name: "login: happy path"
steps:
  - action: navigate
    url: /login
  - action: input
    target: { placeholder: "Email" }
    value: "o'brien@example.com"
  - action: click
    target: "button[type=submit]"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("login: happy path"), "login__happy_path");
        assert_eq!(sanitize_title(&"x".repeat(300)).len(), 120);
    }

    #[test]
    fn test_screenshot_path_shape() {
        let path = screenshot_path(Path::new("screenshots"), "a b");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("__a_b.png"));
        assert!(path.starts_with("screenshots"));
    }

    #[test]
    fn test_script_wraps_every_step() {
        let script = build_script(
            &PlaywrightConfig::default(),
            &spec(),
            Path::new("screenshots/shot.png"),
        );
        assert!(script.contains("await step(0, async () => {"));
        assert!(script.contains("await step(2, async () => {"));
        assert!(script.contains(r#"page.getByPlaceholder("Email")"#));
        assert!(script.contains(r#"pressSequentially("o'brien@example.com", { delay: 15 })"#));
        assert!(script.contains(r#"baseUrl + "/login""#));
        assert!(script.contains(r#"page.screenshot({ path: "screenshots/shot.png" })"#));
        assert!(!script.contains("fullPage"));
        assert!(script.contains("waitUntil: 'load'"));
    }

    #[test]
    fn test_collect_run_reports_failed_step() {
        let stdout = format!(
            "{p}{{\"event\":\"step\",\"index\":0,\"ok\":true}}\nnoise\n{p}{{\"event\":\"step\",\"index\":1,\"ok\":false,\"error\":\"Timeout 15000ms exceeded.\\nCall log: ...\"}}\n{p}{{\"event\":\"screenshot\",\"path\":\"screenshots/x.png\"}}\n",
            p = EVENT_PREFIX
        );
        let run = collect_run(&spec(), &stdout, "", false);

        assert!(!run.success());
        assert_eq!(run.steps.len(), 2);
        let failed = run.failed_step().unwrap();
        assert_eq!(failed.index, 1);
        assert_eq!(failed.error.as_deref(), Some("Timeout 15000ms exceeded."));
        assert_eq!(
            run.raw_error.as_deref(),
            Some("Timeout 15000ms exceeded.\nCall log: ...")
        );
        assert_eq!(run.screenshot, Some(PathBuf::from("screenshots/x.png")));
    }

    #[test]
    fn test_collect_run_uses_stderr_when_script_dies() {
        let run = collect_run(&spec(), "", "Cannot find module 'playwright'", false);
        assert_eq!(run.raw_error.as_deref(), Some("Cannot find module 'playwright'"));
        assert!(!run.success());
    }

    #[test]
    fn test_collect_run_success() {
        let stdout = format!("{}{{\"event\":\"step\",\"index\":0,\"ok\":true}}", EVENT_PREFIX);
        assert!(collect_run(&spec(), &stdout, "", true).success());
    }
}
