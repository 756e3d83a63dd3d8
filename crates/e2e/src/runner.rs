//! Test runner: selects specs, runs them concurrently and reports each
//! result to the run header and thread

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use testrelay_common::snippet::short_error;
use testrelay_common::{Project, RunConfig, TestOutcome};
use testrelay_reporter::{FailureReport, ReportContext, TestScope};
use tracing::{debug, error, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::graphql::GraphqlClient;
use crate::playwright::{screenshot_path, BrowserDriver, BrowserRun, StepResult};
use crate::spec::{Action, TagFilter, TestSpec};
use crate::timeouts;

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub project: Project,
    pub outcome: TestOutcome,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
    pub screenshot: Option<PathBuf>,
}

impl TestResult {
    fn new(spec: &TestSpec, outcome: TestOutcome) -> Self {
        Self {
            name: spec.name.clone(),
            project: spec.project,
            outcome,
            duration_ms: 0,
            steps: Vec::new(),
            error: None,
            screenshot: None,
        }
    }
}

/// Result of running all tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    /// Thread notifications that could not be delivered before exit
    pub undelivered_notifications: usize,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    fn from_results(results: Vec<TestResult>, duration_ms: u64) -> Self {
        let count = |f: fn(TestOutcome) -> bool| results.iter().filter(|r| f(r.outcome)).count();
        Self {
            total: results.len(),
            passed: count(|o| o == TestOutcome::Passed),
            failed: count(TestOutcome::is_failure),
            skipped: count(|o| o == TestOutcome::Skipped),
            duration_ms,
            undelivered_notifications: 0,
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub specs_dir: PathBuf,
    pub output_dir: PathBuf,
    pub screenshot_dir: PathBuf,
    pub threads: usize,
    pub tags: Option<String>,
    /// Empty selects every project
    pub projects: Vec<Project>,
    pub test_timeout: Duration,
    pub report_url: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            specs_dir: PathBuf::from("tests/specs"),
            output_dir: PathBuf::from("test-results"),
            screenshot_dir: PathBuf::from("screenshots"),
            threads: 4,
            tags: None,
            projects: Vec::new(),
            test_timeout: timeouts::TEST,
            report_url: None,
        }
    }
}

impl RunnerConfig {
    /// Runner settings taken from the run configuration
    pub fn from_run_config(run: &RunConfig, specs_dir: impl Into<PathBuf>) -> Self {
        Self {
            specs_dir: specs_dir.into(),
            threads: run.threads.max(1),
            tags: run.tags.clone(),
            projects: run.projects.clone(),
            report_url: run.report_url.clone(),
            ..Self::default()
        }
    }
}

/// Steps of one API test up to the first failing request
#[derive(Debug, Default)]
struct ApiRun {
    steps: Vec<StepResult>,
    errors: Vec<String>,
    /// `on_fail` text of the failing step
    reason: Option<String>,
}

/// Main test runner
pub struct TestRunner {
    config: RunnerConfig,
    ctx: Arc<ReportContext>,
    browser: Option<Arc<dyn BrowserDriver>>,
    graphql: Option<GraphqlClient>,
}

impl TestRunner {
    pub fn new(config: RunnerConfig, ctx: Arc<ReportContext>) -> Self {
        Self {
            config,
            ctx,
            browser: None,
            graphql: None,
        }
    }

    /// Driver for `e2e` tests
    pub fn with_browser(mut self, driver: Arc<dyn BrowserDriver>) -> Self {
        self.browser = Some(driver);
        self
    }

    /// Client for `api` tests
    pub fn with_graphql(mut self, client: GraphqlClient) -> Self {
        self.graphql = Some(client);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Keep specs of the selected projects that match the tag filter
    pub fn select(&self, specs: Vec<TestSpec>) -> E2eResult<Vec<TestSpec>> {
        let filter = match &self.config.tags {
            Some(expr) => TagFilter::parse(expr)?,
            None => None,
        };

        let mut selected = Vec::new();
        for spec in specs {
            spec.validate()?;
            let project_ok =
                self.config.projects.is_empty() || self.config.projects.contains(&spec.project);
            let tags_ok = filter.as_ref().map(|f| f.matches(&spec)).unwrap_or(true);
            if project_ok && tags_ok {
                selected.push(spec);
            } else {
                debug!("Filtered out '{}'", spec.name);
            }
        }
        Ok(selected)
    }

    /// Load specs from the specs directory and run the selected ones
    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.config.specs_dir)?;
        self.run_specs(specs).await
    }

    /// Run specs with the configured concurrency, then flush reporting
    pub async fn run_specs(&self, specs: Vec<TestSpec>) -> E2eResult<TestSuiteResult> {
        let start = Instant::now();
        let specs = self.select(specs)?;

        let needs = |project: Project| specs.iter().any(|s| s.project == project && !s.skip);
        if needs(Project::E2e) && self.browser.is_none() {
            return Err(E2eError::Playwright(
                "browser tests selected but no browser driver is configured".to_string(),
            ));
        }
        if needs(Project::Api) && self.graphql.is_none() {
            return Err(E2eError::Config(testrelay_common::Error::MissingEnv {
                var: "API_BASE_URL".to_string(),
                hint: "api tests need a GraphQL endpoint".to_string(),
            }));
        }

        info!(
            "Running {} test(s) on {} thread(s)...",
            specs.len(),
            self.config.threads
        );
        self.ctx.begin_run(specs.len() as u32).await;

        let mut indexed: Vec<(usize, TestResult)> = stream::iter(specs.iter().enumerate())
            .map(|(i, spec)| async move { (i, self.run_spec(spec).await) })
            .buffer_unordered(self.config.threads.max(1))
            .collect()
            .await;
        indexed.sort_by_key(|(i, _)| *i);
        let results = indexed.into_iter().map(|(_, r)| r).collect();

        let drain = self.ctx.shutdown(self.config.report_url.as_deref()).await;

        let mut suite = TestSuiteResult::from_results(results, start.elapsed().as_millis() as u64);
        suite.undelivered_notifications = drain.undelivered;

        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            suite.passed, suite.failed, suite.skipped, suite.duration_ms
        );
        if drain.undelivered > 0 {
            warn!("{} notification(s) were not delivered", drain.undelivered);
        }

        Ok(suite)
    }

    /// Run one spec and count it in the header
    pub async fn run_spec(&self, spec: &TestSpec) -> TestResult {
        let start = Instant::now();
        debug!("Running test: {}", spec.name);

        let mut result = if spec.skip {
            TestResult::new(spec, TestOutcome::Skipped)
        } else {
            match spec.project {
                Project::E2e => self.run_browser(spec).await,
                Project::Api => self.run_api(spec).await,
            }
        };
        result.duration_ms = start.elapsed().as_millis() as u64;

        match result.outcome {
            TestOutcome::Passed => info!("✓ {} ({} ms)", result.name, result.duration_ms),
            TestOutcome::Skipped => info!("- {} (skipped)", result.name),
            _ => error!(
                "✗ {} - {}",
                result.name,
                result.error.as_deref().unwrap_or("unknown error")
            ),
        }

        self.ctx.record_outcome(result.outcome).await;
        result
    }

    fn timeout_for(&self, spec: &TestSpec) -> Duration {
        spec.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.test_timeout)
    }

    /// Record the step's failure reason the way test code would
    fn abort(&self, scope: &TestScope<'_>, reason: &str) -> Option<String> {
        let abort = scope.mark_failed(reason);
        if abort.is_misuse() {
            error!("Test defect in '{}': {}", scope.title(), abort);
            None
        } else {
            debug!("{}", abort);
            abort.reason().map(str::to_string)
        }
    }

    async fn run_browser(&self, spec: &TestSpec) -> TestResult {
        let scope = self.ctx.test(&spec.name);
        let timeout = self.timeout_for(spec);

        let Some(driver) = &self.browser else {
            let mut result = TestResult::new(spec, TestOutcome::Failed);
            result.error = Some("no browser driver configured".to_string());
            return result;
        };

        let shot = screenshot_path(&self.config.screenshot_dir, &spec.name);
        let run = match driver.run(spec, &shot, timeout).await {
            Ok(run) => run,
            Err(e) => BrowserRun {
                raw_error: Some(e.to_string()),
                ..BrowserRun::default()
            },
        };

        if run.success() {
            scope.mark_passed(None);
            let mut result = TestResult::new(spec, TestOutcome::Passed);
            result.steps = run.steps;
            return result;
        }

        let outcome = if run.timed_out {
            TestOutcome::TimedOut
        } else {
            TestOutcome::Failed
        };

        let reason = run
            .failed_step()
            .and_then(|step| spec.steps.get(step.index))
            .and_then(|step| step.on_fail.as_deref())
            .and_then(|reason| self.abort(&scope, reason));

        let error = reason.or_else(|| {
            if run.timed_out {
                Some(format!("Test timed-out after {}s.", timeout.as_secs()))
            } else {
                run.raw_error.as_deref().map(short_error)
            }
        });

        self.ctx.report_failure(FailureReport {
            title: spec.name.clone(),
            outcome,
            raw_error: run.raw_error.clone(),
            timeout: Some(timeout),
            screenshot: run.screenshot.clone(),
        });

        let mut result = TestResult::new(spec, outcome);
        result.steps = run.steps;
        result.screenshot = run.screenshot;
        result.error = error;
        result
    }

    async fn run_api(&self, spec: &TestSpec) -> TestResult {
        let scope = self.ctx.test(&spec.name);
        let timeout = self.timeout_for(spec);

        let Some(client) = &self.graphql else {
            let mut result = TestResult::new(spec, TestOutcome::Failed);
            result.error = Some("no GraphQL endpoint configured".to_string());
            return result;
        };

        let (run, outcome) =
            match tokio::time::timeout(timeout, self.api_steps(spec, client, &scope)).await {
                Ok(run) if run.errors.is_empty() => (run, TestOutcome::Passed),
                Ok(run) => (run, TestOutcome::Failed),
                Err(_) => (
                    ApiRun {
                        errors: vec![format!("Test timed-out after {}s.", timeout.as_secs())],
                        ..ApiRun::default()
                    },
                    TestOutcome::TimedOut,
                ),
            };

        let mut result = TestResult::new(spec, outcome);
        result.steps = run.steps;

        if outcome == TestOutcome::Passed {
            scope.mark_passed(None);
        } else {
            self.ctx.report_api_failure(&spec.name, &run.errors);
            result.error = run
                .reason
                .or_else(|| run.errors.first().map(|e| short_error(e)));
        }
        result
    }

    async fn api_steps(
        &self,
        spec: &TestSpec,
        client: &GraphqlClient,
        scope: &TestScope<'_>,
    ) -> ApiRun {
        let mut run = ApiRun::default();

        for (index, step) in spec.steps.iter().enumerate() {
            match &step.action {
                Action::Graphql(request) => {
                    let failures = client.run_step(request).await;
                    run.steps.push(StepResult {
                        index,
                        step_name: step.action.label(),
                        success: failures.is_empty(),
                        error: failures.first().map(|e| short_error(e)),
                    });
                    if !failures.is_empty() {
                        run.reason = step
                            .on_fail
                            .as_deref()
                            .and_then(|reason| self.abort(scope, reason));
                        run.errors.extend(failures);
                        break;
                    }
                }
                Action::Log { message } => info!("[TEST LOG] {}", message),
                _ => {}
            }
        }

        run
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
