//! Runner flow with a scripted browser driver, in-memory chat and a mocked
//! GraphQL endpoint

use async_trait::async_trait;
use httpmock::prelude::*;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use testrelay_common::{FlushConfig, Project, RunMetadata, TestOutcome};
use testrelay_e2e::playwright::StepResult;
use testrelay_e2e::{
    BrowserDriver, BrowserRun, E2eError, E2eResult, GraphqlClient, RunnerConfig, TestRunner,
    TestSpec,
};
use testrelay_reporter::{MemoryChatClient, ReportContext, StaticDestination};

/// Fails the spec named `checkout` at its second step
struct ScriptedDriver;

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn run(
        &self,
        spec: &TestSpec,
        _screenshot_path: &Path,
        _timeout: Duration,
    ) -> E2eResult<BrowserRun> {
        let fail_at = (spec.name == "checkout").then_some(1);
        let steps = spec
            .steps
            .iter()
            .enumerate()
            .take_while(|(i, _)| fail_at.map(|f| *i <= f).unwrap_or(true))
            .map(|(index, step)| StepResult {
                index,
                step_name: step.action.label(),
                success: Some(index) != fail_at,
                error: (Some(index) == fail_at).then(|| "locator not found".to_string()),
            })
            .collect();

        Ok(BrowserRun {
            steps,
            raw_error: fail_at.map(|_| {
                "\u{1b}[31mError: locator not found\u{1b}[39m\n    at checkout.spec".to_string()
            }),
            ..BrowserRun::default()
        })
    }
}

fn browser_spec(name: &str, tags: &[&str]) -> TestSpec {
    let tags: Vec<String> = tags.iter().map(|t| format!("{:?}", t)).collect();
    TestSpec::from_yaml(&format!(
        r##"
name: "{name}"
tags: [{tags}]
steps:
  - action: navigate
    url: /
  - action: click
    target: "#buy"
    on_fail: cart empty
"##,
        tags = tags.join(", ")
    ))
    .unwrap()
}

fn context(chat: &Arc<MemoryChatClient>) -> Arc<ReportContext> {
    let destination = StaticDestination::new(Some(RunMetadata {
        thread_id: "thr".to_string(),
        channel_id: "chan".to_string(),
        header_message_id: "head".to_string(),
        suite_label: "Suite: LOCAL | all".to_string(),
    }));
    let flush = FlushConfig {
        debounce_ms: 5,
        retry_backoff_ms: 5,
        ..FlushConfig::default()
    };
    Arc::new(ReportContext::new(
        chat.clone(),
        Arc::new(destination),
        flush,
        false,
    ))
}

#[tokio::test]
async fn test_browser_failures_reach_thread_and_header() {
    let chat = Arc::new(MemoryChatClient::new());
    let dir = tempfile::tempdir().unwrap();
    let config = RunnerConfig {
        output_dir: dir.path().join("test-results"),
        screenshot_dir: dir.path().join("screenshots"),
        threads: 2,
        report_url: Some("https://report.example/1".to_string()),
        ..RunnerConfig::default()
    };

    let mut skipped = browser_spec("later", &[]);
    skipped.skip = true;
    let specs = vec![
        browser_spec("login", &["@smoke"]),
        browser_spec("checkout", &["@smoke"]),
        skipped,
    ];

    let runner = TestRunner::new(config, context(&chat)).with_browser(Arc::new(ScriptedDriver));
    let suite = runner.run_specs(specs).await.unwrap();

    assert_eq!(suite.total, 3);
    assert_eq!((suite.passed, suite.failed, suite.skipped), (1, 1, 1));
    assert_eq!(suite.undelivered_notifications, 0);
    assert_eq!(suite.results[1].name, "checkout");
    assert_eq!(suite.results[1].error.as_deref(), Some("cart empty"));

    let posts = chat.posts();
    assert_eq!(posts.len(), 1);
    assert!(posts[0].content.starts_with("❌ checkout\nReason: cart empty"));
    assert!(posts[0].attachment.is_none());

    let edits = chat.edits();
    let last = edits.last().unwrap();
    assert!(last.content.contains("Tests completed ✅ 100% [3/3]"));
    assert_eq!(
        last.embeds.as_ref().unwrap()[0],
        "🔗 [Playwright HTML report is here](https://report.example/1)"
    );

    let path = runner.write_results(&suite).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written["failed"], 1);
    assert_eq!(written["results"][2]["outcome"], json!(suite.results[2].outcome));
}

#[tokio::test]
async fn test_tag_and_project_selection() {
    let chat = Arc::new(MemoryChatClient::new());
    let config = RunnerConfig {
        tags: Some("smoke".to_string()),
        projects: vec![Project::E2e],
        ..RunnerConfig::default()
    };
    let runner = TestRunner::new(config, context(&chat));

    let selected = runner
        .select(vec![
            browser_spec("login", &["@smoke"]),
            browser_spec("profile", &["smoke-extended"]),
            browser_spec("search @SMOKE", &[]),
        ])
        .unwrap();
    let names: Vec<_> = selected.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["login", "search @SMOKE"]);
}

#[tokio::test]
async fn test_browser_specs_need_a_driver() {
    let chat = Arc::new(MemoryChatClient::new());
    let runner = TestRunner::new(RunnerConfig::default(), context(&chat));

    let err = runner
        .run_specs(vec![browser_spec("login", &[])])
        .await
        .unwrap_err();
    assert!(matches!(err, E2eError::Playwright(_)));
    assert!(chat.calls().is_empty());
}

#[tokio::test]
async fn test_api_failure_posts_condensed_snippet() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/graphql").body_includes("Pharmacies");
        then.status(200)
            .json_body(json!({ "data": { "pharmacies": [] } }));
    });

    let spec = TestSpec::from_yaml(
        r#"
name: pharmacies list
project: api
steps:
  - action: graphql
    operation_name: Pharmacies
    query: "query Pharmacies { pharmacies { id } }"
    expect:
      - path: data.pharmacies[0].id
        exists: true
"#,
    )
    .unwrap();

    let chat = Arc::new(MemoryChatClient::new());
    let runner = TestRunner::new(RunnerConfig::default(), context(&chat))
        .with_graphql(GraphqlClient::new(server.url("/graphql")).unwrap());
    let suite = runner.run_specs(vec![spec]).await.unwrap();

    mock.assert_calls(1);
    assert_eq!(suite.failed, 1);
    assert_eq!(suite.results[0].outcome, TestOutcome::Failed);

    let posts = chat.posts();
    assert_eq!(posts.len(), 1);
    assert!(posts[0].content.starts_with("❌ **pharmacies list**\n```\n"));
    assert!(posts[0]
        .content
        .contains("Error: expect(data.pharmacies[0].id).toBeDefined()"));
}

#[tokio::test]
async fn test_api_step_reason_reaches_result_and_thread() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/graphql").body_includes("Register");
        then.status(500).body("boom");
    });

    let spec = TestSpec::from_yaml(
        r#"
name: register
project: api
steps:
  - action: graphql
    operation_name: Register
    query: "mutation Register { register { id } }"
    on_fail: registration endpoint is down
"#,
    )
    .unwrap();

    let chat = Arc::new(MemoryChatClient::new());
    let runner = TestRunner::new(RunnerConfig::default(), context(&chat))
        .with_graphql(GraphqlClient::new(server.url("/graphql")).unwrap());
    let suite = runner.run_specs(vec![spec]).await.unwrap();

    mock.assert_calls(1);
    assert_eq!(suite.results[0].outcome, TestOutcome::Failed);
    assert_eq!(
        suite.results[0].error.as_deref(),
        Some("registration endpoint is down")
    );

    let posts = chat.posts();
    assert_eq!(posts.len(), 1);
    assert!(posts[0]
        .content
        .starts_with("❌ **register**\nReason: registration endpoint is down\n```\n"));
    assert!(posts[0].content.contains("HTTP 500"));
}

#[tokio::test]
async fn test_disabled_context_runs_without_reporting() {
    let runner = TestRunner::new(RunnerConfig::default(), Arc::new(ReportContext::disabled()))
        .with_browser(Arc::new(ScriptedDriver));
    let suite = runner
        .run_specs(vec![browser_spec("checkout", &[])])
        .await
        .unwrap();
    assert_eq!(suite.failed, 1);
    assert_eq!(suite.undelivered_notifications, 0);
}
