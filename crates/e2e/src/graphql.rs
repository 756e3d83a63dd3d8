//! GraphQL client for API tests
//!
//! `safe_graphql` never fails: transport problems, HTTP errors and GraphQL
//! `errors` all come back as a short error string on the response. Response
//! expectations produce `Error:`/`Expected:`/`Received:` text so failure
//! snippets stay readable in the run thread.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use testrelay_common::snippet::{short_error, truncate_snippet, GRAPHQL_ERROR_LIMIT, SHORT_ERROR_LIMIT};
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::timeouts;

/// A GraphQL request and the checks applied to its response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphqlStep {
    pub query: String,

    #[serde(default)]
    pub operation_name: Option<String>,

    #[serde(default)]
    pub variables: Option<Value>,

    #[serde(default)]
    pub expect: Vec<JsonExpectation>,
}

/// Check on one value of the response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonExpectation {
    /// Dotted path such as `data.items[0].id`
    pub path: String,

    #[serde(default)]
    pub exists: Option<bool>,

    #[serde(default)]
    pub equals: Option<Value>,

    /// Substring expected in the value's text
    #[serde(default)]
    pub contains: Option<String>,
}

/// Outcome of a GraphQL call
#[derive(Debug, Clone, PartialEq)]
pub struct GraphqlResponse {
    pub status: Option<u16>,
    pub body: Option<Value>,
    pub error: Option<String>,
}

impl GraphqlResponse {
    fn failed(status: Option<u16>, body: Option<Value>, error: String) -> Self {
        Self {
            status,
            body,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn data(&self) -> Option<&Value> {
        self.body.as_ref()?.get("data")
    }
}

/// Resolve a dotted path with optional `[n]` indices
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let (key, indices) = match segment.find('[') {
            Some(i) => (&segment[..i], &segment[i..]),
            None => (segment, ""),
        };

        if !key.is_empty() {
            current = match current {
                Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                _ => current.get(key)?,
            };
        }

        for index in indices.split('[').filter(|s| !s.is_empty()) {
            let i: usize = index.trim_end_matches(']').parse().ok()?;
            current = current.get(i)?;
        }
    }
    Some(current)
}

fn render(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "undefined".to_string(),
    }
}

impl JsonExpectation {
    /// Failure text, or `None` when the body satisfies the expectation
    pub fn check(&self, body: &Value) -> Option<String> {
        let actual = lookup(body, &self.path);

        match (self.exists, actual) {
            (Some(true), None) => {
                return Some(format!(
                    "Error: expect({}).toBeDefined()\nExpected: defined\nReceived: undefined",
                    self.path
                ))
            }
            (Some(false), Some(v)) => {
                return Some(format!(
                    "Error: expect({}).toBeUndefined()\nExpected: undefined\nReceived: {}",
                    self.path, v
                ))
            }
            _ => {}
        }

        if let Some(expected) = &self.equals {
            if actual != Some(expected) {
                return Some(format!(
                    "Error: expect({}).toEqual(expected)\nExpected: {}\nReceived: {}",
                    self.path,
                    expected,
                    render(actual)
                ));
            }
        }

        if let Some(needle) = &self.contains {
            let text = match actual {
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
                None => None,
            };
            if !text.as_deref().is_some_and(|t| t.contains(needle.as_str())) {
                return Some(format!(
                    "Error: expect({}).toContain(expected)\nExpected: {}\nReceived: {}",
                    self.path,
                    Value::String(needle.clone()),
                    render(actual)
                ));
            }
        }

        None
    }
}

/// GraphQL endpoint client
#[derive(Debug, Clone)]
pub struct GraphqlClient {
    http: reqwest::Client,
    endpoint: String,
}

impl GraphqlClient {
    pub fn new(endpoint: impl Into<String>) -> E2eResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeouts::LONG)
            .build()
            .map_err(E2eError::from)?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    /// Join an API base URL and a GraphQL path
    pub fn from_base(api_base_url: &str, graphql_path: &str) -> E2eResult<Self> {
        Self::new(format!(
            "{}/{}",
            api_base_url.trim_end_matches('/'),
            graphql_path.trim_start_matches('/')
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST `{query, operationName, variables}`, folding every failure into the response
    pub async fn safe_graphql(
        &self,
        query: &str,
        operation_name: Option<&str>,
        variables: Option<&Value>,
    ) -> GraphqlResponse {
        let payload = json!({
            "query": query,
            "operationName": operation_name,
            "variables": variables.cloned().unwrap_or_else(|| json!({})),
        });
        debug!(
            "GraphQL {} -> {}",
            operation_name.unwrap_or("anonymous"),
            self.endpoint
        );

        let response = match self.http.post(&self.endpoint).json(&payload).send().await {
            Ok(r) => r,
            Err(e) => return GraphqlResponse::failed(None, None, short_error(&e.to_string())),
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return GraphqlResponse::failed(
                Some(status.as_u16()),
                None,
                format!(
                    "HTTP {} {}",
                    status.as_u16(),
                    truncate_snippet(text.trim(), SHORT_ERROR_LIMIT)
                ),
            );
        }

        let body: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                return GraphqlResponse::failed(
                    Some(status.as_u16()),
                    None,
                    format!("Invalid JSON response: {}", e),
                )
            }
        };

        let has_errors = match body.get("errors") {
            Some(Value::Array(errors)) => !errors.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        };
        if has_errors {
            let errors = truncate_snippet(&body["errors"].to_string(), GRAPHQL_ERROR_LIMIT);
            return GraphqlResponse::failed(Some(status.as_u16()), Some(body), errors);
        }

        GraphqlResponse {
            status: Some(status.as_u16()),
            body: Some(body),
            error: None,
        }
    }

    /// Run a step and return every failure text it produced
    pub async fn run_step(&self, step: &GraphqlStep) -> Vec<String> {
        let response = self
            .safe_graphql(
                &step.query,
                step.operation_name.as_deref(),
                step.variables.as_ref(),
            )
            .await;

        if let Some(error) = response.error {
            let operation = step.operation_name.as_deref().unwrap_or("GraphQL request");
            return vec![format!("{} failed: {}", operation, error)];
        }

        let Some(body) = response.body else {
            return Vec::new();
        };
        step.expect
            .iter()
            .filter_map(|expectation| expectation.check(&body))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_lookup_paths() {
        let body = json!({ "data": { "items": [{ "id": 7 }, { "id": 8 }] } });
        assert_eq!(lookup(&body, "data.items[1].id"), Some(&json!(8)));
        assert_eq!(lookup(&body, "data.items.0.id"), Some(&json!(7)));
        assert_eq!(lookup(&body, "data.missing"), None);
        assert_eq!(lookup(&body, "data.items[5]"), None);
    }

    #[test]
    fn test_expectation_messages() {
        let body = json!({ "data": { "status": "DRAFT" } });
        let equals = JsonExpectation {
            path: "data.status".to_string(),
            exists: None,
            equals: Some(json!("PUBLISHED")),
            contains: None,
        };
        assert_eq!(
            equals.check(&body).unwrap(),
            "Error: expect(data.status).toEqual(expected)\nExpected: \"PUBLISHED\"\nReceived: \"DRAFT\""
        );

        let exists = JsonExpectation {
            path: "data.id".to_string(),
            exists: Some(true),
            equals: None,
            contains: None,
        };
        assert!(exists.check(&body).unwrap().ends_with("Received: undefined"));

        let contains = JsonExpectation {
            path: "data.status".to_string(),
            exists: None,
            equals: None,
            contains: Some("DRA".to_string()),
        };
        assert_eq!(contains.check(&body), None);
    }

    #[tokio::test]
    async fn test_successful_query() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v1/pharmaserv/graphql")
                .json_body(json!({
                    "query": "query Me { me { id } }",
                    "operationName": "Me",
                    "variables": {}
                }));
            then.status(200).json_body(json!({ "data": { "me": { "id": "u1" } } }));
        });

        let client =
            GraphqlClient::from_base(&server.base_url(), "/api/v1/pharmaserv/graphql").unwrap();
        let response = client
            .safe_graphql("query Me { me { id } }", Some("Me"), None)
            .await;

        mock.assert_calls(1);
        assert!(response.is_ok());
        assert_eq!(response.data().unwrap()["me"]["id"], "u1");
    }

    #[tokio::test]
    async fn test_http_failure_is_folded() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql");
            then.status(502).body("bad gateway");
        });

        let client = GraphqlClient::new(server.url("/graphql")).unwrap();
        let response = client.safe_graphql("{ ping }", None, None).await;
        assert_eq!(response.error.as_deref(), Some("HTTP 502 bad gateway"));
        assert_eq!(response.status, Some(502));
    }

    #[tokio::test]
    async fn test_graphql_errors_are_folded() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200)
                .json_body(json!({ "data": null, "errors": [{ "message": "denied" }] }));
        });

        let client = GraphqlClient::new(server.url("/graphql")).unwrap();
        let step = GraphqlStep {
            query: "{ secret }".to_string(),
            operation_name: Some("Secret".to_string()),
            variables: None,
            expect: vec![],
        };
        let errors = client.run_step(&step).await;
        assert_eq!(errors, vec![r#"Secret failed: [{"message":"denied"}]"#.to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_never_panics() {
        let client = GraphqlClient::new("http://127.0.0.1:1/graphql").unwrap();
        let response = client.safe_graphql("{ ping }", None, None).await;
        assert!(!response.is_ok());
        assert!(response.status.is_none());
    }
}
