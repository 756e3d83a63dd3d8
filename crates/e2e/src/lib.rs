//! TestRelay test runner
//!
//! Runs declarative YAML test specs and reports every result live:
//! - `e2e` specs drive a browser through generated Playwright scripts
//! - `api` specs call GraphQL and check the response
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TestRunner                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  select(specs)       project + tag filter                   │
//! │  run_specs(specs)    buffer_unordered(threads)              │
//! │    ├── e2e  -> BrowserDriver::run -> BrowserRun             │
//! │    └── api  -> GraphqlClient::run_step -> failure texts     │
//! │  ReportContext       header progress + thread messages      │
//! │  write_results()     test-results/test-results.json         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod graphql;
pub mod playwright;
pub mod runner;
pub mod spec;
pub mod timeouts;

pub use error::{E2eError, E2eResult};
pub use graphql::{GraphqlClient, GraphqlResponse, GraphqlStep, JsonExpectation};
pub use playwright::{BrowserDriver, BrowserRun, PlaywrightConfig, PlaywrightDriver};
pub use runner::{RunnerConfig, TestResult, TestRunner, TestSuiteResult};
pub use spec::{Action, Step, TagFilter, Target, TestSpec};
