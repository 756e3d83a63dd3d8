//! Live header message
//!
//! The header posted by setup is edited in place as tests finish: a progress
//! bar and running tallies, then a final summary with an optional report
//! link. Edits are applied latest-wins; a render that is already outdated
//! when its turn comes is skipped.

use parking_lot::Mutex;
use std::sync::Arc;
use testrelay_common::progress::{render_final_summary, render_running_header, report_link};
use testrelay_common::{ProgressCounters, TestOutcome};
use tracing::{debug, info, warn};

use crate::client::{ChatClient, HeaderEdit};
use crate::destination::RunDestination;

/// Lifecycle of the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    NotStarted,
    Running,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenderKind {
    Progress,
    Final,
}

struct TrackerState {
    phase: TrackerPhase,
    counters: ProgressCounters,
    /// Sequence number of the newest render requested
    latest: u64,
}

/// Keeps the header message in sync with run progress
pub struct HeaderProgressTracker {
    client: Mutex<Option<Arc<dyn ChatClient>>>,
    destination: Arc<dyn RunDestination>,
    state: Mutex<TrackerState>,
    /// Sequence number of the last render applied
    applied: tokio::sync::Mutex<u64>,
}

impl std::fmt::Debug for HeaderProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderProgressTracker")
            .field("phase", &self.phase())
            .field("counters", &self.counters())
            .finish()
    }
}

impl HeaderProgressTracker {
    pub fn new(client: Arc<dyn ChatClient>, destination: Arc<dyn RunDestination>) -> Self {
        Self {
            client: Mutex::new(Some(client)),
            destination,
            state: Mutex::new(TrackerState {
                phase: TrackerPhase::NotStarted,
                counters: ProgressCounters::default(),
                latest: 0,
            }),
            applied: tokio::sync::Mutex::new(0),
        }
    }

    pub fn phase(&self) -> TrackerPhase {
        self.state.lock().phase
    }

    pub fn counters(&self) -> ProgressCounters {
        self.state.lock().counters
    }

    /// Start tracking `total` tests and render 0%
    pub async fn begin(&self, total: u32) {
        let (seq, counters) = {
            let mut state = self.state.lock();
            if state.phase != TrackerPhase::NotStarted {
                debug!("Header tracker already started");
                return;
            }
            state.phase = TrackerPhase::Running;
            state.counters = ProgressCounters::new(total);
            state.latest += 1;
            (state.latest, state.counters)
        };
        info!("Tracking {} test(s) in run header", total);
        self.apply(seq, counters, RenderKind::Progress, None).await;
    }

    /// Count one finished test and re-render
    pub async fn record(&self, outcome: TestOutcome) {
        let (seq, counters) = {
            let mut state = self.state.lock();
            if state.phase != TrackerPhase::Running {
                debug!("Ignoring {} outcome outside a running header", outcome);
                return;
            }
            state.counters.record(outcome);
            state.latest += 1;
            (state.latest, state.counters)
        };
        self.apply(seq, counters, RenderKind::Progress, None).await;
    }

    /// Render the final summary and release the client. Later calls are no-ops.
    pub async fn finalize(&self, report_url: Option<&str>) {
        let (seq, counters) = {
            let mut state = self.state.lock();
            if state.phase == TrackerPhase::Finalized {
                return;
            }
            state.phase = TrackerPhase::Finalized;
            state.latest += 1;
            (state.latest, state.counters)
        };
        self.apply(seq, counters, RenderKind::Final, report_url).await;
        self.client.lock().take();
    }

    async fn apply(
        &self,
        seq: u64,
        counters: ProgressCounters,
        kind: RenderKind,
        report_url: Option<&str>,
    ) {
        let mut applied = self.applied.lock().await;
        let latest = self.state.lock().latest;
        if seq <= *applied || seq < latest {
            debug!("Skipping superseded header render {}", seq);
            return;
        }

        let client = self.client.lock().clone();
        let Some(client) = client else {
            return;
        };
        let Some(meta) = self.destination.current().await else {
            debug!("Header not published yet, skipping render {}", seq);
            return;
        };
        let Some((channel_id, header_id)) = meta.header_destination() else {
            debug!("Run metadata has no header message, skipping render {}", seq);
            return;
        };

        let edit = match kind {
            RenderKind::Progress => {
                HeaderEdit::content(render_running_header(&meta.suite_label, &counters))
            }
            RenderKind::Final => HeaderEdit {
                content: render_final_summary(&meta.suite_label, &counters),
                embeds: Some(
                    report_url
                        .map(str::trim)
                        .filter(|url| !url.is_empty())
                        .map(report_link)
                        .into_iter()
                        .collect(),
                ),
            },
        };

        match client.edit_message(channel_id, header_id, &edit).await {
            Ok(()) => *applied = seq,
            Err(e) => warn!("Failed to update run header: {}", e),
        }
    }
}
