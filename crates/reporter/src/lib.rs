//! TestRelay run reporting
//!
//! Live chat reporting for test runs: a per-run header message that tracks
//! progress, and a thread that receives failure (and optionally pass)
//! notifications through a non-blocking queue.

pub mod client;
pub mod context;
pub mod destination;
pub mod discord;
pub mod error;
pub mod header;
pub mod memory;
pub mod queue;
pub mod schedule;
pub mod setup;

pub use client::{Attachment, ChatClient, HeaderEdit, HeaderHandle, ThreadPost};
pub use context::{FailureReport, ReportContext, TestScope};
pub use destination::{RunDestination, StaticDestination};
pub use discord::DiscordClient;
pub use error::{ReportError, ReportResult, TestAbort};
pub use header::{HeaderProgressTracker, TrackerPhase};
pub use memory::MemoryChatClient;
pub use queue::{DrainReport, NotificationQueue, QueueStats};
pub use schedule::ScheduledTask;
