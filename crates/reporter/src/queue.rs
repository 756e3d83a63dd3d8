//! Notification queue
//!
//! Test hooks enqueue messages without waiting on the network. A debounced
//! timer flushes the queue into the run thread in FIFO order; while the run
//! thread is not known yet the queue is kept and the flush is retried. On
//! shutdown `drain` pushes everything out. Flush passes never overlap, so a
//! drain also waits out any send the timer already has on the wire.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;
use testrelay_common::{FlushConfig, QueuedMessage};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::{Attachment, ChatClient, ThreadPost};
use crate::destination::RunDestination;
use crate::schedule::ScheduledTask;

/// Counters exposed for status output and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub sent: u64,
    pub failed: u64,
    pub flush_passes: u64,
    pub not_ready: u64,
}

/// Result of a drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub sent: u64,
    pub failed: u64,
    /// Messages still held because the destination never resolved
    pub undelivered: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassOutcome {
    Empty,
    Flushed,
    NotReady,
}

enum TimerState {
    Idle,
    Armed(ScheduledTask),
    Running,
}

struct QueueState {
    messages: VecDeque<QueuedMessage>,
    timer: TimerState,
    next_generation: u64,
    unresolved_streak: u32,
    stats: QueueStats,
}

struct Inner {
    client: Arc<dyn ChatClient>,
    destination: Arc<dyn RunDestination>,
    config: FlushConfig,
    state: Mutex<QueueState>,
    /// Serializes flush passes
    flush_guard: tokio::sync::Mutex<()>,
}

/// FIFO queue of thread notifications with a debounced background flush
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl NotificationQueue {
    pub fn new(
        client: Arc<dyn ChatClient>,
        destination: Arc<dyn RunDestination>,
        config: FlushConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                destination,
                config,
                state: Mutex::new(QueueState {
                    messages: VecDeque::new(),
                    timer: TimerState::Idle,
                    next_generation: 0,
                    unresolved_streak: 0,
                    stats: QueueStats::default(),
                }),
                flush_guard: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Append a message and make sure a flush is scheduled. Never blocks on I/O.
    pub fn enqueue(&self, message: QueuedMessage) {
        let mut state = self.inner.state.lock();
        state.messages.push_back(message);
        state.stats.enqueued += 1;
        self.inner.arm(&mut state, self.inner.config.debounce());
    }

    /// Arm the debounce timer unless a flush is already pending or running
    pub fn schedule_flush(&self) {
        let mut state = self.inner.state.lock();
        self.inner.arm(&mut state, self.inner.config.debounce());
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.state.lock().stats
    }

    /// Deliver everything queued.
    ///
    /// The first pass takes the flush guard, so it starts only after a timer
    /// pass already sending has finished. While the destination is unknown
    /// this keeps retrying until `drain_timeout` runs out, then gives up and
    /// reports what is left.
    pub async fn drain(&self) -> DrainReport {
        let before = self.stats();
        self.inner.cancel_timer();

        let deadline = Instant::now() + self.inner.config.drain_timeout();
        let mut gave_up = false;
        loop {
            match self.inner.flush_pass().await {
                PassOutcome::Empty => break,
                PassOutcome::Flushed => continue,
                PassOutcome::NotReady => {
                    if Instant::now() >= deadline {
                        gave_up = true;
                        break;
                    }
                    tokio::time::sleep(self.inner.config.retry_backoff()).await;
                }
            }
        }

        let undelivered = self.len();
        if gave_up {
            self.inner.cancel_timer();
            warn!(
                "Run destination never resolved; {} notification(s) undelivered",
                undelivered
            );
        }

        let after = self.stats();
        let report = DrainReport {
            sent: after.sent - before.sent,
            failed: after.failed - before.failed,
            undelivered,
        };
        debug!("Drain finished: {:?}", report);
        report
    }
}

impl Inner {
    /// Arm the flush timer if idle. Called with the state lock held.
    fn arm(self: &Arc<Self>, state: &mut QueueState, delay: Duration) {
        if !matches!(state.timer, TimerState::Idle) {
            return;
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        let weak: Weak<Inner> = Arc::downgrade(self);

        let task = ScheduledTask::spawn(delay, generation, move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.run_scheduled(generation).await;
            }
        });

        match task {
            Some(task) => state.timer = TimerState::Armed(task),
            None => debug!(
                "No async runtime; {} notification(s) wait for drain",
                state.messages.len()
            ),
        }
    }

    fn cancel_timer(&self) {
        let mut state = self.state.lock();
        if matches!(state.timer, TimerState::Armed(_)) {
            if let TimerState::Armed(task) = std::mem::replace(&mut state.timer, TimerState::Idle)
            {
                debug!("Cancelled flush timer {}", task.generation());
                task.cancel();
            }
        }
    }

    async fn run_scheduled(self: Arc<Self>, generation: u64) {
        {
            let mut state = self.state.lock();
            match &state.timer {
                TimerState::Armed(task) if task.generation() == generation => {}
                _ => {
                    debug!("Flush timer {} superseded", generation);
                    return;
                }
            }
            state.timer = TimerState::Running;
        }

        let outcome = self.flush_pass().await;

        let mut state = self.state.lock();
        if matches!(state.timer, TimerState::Running) {
            state.timer = TimerState::Idle;
        }
        match outcome {
            PassOutcome::NotReady => self.arm(&mut state, self.config.retry_backoff()),
            _ if !state.messages.is_empty() => self.arm(&mut state, self.config.debounce()),
            _ => {}
        }
    }

    /// One pass: resolve the thread once, then send until the queue is empty
    async fn flush_pass(&self) -> PassOutcome {
        let _guard = self.flush_guard.lock().await;

        {
            let mut state = self.state.lock();
            state.stats.flush_passes += 1;
            if state.messages.is_empty() {
                return PassOutcome::Empty;
            }
        }

        let thread_id = self
            .destination
            .current()
            .await
            .and_then(|meta| meta.thread_destination().map(str::to_string));

        let Some(thread_id) = thread_id else {
            self.note_not_ready();
            return PassOutcome::NotReady;
        };

        {
            let mut state = self.state.lock();
            if state.unresolved_streak >= self.config.retry_warn_after {
                info!("Run thread resolved, delivering held notifications");
            }
            state.unresolved_streak = 0;
        }

        loop {
            let next = self.state.lock().messages.pop_front();
            let Some(message) = next else {
                break;
            };

            let post = build_post(&message).await;
            match self.client.post_to_thread(&thread_id, &post).await {
                Ok(()) => self.state.lock().stats.sent += 1,
                Err(e) => {
                    self.state.lock().stats.failed += 1;
                    warn!("Dropping notification after send failure: {}", e);
                }
            }
        }

        PassOutcome::Flushed
    }

    fn note_not_ready(&self) {
        let mut state = self.state.lock();
        state.stats.not_ready += 1;
        state.unresolved_streak = state.unresolved_streak.saturating_add(1);
        if state.unresolved_streak == self.config.retry_warn_after {
            warn!(
                "Run thread still unknown after {} attempts; holding {} notification(s)",
                state.unresolved_streak,
                state.messages.len()
            );
        } else {
            debug!("Run thread not known yet, retrying later");
        }
    }
}

/// Turn a queued message into a post, loading its attachment if readable
async fn build_post(message: &QueuedMessage) -> ThreadPost {
    let attachment = match &message.file_path {
        Some(path) => read_attachment(path).await,
        None => None,
    };
    ThreadPost {
        content: message.rendered_content(),
        attachment,
    }
}

async fn read_attachment(path: &Path) -> Option<Attachment> {
    match tokio::fs::read(path).await {
        Ok(data) => Some(Attachment {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment".to_string()),
            data,
        }),
        Err(e) => {
            warn!("Could not read attachment {}: {}", path.display(), e);
            None
        }
    }
}
