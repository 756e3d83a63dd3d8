//! Where notifications go
//!
//! Workers learn the thread and header ids from the run metadata written by
//! setup. The lookup is behind a trait so an in-process run can skip the file.

use async_trait::async_trait;
use parking_lot::RwLock;
use testrelay_common::{RunMetadata, RunMetadataStore};

/// Source of the current run's destination
#[async_trait]
pub trait RunDestination: Send + Sync {
    /// Current metadata, `None` while setup has not published it
    async fn current(&self) -> Option<RunMetadata>;
}

#[async_trait]
impl RunDestination for RunMetadataStore {
    async fn current(&self) -> Option<RunMetadata> {
        self.load().await
    }
}

/// Destination held in memory
#[derive(Debug, Default)]
pub struct StaticDestination {
    meta: RwLock<Option<RunMetadata>>,
}

impl StaticDestination {
    pub fn new(meta: Option<RunMetadata>) -> Self {
        Self {
            meta: RwLock::new(meta),
        }
    }

    pub fn set(&self, meta: RunMetadata) {
        *self.meta.write() = Some(meta);
    }
}

#[async_trait]
impl RunDestination for StaticDestination {
    async fn current(&self) -> Option<RunMetadata> {
        self.meta.read().clone()
    }
}
