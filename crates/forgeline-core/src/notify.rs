//! Notification seam for release events.
//!
//! Delivery is best-effort and fire-and-forget: the lifecycle service emits
//! exactly one event per creation and per notable lifecycle transition and
//! never inspects the outcome.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use forgeline_state::Release;

/// Release events worth telling the outside world about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseEventType {
    /// A release was created in an assembly-allowed or assembled state.
    NewRelease,
    /// A release was created PENDING, ahead of its build.
    ReleaseScheduled,
    /// An existing release re-entered DRAFT.
    ReleaseDrafted,
    ReleaseCancelled,
    ReleaseRejected,
    ReleaseAssembled,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn on_release_event(&self, release: &Release, event: ReleaseEventType);
}

/// Sink that drops everything. Default for embedders without delivery.
#[derive(Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl NotificationSink for NoopSink {
    async fn on_release_event(&self, _release: &Release, _event: ReleaseEventType) {}
}

/// Sink that records events for test assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(Uuid, ReleaseEventType)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<(Uuid, ReleaseEventType)> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn on_release_event(&self, release: &Release, event: ReleaseEventType) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((release.uuid, event));
    }
}
