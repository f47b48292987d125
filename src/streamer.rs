//! Watch-to-stream bridge: one owner-scoped live feed per subscriber.
//!
//! Each subscription owns exactly one underlying cluster watch — the
//! system's principal scalability constraint — and lasts as long as its
//! consumer. Dropping the subscription drops the watch. There is no resume
//! or offset replay: after an error the client reconnects and takes a
//! fresh snapshot from the list operation.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{
    escape_owner, owner_selector, InstanceState, OwnerId, WatchEvent, WatchEventKind, LABEL_OWNER,
};
use crate::error::Result;
use crate::orchestrator::{Orchestrator, ResourceEventKind, ResourceWatch};

/// Republishes orchestration events as per-owner feeds.
pub struct StatusStreamer {
    orchestrator: Arc<dyn Orchestrator>,
}

impl StatusStreamer {
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Open a feed of this owner's instance events.
    pub async fn subscribe(&self, owner_id: &OwnerId) -> Result<Subscription> {
        let watch = self
            .orchestrator
            .open_watch(&owner_selector(owner_id.as_str()))
            .await?;
        debug!(owner = %owner_id, "subscription opened");
        Ok(Subscription {
            watch,
            owner_label: escape_owner(owner_id.as_str()),
        })
    }
}

/// A finite, non-restartable sequence of [`WatchEvent`]s for one owner.
///
/// Per-resource event order matches emission order from the underlying
/// watch; there is no ordering guarantee across distinct resources.
pub struct Subscription {
    watch: Box<dyn ResourceWatch>,
    owner_label: String,
}

impl Subscription {
    /// Next owner-visible event. `None` when the underlying watch ends;
    /// `Err` on a transient watch failure, which is terminal for this
    /// subscription.
    pub async fn next_event(&mut self) -> Option<Result<WatchEvent>> {
        loop {
            let event = match self.watch.next().await? {
                Ok(event) => event,
                Err(err) => return Some(Err(err)),
            };

            // The watch is already selector-scoped; events that still miss
            // the owner label, or that lack instance metadata, are not
            // owner-visible and never cross the bridge.
            if event.compute.meta.label(LABEL_OWNER) != Some(self.owner_label.as_str()) {
                continue;
            }
            let Some(mut snapshot) = event.compute.instance_snapshot() else {
                continue;
            };

            let kind = match event.kind {
                ResourceEventKind::Added => WatchEventKind::Added,
                ResourceEventKind::Modified => WatchEventKind::Modified,
                ResourceEventKind::Deleted => {
                    // Removal notice: last-known identity, terminal state.
                    snapshot.state = InstanceState::Deleted;
                    WatchEventKind::Deleted
                }
            };

            return Some(Ok(WatchEvent {
                kind,
                instance: snapshot,
            }));
        }
    }
}
