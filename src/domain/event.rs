//! Events published on an owner's live status feed.

use serde::{Deserialize, Serialize};

use super::InstanceSnapshot;

/// What happened to the underlying resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventKind {
    Added,
    Modified,
    Deleted,
}

/// One event on a subscriber's feed.
///
/// `Added` and `Modified` carry a full snapshot; `Deleted` is a removal
/// notice whose snapshot holds the last-known identity of the instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "event")]
    pub kind: WatchEventKind,
    #[serde(rename = "resource")]
    pub instance: InstanceSnapshot,
}
