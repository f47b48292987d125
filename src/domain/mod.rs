//! Cluster-agnostic domain types: instances, their lifecycle states, and
//! the events the status streamer publishes.

mod event;
mod instance;
mod label;

pub use event::{WatchEvent, WatchEventKind};
pub use instance::{
    AccessToken, Instance, InstanceId, InstanceSnapshot, InstanceState, OwnerId,
};
pub use label::{
    escape_owner, instance_selector, owner_selector, unescape_owner, ANNOTATION_ENDPOINT,
    ANNOTATION_NAME, ANNOTATION_TOKEN, APP_WORKER, LABEL_APP, LABEL_CONTROLLER, LABEL_INSTANCE,
    LABEL_OWNER,
};
