//! Cluster orchestration abstraction layer.
//!
//! Defines the trait the rest of the system uses to provision and observe
//! the two underlying resource kinds (compute unit, network endpoint),
//! plus the production Kubernetes implementation. The adapter owns no
//! domain state; its only side effects live in the external cluster.

mod kube;

pub use kube::KubeOrchestrator;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    InstanceId, InstanceSnapshot, InstanceState, ANNOTATION_ENDPOINT, ANNOTATION_NAME,
    ANNOTATION_TOKEN, LABEL_INSTANCE,
};
use crate::error::Result;

/// Labels and annotations attached to a managed resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMeta {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl ResourceMeta {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// Request to provision a compute unit.
#[derive(Debug, Clone)]
pub struct ComputeSpec {
    pub meta: ResourceMeta,
    /// Full image reference, already resolved against the allow-list.
    pub image: String,
    /// Container startup command, including the injected base-URL argument.
    pub command: Vec<String>,
    /// Port the embedded application listens on.
    pub port: u16,
    /// Path probed to confirm readiness, derived from the same base URL
    /// the client redirect uses.
    pub readiness_path: String,
    pub cpu_request: String,
    pub memory_request: String,
}

/// Request to provision a network endpoint fronting a compute unit.
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub meta: ResourceMeta,
    /// Label selector routing the endpoint to its compute unit.
    pub selector: BTreeMap<String, String>,
    pub port: u16,
    pub target_port: u16,
}

/// Observed state of a compute unit.
#[derive(Debug, Clone)]
pub struct ComputeResource {
    /// Cluster-assigned resource name.
    pub name: String,
    pub meta: ResourceMeta,
    /// Image the compute unit runs, when reported.
    pub image: Option<String>,
    /// Raw lifecycle phase reported by the cluster, if any.
    pub phase: Option<String>,
    /// Whether the readiness probe has passed.
    pub ready: bool,
    /// Whether deletion has been requested for the resource.
    pub deleting: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl ComputeResource {
    /// Project this resource into the owner-visible instance snapshot.
    ///
    /// Returns `None` when the resource is missing the instance label,
    /// i.e. it was not created by this system.
    pub fn instance_snapshot(&self) -> Option<InstanceSnapshot> {
        let instance_id = self.meta.label(LABEL_INSTANCE)?;
        Some(InstanceSnapshot {
            instance_id: InstanceId::new(instance_id),
            display_name: self
                .meta
                .annotation(ANNOTATION_NAME)
                .unwrap_or_default()
                .to_string(),
            compute_ref: Some(self.name.clone()),
            endpoint_ref: self.meta.annotation(ANNOTATION_ENDPOINT).map(String::from),
            access_token: self
                .meta
                .annotation(ANNOTATION_TOKEN)
                .map(crate::domain::AccessToken::new),
            state: InstanceState::project(self.phase.as_deref(), self.ready, self.deleting),
            created_at: self.created_at,
        })
    }
}

/// What happened to a watched resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEventKind {
    Added,
    Modified,
    Deleted,
}

/// One event from a scoped watch.
#[derive(Debug, Clone)]
pub struct ResourceEvent {
    pub kind: ResourceEventKind,
    pub compute: ComputeResource,
}

/// A live, ordered feed of changes to the resources matching a selector.
///
/// Lives exactly as long as its consumer; dropping it closes the
/// underlying cluster watch.
#[async_trait]
pub trait ResourceWatch: Send {
    /// Next event, `None` when the watch has ended, `Err` on a transient
    /// watch failure. Errors are terminal; there is no resume.
    async fn next(&mut self) -> Option<Result<ResourceEvent>>;
}

/// Typed wrapper over the cluster API for the two managed resource kinds.
///
/// Every call carries a bounded timeout; a timeout yields
/// [`crate::error::Error::Transient`] and is never retried here — retry
/// policy belongs to the caller.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Provision a compute unit. Returns the observed resource, including
    /// its cluster-assigned name.
    async fn create_compute(&self, spec: ComputeSpec) -> Result<ComputeResource>;

    /// Provision a network endpoint. Returns the resolved endpoint name.
    async fn create_endpoint(&self, spec: EndpointSpec) -> Result<String>;

    /// Delete a compute unit. Deleting an already-absent resource is
    /// success, not an error.
    async fn delete_compute(&self, name: &str) -> Result<()>;

    /// Delete a network endpoint. Idempotent like [`Self::delete_compute`].
    async fn delete_endpoint(&self, name: &str) -> Result<()>;

    /// Read a single compute unit by name.
    async fn read_compute(&self, name: &str) -> Result<ComputeResource>;

    /// List compute units matching a label selector.
    async fn list_by_label(&self, selector: &str) -> Result<Vec<ComputeResource>>;

    /// Open a scoped watch on compute units matching a label selector.
    async fn open_watch(&self, selector: &str) -> Result<Box<dyn ResourceWatch>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ANNOTATION_NAME, ANNOTATION_TOKEN, LABEL_INSTANCE};

    fn resource_with_labels(pairs: &[(&str, &str)], annotations: &[(&str, &str)]) -> ComputeResource {
        ComputeResource {
            name: "podbench-worker-abc".into(),
            meta: ResourceMeta {
                labels: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                annotations: annotations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
            image: None,
            phase: Some("Running".into()),
            ready: true,
            deleting: false,
            created_at: None,
        }
    }

    #[test]
    fn snapshot_projects_labels_and_annotations() {
        let resource = resource_with_labels(
            &[(LABEL_INSTANCE, "i-1")],
            &[(ANNOTATION_NAME, "nb1"), (ANNOTATION_TOKEN, "tok")],
        );
        let snapshot = resource.instance_snapshot().unwrap();
        assert_eq!(snapshot.instance_id.as_str(), "i-1");
        assert_eq!(snapshot.display_name, "nb1");
        assert_eq!(snapshot.state, InstanceState::Running);
        assert_eq!(snapshot.access_token.unwrap().as_str(), "tok");
    }

    #[test]
    fn snapshot_requires_instance_label() {
        let resource = resource_with_labels(&[], &[(ANNOTATION_NAME, "nb1")]);
        assert!(resource.instance_snapshot().is_none());
    }
}
