//! In-memory fake of the orchestration adapter.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::orchestrator::{
    ComputeResource, ComputeSpec, EndpointSpec, Orchestrator, ResourceEvent, ResourceEventKind,
    ResourceWatch,
};

/// Whether a resource's labels satisfy an equality selector, e.g.
/// `podbench.io/owner=auth0--_--u1`. Comma-separated terms must all match.
pub fn matches_selector(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    selector.split(',').all(|term| {
        match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => false,
        }
    })
}

#[derive(Default)]
struct ClusterState {
    computes: BTreeMap<String, ComputeResource>,
    compute_specs: BTreeMap<String, ComputeSpec>,
    endpoints: BTreeMap<String, EndpointSpec>,
    counter: u64,
    watchers: Vec<Watcher>,
    fail_next_create_compute: bool,
    fail_next_create_endpoint: bool,
    fail_next_delete_compute: bool,
    fail_next_delete_endpoint: bool,
}

struct Watcher {
    selector: String,
    tx: mpsc::UnboundedSender<Result<ResourceEvent>>,
}

impl ClusterState {
    fn emit(&mut self, kind: ResourceEventKind, compute: &ComputeResource) {
        self.watchers.retain(|w| {
            if !matches_selector(&w.selector, &compute.meta.labels) {
                return true;
            }
            w.tx.send(Ok(ResourceEvent {
                kind,
                compute: compute.clone(),
            }))
            .is_ok()
        });
    }
}

/// In-memory cluster with the same observable behavior as the production
/// adapter: idempotent deletes, label-scoped lists, and watches that
/// replay the current resource set before streaming changes.
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next compute creation to fail with a transient error.
    pub fn fail_next_create_compute(&self) {
        self.state.lock().unwrap().fail_next_create_compute = true;
    }

    /// Script the next endpoint creation to fail with a transient error.
    pub fn fail_next_create_endpoint(&self) {
        self.state.lock().unwrap().fail_next_create_endpoint = true;
    }

    /// Script the next compute deletion to fail with a transient error.
    pub fn fail_next_delete_compute(&self) {
        self.state.lock().unwrap().fail_next_delete_compute = true;
    }

    /// Script the next endpoint deletion to fail with a transient error.
    pub fn fail_next_delete_endpoint(&self) {
        self.state.lock().unwrap().fail_next_delete_endpoint = true;
    }

    /// Push a transient failure into every open watch and close it, as a
    /// dropped cluster connection would.
    pub fn fail_watches(&self) {
        let mut state = self.state.lock().unwrap();
        for watcher in state.watchers.drain(..) {
            let _ = watcher
                .tx
                .send(Err(Error::Transient("scripted watch failure".into())));
        }
    }

    /// Mark a compute unit ready, as the cluster would once its readiness
    /// probe passes, and notify watchers.
    pub fn set_ready(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(compute) = state.computes.get_mut(name) {
            compute.phase = Some("Running".to_string());
            compute.ready = true;
            let compute = compute.clone();
            state.emit(ResourceEventKind::Modified, &compute);
        }
    }

    pub fn compute_count(&self) -> usize {
        self.state.lock().unwrap().computes.len()
    }

    pub fn endpoint_count(&self) -> usize {
        self.state.lock().unwrap().endpoints.len()
    }

    pub fn compute(&self, name: &str) -> Option<ComputeResource> {
        self.state.lock().unwrap().computes.get(name).cloned()
    }

    /// The spec a compute unit was created with, for asserting on startup
    /// parameters.
    pub fn compute_spec(&self, name: &str) -> Option<ComputeSpec> {
        self.state.lock().unwrap().compute_specs.get(name).cloned()
    }

    /// The spec an endpoint was created with.
    pub fn endpoint_spec(&self, name: &str) -> Option<EndpointSpec> {
        self.state.lock().unwrap().endpoints.get(name).cloned()
    }

    pub fn endpoint_names(&self) -> Vec<String> {
        self.state.lock().unwrap().endpoints.keys().cloned().collect()
    }
}

#[async_trait]
impl Orchestrator for FakeCluster {
    async fn create_compute(&self, spec: ComputeSpec) -> Result<ComputeResource> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_create_compute) {
            return Err(Error::Transient("scripted create failure".into()));
        }
        state.counter += 1;
        let name = format!("podbench-worker-{:04}", state.counter);
        let compute = ComputeResource {
            name: name.clone(),
            meta: spec.meta.clone(),
            image: Some(spec.image.clone()),
            phase: Some("Pending".to_string()),
            ready: false,
            deleting: false,
            created_at: Some(Utc::now()),
        };
        state.compute_specs.insert(name.clone(), spec);
        state.computes.insert(name, compute.clone());
        state.emit(ResourceEventKind::Added, &compute);
        Ok(compute)
    }

    async fn create_endpoint(&self, spec: EndpointSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_create_endpoint) {
            return Err(Error::Transient("scripted create failure".into()));
        }
        state.counter += 1;
        let name = format!("podbench-endpoint-{:04}", state.counter);
        state.endpoints.insert(name.clone(), spec);
        Ok(name)
    }

    async fn delete_compute(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_delete_compute) {
            return Err(Error::Transient("scripted delete failure".into()));
        }
        if let Some(compute) = state.computes.remove(name) {
            state.compute_specs.remove(name);
            state.emit(ResourceEventKind::Deleted, &compute);
        }
        // Absent resources delete successfully.
        Ok(())
    }

    async fn delete_endpoint(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_delete_endpoint) {
            return Err(Error::Transient("scripted delete failure".into()));
        }
        state.endpoints.remove(name);
        Ok(())
    }

    async fn read_compute(&self, name: &str) -> Result<ComputeResource> {
        self.state
            .lock()
            .unwrap()
            .computes
            .get(name)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn list_by_label(&self, selector: &str) -> Result<Vec<ComputeResource>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .computes
            .values()
            .filter(|c| matches_selector(selector, &c.meta.labels))
            .cloned()
            .collect())
    }

    async fn open_watch(&self, selector: &str) -> Result<Box<dyn ResourceWatch>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap();
        // Replay the current matching set as Added events, then stream.
        for compute in state.computes.values() {
            if matches_selector(selector, &compute.meta.labels) {
                let _ = tx.send(Ok(ResourceEvent {
                    kind: ResourceEventKind::Added,
                    compute: compute.clone(),
                }));
            }
        }
        state.watchers.push(Watcher {
            selector: selector.to_string(),
            tx,
        });
        Ok(Box::new(FakeWatch { rx }))
    }
}

struct FakeWatch {
    rx: mpsc::UnboundedReceiver<Result<ResourceEvent>>,
}

#[async_trait]
impl ResourceWatch for FakeWatch {
    async fn next(&mut self) -> Option<Result<ResourceEvent>> {
        self.rx.recv().await
    }
}
