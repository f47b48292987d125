//! Kubernetes implementation of the orchestrator trait.
//!
//! Compute units are Pods, network endpoints are Services, both in a
//! single configured namespace. Every unary call is wrapped in the shared
//! per-call timeout; the long-lived watch is only bounded by its consumer.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, Pod, PodSpec, Probe, ResourceRequirements, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, DeleteParams, ListParams, PostParams, WatchEvent, WatchParams};
use kube::Client;
use tracing::debug;

use super::{
    ComputeResource, ComputeSpec, EndpointSpec, Orchestrator, ResourceEvent, ResourceEventKind,
    ResourceMeta, ResourceWatch,
};
use crate::error::{Error, Result};

/// generateName prefix for compute units.
const COMPUTE_PREFIX: &str = "podbench-worker-";
/// generateName prefix for network endpoints.
const ENDPOINT_PREFIX: &str = "podbench-endpoint-";

/// Production orchestrator backed by the Kubernetes API.
pub struct KubeOrchestrator {
    pods: Api<Pod>,
    services: Api<Service>,
    timeout: Duration,
}

impl KubeOrchestrator {
    pub fn new(client: Client, namespace: &str, timeout: Duration) -> Self {
        Self {
            pods: Api::namespaced(client.clone(), namespace),
            services: Api::namespaced(client, namespace),
            timeout,
        }
    }

    /// Apply the per-call timeout to a unary cluster call.
    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = kube::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(map_kube_err(err)),
            Err(_) => Err(Error::Transient(format!(
                "cluster call exceeded {}s",
                self.timeout.as_secs_f64()
            ))),
        }
    }
}

fn map_kube_err(err: kube::Error) -> Error {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => Error::NotFound,
        kube::Error::Api(resp) => Error::Internal(resp.to_string()),
        other => Error::Transient(other.to_string()),
    }
}

fn compute_from_pod(pod: Pod) -> ComputeResource {
    let meta = pod.metadata;
    let image = pod
        .spec
        .as_ref()
        .and_then(|s| s.containers.first())
        .and_then(|c| c.image.clone());
    let status = pod.status.unwrap_or_default();
    let ready = status
        .conditions
        .as_ref()
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);
    ComputeResource {
        name: meta.name.unwrap_or_default(),
        meta: ResourceMeta {
            labels: meta.labels.unwrap_or_default(),
            annotations: meta.annotations.unwrap_or_default(),
        },
        image,
        phase: status.phase,
        ready,
        deleting: meta.deletion_timestamp.is_some(),
        created_at: meta.creation_timestamp.map(|t| t.0),
    }
}

fn pod_template(spec: ComputeSpec) -> Pod {
    Pod {
        metadata: ObjectMeta {
            generate_name: Some(COMPUTE_PREFIX.to_string()),
            labels: Some(spec.meta.labels),
            annotations: Some(spec.meta.annotations),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "default".to_string(),
                image: Some(spec.image),
                command: Some(spec.command),
                ports: Some(vec![ContainerPort {
                    container_port: i32::from(spec.port),
                    ..Default::default()
                }]),
                resources: Some(ResourceRequirements {
                    requests: Some(BTreeMap::from([
                        ("cpu".to_string(), Quantity(spec.cpu_request)),
                        ("memory".to_string(), Quantity(spec.memory_request)),
                    ])),
                    ..Default::default()
                }),
                readiness_probe: Some(Probe {
                    http_get: Some(HTTPGetAction {
                        path: Some(spec.readiness_path),
                        port: IntOrString::Int(i32::from(spec.port)),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service_template(spec: EndpointSpec) -> Service {
    Service {
        metadata: ObjectMeta {
            generate_name: Some(ENDPOINT_PREFIX.to_string()),
            labels: Some(spec.meta.labels),
            annotations: Some(spec.meta.annotations),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(spec.selector),
            ports: Some(vec![ServicePort {
                port: i32::from(spec.port),
                target_port: Some(IntOrString::Int(i32::from(spec.target_port))),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl Orchestrator for KubeOrchestrator {
    async fn create_compute(&self, spec: ComputeSpec) -> Result<ComputeResource> {
        let pod = self
            .bounded(self.pods.create(&PostParams::default(), &pod_template(spec)))
            .await?;
        let compute = compute_from_pod(pod);
        debug!(name = %compute.name, "compute unit created");
        Ok(compute)
    }

    async fn create_endpoint(&self, spec: EndpointSpec) -> Result<String> {
        let service = self
            .bounded(
                self.services
                    .create(&PostParams::default(), &service_template(spec)),
            )
            .await?;
        let name = service.metadata.name.unwrap_or_default();
        debug!(name = %name, "endpoint created");
        Ok(name)
    }

    async fn delete_compute(&self, name: &str) -> Result<()> {
        let fut = async {
            self.pods
                .delete(name, &DeleteParams::default())
                .await
                .map(|_| ())
        };
        match self.bounded(fut).await {
            // Already gone counts as deleted.
            Err(Error::NotFound) => Ok(()),
            other => other,
        }
    }

    async fn delete_endpoint(&self, name: &str) -> Result<()> {
        let fut = async {
            self.services
                .delete(name, &DeleteParams::default())
                .await
                .map(|_| ())
        };
        match self.bounded(fut).await {
            Err(Error::NotFound) => Ok(()),
            other => other,
        }
    }

    async fn read_compute(&self, name: &str) -> Result<ComputeResource> {
        let pod = self.bounded(self.pods.get(name)).await?;
        Ok(compute_from_pod(pod))
    }

    async fn list_by_label(&self, selector: &str) -> Result<Vec<ComputeResource>> {
        let params = ListParams::default().labels(selector);
        let pods = self.bounded(self.pods.list(&params)).await?;
        Ok(pods.items.into_iter().map(compute_from_pod).collect())
    }

    async fn open_watch(&self, selector: &str) -> Result<Box<dyn ResourceWatch>> {
        let params = WatchParams::default().labels(selector);
        // Resource version "0" replays the current resource set as Added
        // events, so a fresh subscriber starts with a full snapshot.
        let stream = self.bounded(self.pods.watch(&params, "0")).await?;
        Ok(Box::new(KubeWatch {
            inner: stream.boxed(),
        }))
    }
}

/// A live pod watch; ends (or errors) terminally, the consumer reconnects.
struct KubeWatch {
    inner: BoxStream<'static, kube::Result<WatchEvent<Pod>>>,
}

#[async_trait]
impl ResourceWatch for KubeWatch {
    async fn next(&mut self) -> Option<Result<ResourceEvent>> {
        loop {
            return match self.inner.next().await? {
                Ok(WatchEvent::Added(pod)) => Some(Ok(ResourceEvent {
                    kind: ResourceEventKind::Added,
                    compute: compute_from_pod(pod),
                })),
                Ok(WatchEvent::Modified(pod)) => Some(Ok(ResourceEvent {
                    kind: ResourceEventKind::Modified,
                    compute: compute_from_pod(pod),
                })),
                Ok(WatchEvent::Deleted(pod)) => Some(Ok(ResourceEvent {
                    kind: ResourceEventKind::Deleted,
                    compute: compute_from_pod(pod),
                })),
                Ok(WatchEvent::Bookmark(_)) => continue,
                Ok(WatchEvent::Error(status)) => Some(Err(Error::Transient(status.message))),
                Err(err) => Some(Err(Error::Transient(err.to_string()))),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LABEL_INSTANCE;

    #[test]
    fn pod_template_carries_metadata_and_probe() {
        let mut meta = ResourceMeta::default();
        meta.labels
            .insert(LABEL_INSTANCE.to_string(), "i-1".to_string());
        let pod = pod_template(ComputeSpec {
            meta,
            image: "gcr.io/x/hail:1".into(),
            command: vec!["jupyter".into(), "notebook".into()],
            port: 8888,
            readiness_path: "/instance/i-1/login".into(),
            cpu_request: "1.601".into(),
            memory_request: "1.601G".into(),
        });

        assert_eq!(pod.metadata.generate_name.as_deref(), Some(COMPUTE_PREFIX));
        let container = &pod.spec.unwrap().containers[0];
        assert_eq!(container.image.as_deref(), Some("gcr.io/x/hail:1"));
        let probe = container.readiness_probe.as_ref().unwrap();
        assert_eq!(
            probe.http_get.as_ref().unwrap().path.as_deref(),
            Some("/instance/i-1/login")
        );
    }

    #[test]
    fn compute_from_pod_reads_readiness_condition() {
        use k8s_openapi::api::core::v1::{PodCondition, PodStatus};

        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("podbench-worker-x".into()),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some("Running".into()),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".into(),
                    status: "True".into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let compute = compute_from_pod(pod);
        assert_eq!(compute.name, "podbench-worker-x");
        assert!(compute.ready);
        assert!(!compute.deleting);
    }
}
