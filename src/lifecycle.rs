//! Instance lifecycle orchestration.
//!
//! The controller is the only writer of instance state transitions. It
//! validates images, provisions the endpoint/compute pair, stamps
//! ownership metadata, records the instance in the registry, and performs
//! idempotent teardown.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    escape_owner, AccessToken, Instance, InstanceId, InstanceState, OwnerId, ANNOTATION_ENDPOINT,
    ANNOTATION_NAME, ANNOTATION_TOKEN, APP_WORKER, LABEL_APP, LABEL_CONTROLLER, LABEL_INSTANCE,
    LABEL_OWNER,
};
use crate::error::{Error, Result};
use crate::images::ImageCatalog;
use crate::orchestrator::{ComputeSpec, EndpointSpec, Orchestrator, ResourceMeta};
use crate::registry::OwnershipRegistry;

/// Port the embedded notebook application listens on.
const APP_PORT: u16 = 8888;
/// Port the endpoint resource exposes.
const ENDPOINT_PORT: u16 = 80;
const CPU_REQUEST: &str = "1.601";
const MEMORY_REQUEST: &str = "1.601G";

/// Orchestrates creation and idempotent teardown of instances.
pub struct LifecycleController {
    orchestrator: Arc<dyn Orchestrator>,
    registry: Arc<dyn OwnershipRegistry>,
    catalog: ImageCatalog,
    /// Whether this deployment variant fronts each compute unit with a
    /// network endpoint.
    endpoint_enabled: bool,
    /// Identifies this controller process on the resources it creates.
    /// Diagnostic only; never used for routing or ownership.
    controller_id: String,
}

impl LifecycleController {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        registry: Arc<dyn OwnershipRegistry>,
        catalog: ImageCatalog,
        endpoint_enabled: bool,
    ) -> Self {
        Self {
            orchestrator,
            registry,
            catalog,
            endpoint_enabled,
            controller_id: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Short image names callers may request.
    pub fn image_names(&self) -> Vec<String> {
        self.catalog.names().map(String::from).collect()
    }

    /// Create a new instance for the owner.
    ///
    /// Fails fast with `InvalidImage` and zero side effects when the image
    /// is outside the allow-list. The endpoint is provisioned before the
    /// compute unit so the compute startup parameters can carry a base URL
    /// derived from the endpoint's resolved name.
    pub async fn create_instance(
        &self,
        owner_id: &OwnerId,
        image_name: &str,
        display_name: &str,
    ) -> Result<Instance> {
        let image_ref = self
            .catalog
            .resolve(image_name)
            .ok_or_else(|| Error::InvalidImage(image_name.to_string()))?
            .to_string();

        let instance_id = InstanceId::generate();
        let access_token = AccessToken::generate();

        let labels: BTreeMap<String, String> = [
            (LABEL_APP.to_string(), APP_WORKER.to_string()),
            (LABEL_INSTANCE.to_string(), instance_id.to_string()),
            (LABEL_OWNER.to_string(), escape_owner(owner_id.as_str())),
            (LABEL_CONTROLLER.to_string(), self.controller_id.clone()),
        ]
        .into();
        let mut annotations: BTreeMap<String, String> = [
            (ANNOTATION_NAME.to_string(), display_name.to_string()),
            (ANNOTATION_TOKEN.to_string(), access_token.to_string()),
        ]
        .into();

        let endpoint_ref = if self.endpoint_enabled {
            let endpoint = self
                .orchestrator
                .create_endpoint(EndpointSpec {
                    meta: ResourceMeta {
                        labels: labels.clone(),
                        annotations: annotations.clone(),
                    },
                    selector: [(LABEL_INSTANCE.to_string(), instance_id.to_string())].into(),
                    port: ENDPOINT_PORT,
                    target_port: APP_PORT,
                })
                .await?;
            annotations.insert(ANNOTATION_ENDPOINT.to_string(), endpoint.clone());
            Some(endpoint)
        } else {
            None
        };

        // The compute's readiness probe and the client's eventual redirect
        // resolve the same base URL.
        let base_path = match &endpoint_ref {
            Some(endpoint) => format!("/instance/{endpoint}/"),
            None => format!("/instance/{instance_id}/"),
        };

        let compute = match self
            .orchestrator
            .create_compute(ComputeSpec {
                meta: ResourceMeta {
                    labels,
                    annotations,
                },
                image: image_ref.clone(),
                command: vec![
                    "jupyter".to_string(),
                    "notebook".to_string(),
                    "--ip".to_string(),
                    "0.0.0.0".to_string(),
                    "--no-browser".to_string(),
                    format!("--NotebookApp.token={access_token}"),
                    format!("--NotebookApp.base_url={base_path}"),
                ],
                port: APP_PORT,
                readiness_path: format!("{base_path}login"),
                cpu_request: CPU_REQUEST.to_string(),
                memory_request: MEMORY_REQUEST.to_string(),
            })
            .await
        {
            Ok(compute) => compute,
            Err(err) => {
                if let Some(endpoint) = &endpoint_ref {
                    if let Err(cleanup) = self.orchestrator.delete_endpoint(endpoint).await {
                        warn!(endpoint = %endpoint, error = %cleanup,
                            "orphaned endpoint after failed compute creation");
                    }
                }
                return Err(err);
            }
        };

        let instance = Instance {
            instance_id: instance_id.clone(),
            owner_id: owner_id.clone(),
            access_token,
            compute_ref: compute.name.clone(),
            endpoint_ref,
            display_name: display_name.to_string(),
            image_ref,
            state: InstanceState::Provisioning,
            created_at: compute.created_at.unwrap_or_else(Utc::now),
        };

        self.registry.record_creation(&instance).await?;
        info!(instance_id = %instance.instance_id, owner = %owner_id,
            compute = %instance.compute_ref, "instance created");
        Ok(instance)
    }

    /// Tear an instance down.
    ///
    /// Ownership is confirmed first; a mismatched caller gets `Forbidden`
    /// with zero side effects. After that, resource deletions are
    /// individually best-effort — a failure on one never blocks the other —
    /// and the registry record is marked deleted unconditionally, so the
    /// caller always observes successful logical deletion. Partial
    /// infrastructure failures surface only in telemetry.
    pub async fn delete_instance(&self, owner_id: &OwnerId, instance_id: &InstanceId) -> Result<()> {
        let instance = match self.registry.find_instance(instance_id).await {
            Ok(instance) => instance,
            // Unknown ids converge with already-deleted ones: teardown is
            // idempotent and existence is not leaked to non-owners.
            Err(Error::NotFound) => return Ok(()),
            Err(err) => return Err(err),
        };

        if &instance.owner_id != owner_id {
            return Err(Error::Forbidden);
        }

        if let Err(err) = self.orchestrator.delete_compute(&instance.compute_ref).await {
            warn!(instance_id = %instance_id, compute = %instance.compute_ref,
                error = %err, "compute deletion failed, continuing teardown");
        }
        if let Some(endpoint) = &instance.endpoint_ref {
            if let Err(err) = self.orchestrator.delete_endpoint(endpoint).await {
                warn!(instance_id = %instance_id, endpoint = %endpoint,
                    error = %err, "endpoint deletion failed, continuing teardown");
            }
        }

        self.registry.mark_deleted(instance_id).await?;
        info!(instance_id = %instance_id, owner = %owner_id, "instance deleted");
        Ok(())
    }

    /// Owner-scoped list of active instances, with state refreshed from
    /// the live compute resource where one is observable.
    pub async fn list_instances(&self, owner_id: &OwnerId) -> Result<Vec<Instance>> {
        let mut instances = self.registry.list_active(owner_id).await?;
        for instance in &mut instances {
            if instance.state != InstanceState::Provisioning {
                continue;
            }
            if let Ok(compute) = self.orchestrator.read_compute(&instance.compute_ref).await {
                instance.state =
                    InstanceState::project(compute.phase.as_deref(), compute.ready, compute.deleting);
            }
        }
        Ok(instances)
    }

    /// Confirm the caller owns an instance. Used by the reverse proxy to
    /// gate direct access to the instance's embedded application.
    pub async fn verify_ownership(
        &self,
        owner_id: &OwnerId,
        instance_id: &InstanceId,
    ) -> Result<()> {
        let owner = self.registry.find_owner(instance_id).await?;
        if &owner == owner_id {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }
}
