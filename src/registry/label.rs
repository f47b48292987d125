//! Stateless ownership registry derived from cluster resource labels.
//!
//! There is no independent consistency domain: lookups are live queries
//! through the orchestration adapter, so staleness matches the cluster
//! API's. Creation and deletion are implicit in the resources themselves,
//! which already carry the owner label when provisioned.

use std::sync::Arc;

use chrono::Utc;

use super::OwnershipRegistry;
use crate::domain::{
    escape_owner, instance_selector, owner_selector, unescape_owner, AccessToken, Instance,
    InstanceId, InstanceState, OwnerId, ANNOTATION_ENDPOINT, ANNOTATION_NAME, ANNOTATION_TOKEN,
    LABEL_INSTANCE, LABEL_OWNER,
};
use crate::error::{Error, Result};
use crate::orchestrator::{ComputeResource, Orchestrator};

/// Label-derived ownership registry.
pub struct LabelRegistry {
    orchestrator: Arc<dyn Orchestrator>,
}

impl LabelRegistry {
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Rebuild an instance from a labeled resource. `None` when the
    /// resource was not created by this system or its owner label does not
    /// unescape.
    fn instance_from_resource(resource: &ComputeResource) -> Option<Instance> {
        let instance_id = resource.meta.label(LABEL_INSTANCE)?;
        let owner = unescape_owner(resource.meta.label(LABEL_OWNER)?)?;
        Some(Instance {
            instance_id: InstanceId::new(instance_id),
            owner_id: OwnerId::new(owner),
            access_token: AccessToken::new(
                resource.meta.annotation(ANNOTATION_TOKEN).unwrap_or(""),
            ),
            compute_ref: resource.name.clone(),
            endpoint_ref: resource.meta.annotation(ANNOTATION_ENDPOINT).map(String::from),
            display_name: resource
                .meta
                .annotation(ANNOTATION_NAME)
                .unwrap_or_default()
                .to_string(),
            image_ref: resource.image.clone().unwrap_or_default(),
            state: InstanceState::project(
                resource.phase.as_deref(),
                resource.ready,
                resource.deleting,
            ),
            created_at: resource.created_at.unwrap_or_else(Utc::now),
        })
    }
}

#[async_trait::async_trait]
impl OwnershipRegistry for LabelRegistry {
    async fn record_creation(&self, _instance: &Instance) -> Result<()> {
        // Ownership is already encoded on the provisioned resources.
        Ok(())
    }

    async fn mark_deleted(&self, _instance_id: &InstanceId) -> Result<()> {
        // Deletion of the resources removes the derived record.
        Ok(())
    }

    async fn list_active(&self, owner_id: &OwnerId) -> Result<Vec<Instance>> {
        let expected = escape_owner(owner_id.as_str());
        let resources = self
            .orchestrator
            .list_by_label(&owner_selector(owner_id.as_str()))
            .await?;
        Ok(resources
            .iter()
            .filter(|r| r.meta.label(LABEL_OWNER) == Some(expected.as_str()))
            .filter_map(Self::instance_from_resource)
            .collect())
    }

    async fn find_instance(&self, instance_id: &InstanceId) -> Result<Instance> {
        let resources = self
            .orchestrator
            .list_by_label(&instance_selector(instance_id.as_str()))
            .await?;
        resources
            .first()
            .and_then(Self::instance_from_resource)
            .ok_or(Error::NotFound)
    }
}
