//! Ownership registry: which instances belong to which owner.
//!
//! Two strategies exist and exactly one is selected at startup:
//!
//! - [`LabelRegistry`] — stateless; ownership is derived from labels on the
//!   underlying cluster resources and every lookup is a live query.
//! - [`DurableRegistry`] — table-backed; one soft-deleted-only row per
//!   (owner, access token), enabling idempotent teardown and audit.
//!
//! Callers never query the orchestrator for ownership directly; this trait
//! is the single seam.

mod durable;
mod label;

pub use durable::DurableRegistry;
pub use label::LabelRegistry;

use async_trait::async_trait;

use crate::domain::{Instance, InstanceId, OwnerId};
use crate::error::Result;

/// Owner → instance index.
#[async_trait]
pub trait OwnershipRegistry: Send + Sync {
    /// Record a freshly created instance.
    async fn record_creation(&self, instance: &Instance) -> Result<()>;

    /// Mark an instance deleted. Idempotent: marking an already-deleted or
    /// unknown instance succeeds.
    async fn mark_deleted(&self, instance_id: &InstanceId) -> Result<()>;

    /// Every instance created under this owner and not yet deleted.
    async fn list_active(&self, owner_id: &OwnerId) -> Result<Vec<Instance>>;

    /// Look up one instance, including soft-deleted ones where the
    /// strategy retains them. `NotFound` for unknown ids.
    async fn find_instance(&self, instance_id: &InstanceId) -> Result<Instance>;

    /// Resolve the true owner of an instance. `NotFound` for unknown ids.
    async fn find_owner(&self, instance_id: &InstanceId) -> Result<OwnerId> {
        Ok(self.find_instance(instance_id).await?.owner_id)
    }
}
