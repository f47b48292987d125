//! Table-backed ownership registry using Diesel.
//!
//! Rows are soft-deleted only, so a delete can always be observed as
//! logically successful and repeated deletes converge. Concurrent create
//! and soft-delete on the same (owner, token) key rely on the store's own
//! row-level consistency; no application-level locking is layered on top.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::OwnershipRegistry;
use crate::db::model::{InstanceRow, STATE_CREATED, STATE_DELETED};
use crate::db::schema::instances;
use crate::db::DbPool;
use crate::domain::{AccessToken, Instance, InstanceId, InstanceState, OwnerId};
use crate::error::{Error, Result};

/// SQLite-backed ownership registry.
pub struct DurableRegistry {
    pool: DbPool,
}

impl DurableRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<impl std::ops::DerefMut<Target = SqliteConnection>> {
        self.pool.get().map_err(|e| Error::Internal(e.to_string()))
    }

    fn to_row(instance: &Instance) -> InstanceRow {
        InstanceRow {
            instance_id: instance.instance_id.to_string(),
            owner_id: instance.owner_id.to_string(),
            access_token: instance.access_token.to_string(),
            compute_ref: instance.compute_ref.clone(),
            endpoint_ref: instance.endpoint_ref.clone(),
            display_name: instance.display_name.clone(),
            image_ref: instance.image_ref.clone(),
            state: STATE_CREATED.to_string(),
            created_at: instance.created_at.to_rfc3339(),
        }
    }

    fn from_row(row: InstanceRow) -> Result<Instance> {
        let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| Error::Internal(e.to_string()))?
            .with_timezone(&Utc);
        let state = if row.state == STATE_DELETED {
            InstanceState::Deleted
        } else {
            InstanceState::Provisioning
        };

        Ok(Instance {
            instance_id: InstanceId::new(row.instance_id),
            owner_id: OwnerId::new(row.owner_id),
            access_token: AccessToken::new(row.access_token),
            compute_ref: row.compute_ref,
            endpoint_ref: row.endpoint_ref,
            display_name: row.display_name,
            image_ref: row.image_ref,
            state,
            created_at,
        })
    }
}

#[async_trait::async_trait]
impl OwnershipRegistry for DurableRegistry {
    async fn record_creation(&self, instance: &Instance) -> Result<()> {
        let row = Self::to_row(instance);
        let mut conn = self.conn()?;

        diesel::insert_into(instances::table)
            .values(&row)
            .execute(&mut *conn)
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => Error::Internal("duplicate (owner, access_token) key".to_string()),
                other => Error::Internal(other.to_string()),
            })?;

        Ok(())
    }

    async fn mark_deleted(&self, instance_id: &InstanceId) -> Result<()> {
        let mut conn = self.conn()?;

        // Zero affected rows means already deleted or never recorded; both
        // are fine, the operation is idempotent.
        diesel::update(instances::table.find(instance_id.as_str()))
            .set(instances::state.eq(STATE_DELETED))
            .execute(&mut *conn)
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }

    async fn list_active(&self, owner_id: &OwnerId) -> Result<Vec<Instance>> {
        let mut conn = self.conn()?;

        let rows: Vec<InstanceRow> = instances::table
            .filter(instances::owner_id.eq(owner_id.as_str()))
            .filter(instances::state.ne(STATE_DELETED))
            .order(instances::created_at.asc())
            .load(&mut *conn)
            .map_err(|e| Error::Internal(e.to_string()))?;

        rows.into_iter().map(Self::from_row).collect()
    }

    async fn find_instance(&self, instance_id: &InstanceId) -> Result<Instance> {
        let mut conn = self.conn()?;

        let row: Option<InstanceRow> = instances::table
            .find(instance_id.as_str())
            .first(&mut *conn)
            .optional()
            .map_err(|e| Error::Internal(e.to_string()))?;

        row.map(Self::from_row).transpose()?.ok_or(Error::NotFound)
    }

    async fn find_owner(&self, instance_id: &InstanceId) -> Result<OwnerId> {
        let mut conn = self.conn()?;

        let owner: Option<String> = instances::table
            .find(instance_id.as_str())
            .select(instances::owner_id)
            .first(&mut *conn)
            .optional()
            .map_err(|e| Error::Internal(e.to_string()))?;

        owner.map(OwnerId::new).ok_or(Error::NotFound)
    }
}
