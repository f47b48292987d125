//! Row types for the instances table.

use diesel::prelude::*;

use super::schema::instances;

/// State flag for a live registry row.
pub const STATE_CREATED: &str = "created";
/// State flag for a soft-deleted registry row. Rows are never physically
/// removed.
pub const STATE_DELETED: &str = "deleted";

/// One persisted instance record.
#[derive(Debug, Clone, Queryable, Insertable, Selectable)]
#[diesel(table_name = instances)]
pub struct InstanceRow {
    pub instance_id: String,
    pub owner_id: String,
    pub access_token: String,
    pub compute_ref: String,
    pub endpoint_ref: Option<String>,
    pub display_name: String,
    pub image_ref: String,
    pub state: String,
    pub created_at: String,
}
