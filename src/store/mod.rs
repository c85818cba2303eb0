//! Durable system of record for provisioned resources.
//!
//! One row per resource, referencing the external credential id minted by the
//! control plane. Every row that exists was written strictly after its
//! external counterpart existed; the converse is not guaranteed (a crashed
//! compensation can leak an external resource with no local row).

pub mod postgres;

pub use postgres::PgRecordStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Active,
    Inactive,
    Expired,
    Revoked,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Active => "active",
            ResourceStatus::Inactive => "inactive",
            ResourceStatus::Expired => "expired",
            ResourceStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ResourceStatus::Active),
            "inactive" => Some(ResourceStatus::Inactive),
            "expired" => Some(ResourceStatus::Expired),
            "revoked" => Some(ResourceStatus::Revoked),
            _ => None,
        }
    }
}

/// One externally-backed credential owned by a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedResource {
    pub resource_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Immutable reference into the external control plane.
    pub external_resource_id: String,
    /// Foreign key into the policy entity; opaque to this subsystem.
    pub bound_policy_id: String,
    pub tenant_id: String,
    pub status: ResourceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Errors from the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write's precondition failed (e.g. the id already exists).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The unique external-id index rejected the write: a concurrent insert
    /// already claimed the same external reference.
    #[error("external resource '{0}' is already referenced")]
    DuplicateExternal(String),

    #[error("Record not found")]
    NotFound,

    #[error("Query error: {0}")]
    Query(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new row, failing with [`StoreError::Conflict`] if a row with
    /// the same `resource_id` already exists.
    async fn insert_new(&self, resource: &ProvisionedResource) -> Result<(), StoreError>;

    async fn get(&self, resource_id: Uuid) -> Result<Option<ProvisionedResource>, StoreError>;

    /// Look up a row by its external credential id, across all tenants.
    /// Internally attempts the indexed lookup first and falls back to an
    /// exhaustive scan; callers never see the distinction.
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<ProvisionedResource>, StoreError>;

    /// Tenant-scoped listing, newest first.
    async fn list_by_tenant(
        &self,
        tenant_id: &str,
        status: Option<ResourceStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProvisionedResource>, StoreError>;

    /// Update the status field, returning the updated row.
    async fn update_status(
        &self,
        resource_id: Uuid,
        status: ResourceStatus,
    ) -> Result<ProvisionedResource, StoreError>;

    /// Delete a row conditioned on tenant ownership. Returns `false` when no
    /// row matched both the id and the tenant.
    async fn delete_owned(&self, resource_id: Uuid, tenant_id: &str) -> Result<bool, StoreError>;
}
