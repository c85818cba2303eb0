use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use super::{ProvisionedResource, RecordStore, ResourceStatus, StoreError};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS provisioned_resources (
    resource_id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    external_resource_id TEXT NOT NULL,
    bound_policy_id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_EXTERNAL_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_provisioned_resources_external
    ON provisioned_resources (external_resource_id)
"#;

const CREATE_TENANT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_provisioned_resources_tenant_created
    ON provisioned_resources (tenant_id, created_at DESC)
"#;

const COLUMNS: &str = "resource_id, name, description, external_resource_id, \
                       bound_policy_id, tenant_id, status, created_at, updated_at";

/// Postgres-backed record store.
pub struct PgRecordStore {
    pool: PgPool,
}

#[derive(FromRow)]
struct ResourceRow {
    resource_id: Uuid,
    name: String,
    description: Option<String>,
    external_resource_id: String,
    bound_policy_id: String,
    tenant_id: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ResourceRow> for ProvisionedResource {
    type Error = StoreError;

    fn try_from(row: ResourceRow) -> Result<Self, StoreError> {
        let status = ResourceStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Query(format!("unknown resource status '{}'", row.status)))?;
        Ok(ProvisionedResource {
            resource_id: row.resource_id,
            name: row.name,
            description: row.description,
            external_resource_id: row.external_resource_id,
            bound_policy_id: row.bound_policy_id,
            tenant_id: row.tenant_id,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema. Idempotent; run at startup.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_EXTERNAL_INDEX).execute(&self.pool).await?;
        sqlx::query(CREATE_TENANT_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_new(&self, resource: &ProvisionedResource) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO provisioned_resources \
             (resource_id, name, description, external_resource_id, bound_policy_id, \
              tenant_id, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (resource_id) DO NOTHING",
        )
        .bind(resource.resource_id)
        .bind(&resource.name)
        .bind(&resource.description)
        .bind(&resource.external_resource_id)
        .bind(&resource.bound_policy_id)
        .bind(&resource.tenant_id)
        .bind(resource.status.as_str())
        .bind(resource.created_at)
        .bind(resource.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            // Two near-simultaneous creates supplying the same external id
            // both pass the precheck; the loser trips the unique index here.
            sqlx::Error::Database(db)
                if db.code().as_deref() == Some("23505")
                    && db.constraint() == Some("idx_provisioned_resources_external") =>
            {
                StoreError::DuplicateExternal(resource.external_resource_id.clone())
            }
            _ => StoreError::Sqlx(e),
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "resource {} already exists",
                resource.resource_id
            )));
        }
        Ok(())
    }

    async fn get(&self, resource_id: Uuid) -> Result<Option<ProvisionedResource>, StoreError> {
        let row: Option<ResourceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM provisioned_resources WHERE resource_id = $1",
            COLUMNS
        ))
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProvisionedResource::try_from).transpose()
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<ProvisionedResource>, StoreError> {
        // Fast path: indexed equality lookup
        let indexed: Result<Option<ResourceRow>, sqlx::Error> = sqlx::query_as(&format!(
            "SELECT {} FROM provisioned_resources WHERE external_resource_id = $1 LIMIT 1",
            COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await;

        let row = match indexed {
            Ok(row) => row,
            // Connection-level failures are terminal; query failures fall back
            // to the exhaustive scan (schemas predating the external-id index)
            Err(sqlx::Error::Io(e)) => return Err(StoreError::Sqlx(sqlx::Error::Io(e))),
            Err(sqlx::Error::PoolTimedOut) => return Err(StoreError::Sqlx(sqlx::Error::PoolTimedOut)),
            Err(e) => {
                warn!("Indexed external-id lookup failed, falling back to scan: {}", e);
                let rows: Vec<ResourceRow> =
                    sqlx::query_as(&format!("SELECT {} FROM provisioned_resources", COLUMNS))
                        .fetch_all(&self.pool)
                        .await?;
                rows.into_iter()
                    .find(|r| r.external_resource_id == external_id)
            }
        };

        row.map(ProvisionedResource::try_from).transpose()
    }

    async fn list_by_tenant(
        &self,
        tenant_id: &str,
        status: Option<ResourceStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProvisionedResource>, StoreError> {
        let rows: Vec<ResourceRow> = match status {
            Some(status) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM provisioned_resources \
                     WHERE tenant_id = $1 AND status = $2 \
                     ORDER BY created_at DESC LIMIT $3 OFFSET $4",
                    COLUMNS
                ))
                .bind(tenant_id)
                .bind(status.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM provisioned_resources \
                     WHERE tenant_id = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                    COLUMNS
                ))
                .bind(tenant_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(ProvisionedResource::try_from).collect()
    }

    async fn update_status(
        &self,
        resource_id: Uuid,
        status: ResourceStatus,
    ) -> Result<ProvisionedResource, StoreError> {
        let row: Option<ResourceRow> = sqlx::query_as(&format!(
            "UPDATE provisioned_resources SET status = $2, updated_at = $3 \
             WHERE resource_id = $1 RETURNING {}",
            COLUMNS
        ))
        .bind(resource_id)
        .bind(status.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProvisionedResource::try_from)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }

    async fn delete_owned(&self, resource_id: Uuid, tenant_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM provisioned_resources WHERE resource_id = $1 AND tenant_id = $2",
        )
        .bind(resource_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Health probe used by the `/health` endpoint.
pub async fn ping(pool: &PgPool) -> Result<(), StoreError> {
    let row = sqlx::query("SELECT 1 AS one").fetch_one(pool).await?;
    let _: i32 = row.try_get("one")?;
    Ok(())
}
