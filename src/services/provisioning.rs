//! Resource-pair provisioning orchestrator.
//!
//! Keeps the record store consistent with the external control plane without
//! a transaction spanning both. Creation is external-first with a
//! compensating delete when the local write fails; deletion is local-first so
//! a failed external cleanup leaks an orphaned credential rather than leaving
//! a dangling local reference.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use super::Actor;
use crate::audit::{AuditAction, AuditEntry, AuditRecorder};
use crate::clients::{ClientError, GatewayClient};
use crate::store::{ProvisionedResource, RecordStore, ResourceStatus, StoreError};

const RESOURCE_TYPE: &str = "APIKey";

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The control plane rejected the mint or quota binding. Nothing was
    /// persisted locally.
    #[error("external provisioning failed: {0}")]
    ExternalProvisionFailed(#[source] ClientError),

    /// The local write failed. Any credential minted in the same call has
    /// been compensated (best-effort).
    #[error("failed to persist resource record: {0}")]
    PersistFailed(#[source] StoreError),

    /// A caller-supplied external id is already referenced by a local row.
    #[error("external resource '{0}' is already registered")]
    DuplicateExternalResource(String),

    #[error("not authorized")]
    NotAuthorized,

    #[error("resource not found")]
    NotFound,

    /// An external call timed out. The side effect may have landed; callers
    /// must not blindly retry a create.
    #[error("external call timed out, outcome unknown")]
    Timeout(#[source] ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProvisionError {
    fn external(err: ClientError) -> Self {
        if err.is_timeout() {
            ProvisionError::Timeout(err)
        } else {
            ProvisionError::ExternalProvisionFailed(err)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateResourceRequest {
    pub name: String,
    pub description: Option<String>,
    pub bound_policy_id: String,
    /// Bring-your-own external credential id; skips minting.
    pub external_resource_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedResource {
    pub resource: ProvisionedResource,
    /// Present only when the credential was minted in this call. Returned
    /// exactly once and never persisted.
    pub secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusUpdate {
    pub resource: ProvisionedResource,
    /// Set when the control-plane mirror of the status could not be updated.
    /// The record store remains the source of truth.
    pub warning: Option<String>,
}

/// Coordinates the gateway and the record store for resource-pair
/// create/read/update/delete.
pub struct ProvisioningService {
    gateway: Arc<dyn GatewayClient>,
    store: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditRecorder>,
    quota_plan_id: String,
}

impl ProvisioningService {
    pub fn new(
        gateway: Arc<dyn GatewayClient>,
        store: Arc<dyn RecordStore>,
        audit: Arc<dyn AuditRecorder>,
        quota_plan_id: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            store,
            audit,
            quota_plan_id: quota_plan_id.into(),
        }
    }

    /// Two-step provisioning: external create first, local persist second,
    /// compensating external delete when the persist fails.
    pub async fn create(
        &self,
        actor: &Actor,
        request: CreateResourceRequest,
    ) -> Result<CreatedResource, ProvisionError> {
        let (external_id, secret) = match &request.external_resource_id {
            // Bring-your-own: the external reference must be globally unique
            // across all tenants.
            Some(external_id) => {
                if self.store.find_by_external_id(external_id).await?.is_some() {
                    self.audit_failure(
                        actor,
                        AuditAction::Create,
                        "external_resource_id",
                        format!("external resource '{}' already registered", external_id),
                    )
                    .await;
                    return Err(ProvisionError::DuplicateExternalResource(external_id.clone()));
                }
                (external_id.clone(), None)
            }
            None => {
                let minted = match self
                    .gateway
                    .create_resource(&request.name, request.description.as_deref())
                    .await
                {
                    Ok(minted) => minted,
                    Err(e) => {
                        self.audit_failure(actor, AuditAction::Create, "name", e.to_string())
                            .await;
                        return Err(ProvisionError::external(e));
                    }
                };

                // A mint that cannot be bound to its quota is unusable; undo it.
                if let Err(e) = self
                    .gateway
                    .bind_to_quota(&minted.external_id, &self.quota_plan_id)
                    .await
                {
                    if let Err(cleanup) = self.gateway.delete_resource(&minted.external_id).await {
                        error!(
                            external_id = %minted.external_id,
                            "Failed to clean up unbindable gateway credential: {}", cleanup
                        );
                    }
                    self.audit_failure(actor, AuditAction::Create, "name", e.to_string())
                        .await;
                    return Err(ProvisionError::external(e));
                }

                (minted.external_id, Some(minted.secret))
            }
        };

        let minted_here = secret.is_some();
        let now = Utc::now();
        let resource = ProvisionedResource {
            resource_id: Uuid::new_v4(),
            name: request.name.clone(),
            description: request.description.clone(),
            external_resource_id: external_id.clone(),
            bound_policy_id: request.bound_policy_id.clone(),
            tenant_id: actor.tenant_id.clone(),
            status: ResourceStatus::Active,
            created_at: now,
            updated_at: now,
        };

        if let Err(persist_err) = self.store.insert_new(&resource).await {
            // Compensation: only a credential created in this same call is
            // rolled back. The original persist failure is what the caller
            // sees; a failed compensating delete is logged as a residual leak.
            if minted_here {
                if let Err(e) = self
                    .gateway
                    .unbind_from_quota(&external_id, &self.quota_plan_id)
                    .await
                {
                    warn!(external_id = %external_id, "Compensating quota unbind failed: {}", e);
                }
                if let Err(e) = self.gateway.delete_resource(&external_id).await {
                    error!(
                        external_id = %external_id,
                        "Compensating gateway delete failed, external resource leaked: {}", e
                    );
                }
            }
            self.audit_failure(actor, AuditAction::Create, "name", persist_err.to_string())
                .await;
            // A lost race on the external-id index is the same caller error
            // as a failed precheck, not an internal persist failure.
            return Err(match persist_err {
                StoreError::DuplicateExternal(id) => ProvisionError::DuplicateExternalResource(id),
                other => ProvisionError::PersistFailed(other),
            });
        }

        self.audit
            .record(
                AuditEntry::success(&actor.user, &actor.tenant_id, AuditAction::Create, RESOURCE_TYPE, "name")
                    .with_change(None, Some(request.name)),
            )
            .await;

        Ok(CreatedResource { resource, secret })
    }

    /// Ownership-checked point read. Cross-tenant reads are rejected with
    /// `NotAuthorized`, consistently with delete and update.
    pub async fn get(
        &self,
        actor: &Actor,
        resource_id: Uuid,
    ) -> Result<ProvisionedResource, ProvisionError> {
        let resource = self
            .store
            .get(resource_id)
            .await?
            .ok_or(ProvisionError::NotFound)?;
        if resource.tenant_id != actor.tenant_id {
            return Err(ProvisionError::NotAuthorized);
        }
        Ok(resource)
    }

    /// Tenant-scoped listing, newest first.
    pub async fn list(
        &self,
        actor: &Actor,
        status: Option<ResourceStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProvisionedResource>, ProvisionError> {
        Ok(self
            .store
            .list_by_tenant(&actor.tenant_id, status, limit, offset)
            .await?)
    }

    /// Update the status field and best-effort mirror the enabled flag to
    /// the control plane. A gateway failure downgrades to a warning; the
    /// record store is authoritative for status.
    pub async fn update_status(
        &self,
        actor: &Actor,
        resource_id: Uuid,
        status: ResourceStatus,
    ) -> Result<StatusUpdate, ProvisionError> {
        let existing = self.get(actor, resource_id).await?;
        let previous_status = existing.status;

        let resource = self.store.update_status(resource_id, status).await?;

        let enabled = status == ResourceStatus::Active;
        let warning = match self
            .gateway
            .set_enabled(&resource.external_resource_id, enabled)
            .await
        {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    external_id = %resource.external_resource_id,
                    "Failed to mirror status to gateway: {}", e
                );
                Some(
                    "The gateway credential could not be updated; only the local status changed."
                        .to_string(),
                )
            }
        };

        self.audit
            .record(
                AuditEntry::success(&actor.user, &actor.tenant_id, AuditAction::Update, RESOURCE_TYPE, "status")
                    .with_change(
                        Some(previous_status.as_str().to_string()),
                        Some(status.as_str().to_string()),
                    ),
            )
            .await;

        Ok(StatusUpdate { resource, warning })
    }

    /// Two-step de-provisioning: local delete first (with tenant-ownership
    /// precondition), then external delete. External failures are logged and
    /// tolerated; a later sweep or manual cleanup collects the leak.
    pub async fn delete(&self, actor: &Actor, resource_id: Uuid) -> Result<(), ProvisionError> {
        let resource = match self.store.get(resource_id).await? {
            Some(resource) => resource,
            None => {
                self.audit_failure(actor, AuditAction::Delete, "resource_id", "resource not found")
                    .await;
                return Err(ProvisionError::NotFound);
            }
        };
        if resource.tenant_id != actor.tenant_id {
            self.audit_failure(
                actor,
                AuditAction::Delete,
                "resource_id",
                "cross-tenant delete rejected",
            )
            .await;
            return Err(ProvisionError::NotAuthorized);
        }

        // The ownership predicate is re-checked at write time; a row that
        // vanished since the read is reported as not found.
        let deleted = self.store.delete_owned(resource_id, &actor.tenant_id).await?;
        if !deleted {
            return Err(ProvisionError::NotFound);
        }

        if let Err(e) = self
            .gateway
            .unbind_from_quota(&resource.external_resource_id, &self.quota_plan_id)
            .await
        {
            warn!(
                external_id = %resource.external_resource_id,
                "Failed to unbind gateway credential from quota: {}", e
            );
        }
        if let Err(e) = self.gateway.delete_resource(&resource.external_resource_id).await {
            warn!(
                external_id = %resource.external_resource_id,
                "Local row deleted but gateway credential cleanup failed: {}", e
            );
        }

        self.audit
            .record(
                AuditEntry::success(&actor.user, &actor.tenant_id, AuditAction::Delete, RESOURCE_TYPE, "name")
                    .with_change(Some(resource.name), None),
            )
            .await;

        Ok(())
    }

    async fn audit_failure(
        &self,
        actor: &Actor,
        action: AuditAction,
        field: &str,
        detail: impl Into<String>,
    ) {
        self.audit
            .record(AuditEntry::failure(
                &actor.user,
                &actor.tenant_id,
                action,
                RESOURCE_TYPE,
                field,
                detail,
            ))
            .await;
    }
}
