//! Cascading account-lifecycle propagation.
//!
//! A tenant-wide deletion request is committed by a single billing-metadata
//! write, then mirrored onto every identity in the tenant through a
//! page-bounded concurrent fan-out. Both directions (request and restore)
//! are idempotent at the per-identity level, so stragglers from a partial
//! fan-out converge by re-invoking the same operation.

use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use super::Actor;
use crate::audit::{AuditAction, AuditEntry, AuditRecorder};
use crate::clients::{BillingClient, BillingSubject, ClientError, DirectoryClient};

/// Custom attribute mirrored onto every identity of a flagged tenant.
pub const DELETION_REQUESTED_AT_ATTR: &str = "custom:deletionRequestedAt";

/// Billing-subject metadata field acting as the authoritative trigger.
pub const DELETION_REQUESTED_AT_FIELD: &str = "deletionRequestedAt";

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("admin privileges required")]
    NotAuthorized,

    /// The authoritative billing write failed; no identities were touched.
    #[error("billing update failed: {0}")]
    BillingFailed(#[source] ClientError),

    /// A directory listing failed mid-cascade. The billing flag may already
    /// be set; re-invoking the operation converges the remaining identities.
    #[error("directory listing failed: {0}")]
    DirectoryFailed(#[source] ClientError),

    /// An external call timed out. Outcome ambiguous; check the status
    /// before retrying.
    #[error("external call timed out, outcome unknown")]
    Timeout(#[source] ClientError),
}

impl LifecycleError {
    fn billing(err: ClientError) -> Self {
        if err.is_timeout() {
            LifecycleError::Timeout(err)
        } else {
            LifecycleError::BillingFailed(err)
        }
    }

    fn directory(err: ClientError) -> Self {
        if err.is_timeout() {
            LifecycleError::Timeout(err)
        } else {
            LifecycleError::DirectoryFailed(err)
        }
    }
}

/// Outcome of one identity fan-out pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FanOutSummary {
    /// Identities whose attribute update succeeded.
    pub updated: u32,
    /// Identities whose update failed; not retried within the call.
    pub failed: u32,
}

impl FanOutSummary {
    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }
}

#[derive(Debug, Serialize)]
pub struct DeletionRequested {
    pub deletion_requested_at: DateTime<Utc>,
    pub fan_out: FanOutSummary,
}

#[derive(Debug, Serialize)]
pub struct AccountRestored {
    pub fan_out: FanOutSummary,
}

/// Composite deletion state derived from the billing record.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeletionStatus {
    Active,
    PendingDeletion {
        deletion_requested_at: DateTime<Utc>,
        eligible_at: DateTime<Utc>,
        days_remaining: i64,
        /// Identities currently matching the tenant attribute. Informational,
        /// not a consistency proof.
        affected_users: u32,
    },
    /// The billing provider has permanently erased the subject.
    PermanentlyDeleted,
}

/// Coordinates the billing record and the identity directory for
/// tenant-wide deletion request, restore, and status.
pub struct LifecycleService {
    directory: Arc<dyn DirectoryClient>,
    billing: Arc<dyn BillingClient>,
    audit: Arc<dyn AuditRecorder>,
    grace_period_days: i64,
}

impl LifecycleService {
    pub fn new(
        directory: Arc<dyn DirectoryClient>,
        billing: Arc<dyn BillingClient>,
        audit: Arc<dyn AuditRecorder>,
        grace_period_days: i64,
    ) -> Self {
        Self {
            directory,
            billing,
            audit,
            grace_period_days,
        }
    }

    /// Flag the tenant for deletion. Admin-only.
    ///
    /// The billing write is the commit point: if it fails, nothing else
    /// happened. The identity fan-out that follows tolerates per-identity
    /// failures; the returned summary tells the operator whether to
    /// re-invoke (idempotent) to converge stragglers.
    pub async fn request_deletion(&self, actor: &Actor) -> Result<DeletionRequested, LifecycleError> {
        self.require_admin(actor).await?;

        let requested_at = Utc::now();
        let value = requested_at.to_rfc3339_opts(SecondsFormat::Millis, true);

        if let Err(e) = self
            .billing
            .set_metadata_field(&actor.tenant_id, DELETION_REQUESTED_AT_FIELD, Some(&value))
            .await
        {
            self.audit_outcome(actor, false, None, Some(e.to_string())).await;
            return Err(LifecycleError::billing(e));
        }

        let fan_out = match self.propagate(&actor.tenant_id, Some(value.clone())).await {
            Ok(summary) => summary,
            Err(e) => {
                // The billing flag is already set; the tenant sits in the
                // transient propagating window until the next invocation.
                self.audit_outcome(actor, false, Some(value), Some(e.to_string())).await;
                return Err(e);
            }
        };

        self.audit_outcome(
            actor,
            true,
            Some(value),
            Some(format!(
                "{} of {} identities updated",
                fan_out.updated,
                fan_out.updated + fan_out.failed
            )),
        )
        .await;

        Ok(DeletionRequested {
            deletion_requested_at: requested_at,
            fan_out,
        })
    }

    /// Clear the deletion flag. Admin-only. Symmetric to
    /// [`request_deletion`](Self::request_deletion).
    pub async fn restore_account(&self, actor: &Actor) -> Result<AccountRestored, LifecycleError> {
        self.require_admin(actor).await?;

        if let Err(e) = self
            .billing
            .set_metadata_field(&actor.tenant_id, DELETION_REQUESTED_AT_FIELD, None)
            .await
        {
            self.audit_outcome(actor, false, None, Some(e.to_string())).await;
            return Err(LifecycleError::billing(e));
        }

        let fan_out = match self.propagate(&actor.tenant_id, None).await {
            Ok(summary) => summary,
            Err(e) => {
                self.audit_outcome(actor, false, None, Some(e.to_string())).await;
                return Err(e);
            }
        };

        self.audit_outcome(
            actor,
            true,
            None,
            Some(format!("{} identities restored", fan_out.updated)),
        )
        .await;

        Ok(AccountRestored { fan_out })
    }

    /// Pure read of the composite deletion state. The billing record alone is
    /// authoritative: a status check during the propagating window reports
    /// the state the billing write already committed.
    pub async fn check_deletion_status(&self, actor: &Actor) -> Result<DeletionStatus, LifecycleError> {
        let subject = self
            .billing
            .get_metadata(&actor.tenant_id)
            .await
            .map_err(LifecycleError::billing)?;

        let metadata = match subject {
            BillingSubject::Deleted => return Ok(DeletionStatus::PermanentlyDeleted),
            BillingSubject::Live { metadata } => metadata,
        };

        let raw = match metadata.get(DELETION_REQUESTED_AT_FIELD) {
            Some(raw) if !raw.is_empty() => raw.clone(),
            _ => return Ok(DeletionStatus::Active),
        };

        let requested_at = match DateTime::parse_from_rfc3339(&raw) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                // An unparsable flag is treated as absent rather than failing
                // the whole status check.
                warn!(tenant_id = %actor.tenant_id, "Unparsable deletion flag '{}': {}", raw, e);
                return Ok(DeletionStatus::Active);
            }
        };

        let affected_users = self.count_identities(&actor.tenant_id).await;
        let now = Utc::now();

        Ok(DeletionStatus::PendingDeletion {
            deletion_requested_at: requested_at,
            eligible_at: deletion_eligible_at(requested_at, self.grace_period_days),
            days_remaining: days_until_eligible(requested_at, now, self.grace_period_days),
            affected_users,
        })
    }

    /// Page-bounded fan-out: updates within a page run concurrently, pages
    /// are fetched sequentially so concurrency never exceeds one page width.
    /// Spawned updates survive caller cancellation; no further pages are
    /// fetched once the caller is gone.
    async fn propagate(
        &self,
        tenant_id: &str,
        value: Option<String>,
    ) -> Result<FanOutSummary, LifecycleError> {
        let mut summary = FanOutSummary::default();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .directory
                .list_identities(tenant_id, page_token.as_deref())
                .await
                .map_err(LifecycleError::directory)?;

            let mut handles = Vec::with_capacity(page.identities.len());
            for identity in page.identities {
                let directory = Arc::clone(&self.directory);
                let value = value.clone();
                handles.push(tokio::spawn(async move {
                    directory
                        .update_attribute(&identity.id, DELETION_REQUESTED_AT_ATTR, value.as_deref())
                        .await
                        .map_err(|e| (identity.id, e))
                }));
            }

            for joined in futures::future::join_all(handles).await {
                match joined {
                    Ok(Ok(())) => summary.updated += 1,
                    Ok(Err((identity_id, e))) => {
                        warn!(identity_id = %identity_id, "Identity attribute update failed: {}", e);
                        summary.failed += 1;
                    }
                    Err(e) => {
                        warn!("Identity update task panicked: {}", e);
                        summary.failed += 1;
                    }
                }
            }

            match page.next_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(summary)
    }

    /// Count identities matching the tenant attribute. Best-effort: a listing
    /// failure logs and reports zero, matching the informational nature of
    /// the count.
    async fn count_identities(&self, tenant_id: &str) -> u32 {
        let mut count: u32 = 0;
        let mut page_token: Option<String> = None;

        loop {
            match self.directory.list_identities(tenant_id, page_token.as_deref()).await {
                Ok(page) => {
                    count += page.identities.len() as u32;
                    match page.next_token {
                        Some(token) => page_token = Some(token),
                        None => break,
                    }
                }
                Err(e) => {
                    warn!(tenant_id = %tenant_id, "Identity count failed: {}", e);
                    return 0;
                }
            }
        }

        count
    }

    async fn require_admin(&self, actor: &Actor) -> Result<(), LifecycleError> {
        if actor.is_admin() {
            return Ok(());
        }
        self.audit
            .record(AuditEntry::failure(
                &actor.user,
                &actor.tenant_id,
                AuditAction::Update,
                "Account",
                DELETION_REQUESTED_AT_FIELD,
                "admin privileges required",
            ))
            .await;
        Err(LifecycleError::NotAuthorized)
    }

    async fn audit_outcome(
        &self,
        actor: &Actor,
        success: bool,
        after: Option<String>,
        detail: Option<String>,
    ) {
        let mut entry = if success {
            AuditEntry::success(
                &actor.user,
                &actor.tenant_id,
                AuditAction::Update,
                "Account",
                DELETION_REQUESTED_AT_FIELD,
            )
        } else {
            AuditEntry::failure(
                &actor.user,
                &actor.tenant_id,
                AuditAction::Update,
                "Account",
                DELETION_REQUESTED_AT_FIELD,
                detail.clone().unwrap_or_default(),
            )
        };
        entry = entry.with_change(None, after);
        if let Some(detail) = detail {
            entry = entry.with_detail(detail);
        }
        self.audit.record(entry).await;
    }
}

/// The instant a flagged tenant becomes eligible for permanent erasure.
pub fn deletion_eligible_at(requested_at: DateTime<Utc>, grace_period_days: i64) -> DateTime<Utc> {
    requested_at + Duration::days(grace_period_days)
}

/// Whole days until eligibility, rounded up; zero once the window has passed.
pub fn days_until_eligible(
    requested_at: DateTime<Utc>,
    now: DateTime<Utc>,
    grace_period_days: i64,
) -> i64 {
    const DAY_MILLIS: i64 = 86_400_000;
    let remaining = deletion_eligible_at(requested_at, grace_period_days) - now;
    // Millisecond precision so a sub-second remainder still counts as a day
    let millis = remaining.num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis + DAY_MILLIS - 1) / DAY_MILLIS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        admin_actor, member_actor, InMemoryBilling, InMemoryDirectory, RecordingAudit,
    };

    fn service(
        directory: &Arc<InMemoryDirectory>,
        billing: &Arc<InMemoryBilling>,
        audit: &Arc<RecordingAudit>,
    ) -> LifecycleService {
        LifecycleService::new(
            directory.clone() as Arc<dyn DirectoryClient>,
            billing.clone() as Arc<dyn BillingClient>,
            audit.clone() as Arc<dyn AuditRecorder>,
            90,
        )
    }

    #[tokio::test]
    async fn request_deletion_flags_billing_and_every_identity() {
        let directory = Arc::new(InMemoryDirectory::with_identities("tenant-a", 130, 60));
        let billing = Arc::new(InMemoryBilling::with_subject("tenant-a"));
        let audit = Arc::new(RecordingAudit::new());
        let svc = service(&directory, &billing, &audit);

        let result = svc.request_deletion(&admin_actor("tenant-a")).await.unwrap();

        // 130 identities across three pages at 60 per page
        assert_eq!(result.fan_out.updated, 130);
        assert_eq!(result.fan_out.failed, 0);
        assert!(!result.fan_out.is_partial());
        assert!(billing.metadata_field("tenant-a", DELETION_REQUESTED_AT_FIELD).is_some());
        assert_eq!(directory.count_flagged(DELETION_REQUESTED_AT_ATTR), 130);
    }

    #[tokio::test]
    async fn failing_page_yields_partial_summary() {
        let directory = Arc::new(InMemoryDirectory::with_identities("tenant-a", 130, 60));
        // Force the whole second page (identities 60..120) to fail
        directory.fail_identities(60..120);
        let billing = Arc::new(InMemoryBilling::with_subject("tenant-a"));
        let audit = Arc::new(RecordingAudit::new());
        let svc = service(&directory, &billing, &audit);

        let result = svc.request_deletion(&admin_actor("tenant-a")).await.unwrap();

        assert_eq!(result.fan_out.updated, 70);
        assert_eq!(result.fan_out.failed, 60);
        assert!(result.fan_out.is_partial());
    }

    #[tokio::test]
    async fn request_deletion_is_idempotent() {
        let directory = Arc::new(InMemoryDirectory::with_identities("tenant-a", 5, 60));
        let billing = Arc::new(InMemoryBilling::with_subject("tenant-a"));
        let audit = Arc::new(RecordingAudit::new());
        let svc = service(&directory, &billing, &audit);
        let actor = admin_actor("tenant-a");

        let first = svc.request_deletion(&actor).await.unwrap();
        let audit_entries_after_first = audit.entries().len();
        let second = svc.request_deletion(&actor).await.unwrap();

        assert_eq!(first.fan_out.updated, 5);
        assert_eq!(second.fan_out.updated, 5);
        assert_eq!(directory.count_flagged(DELETION_REQUESTED_AT_ATTR), 5);
        // Exactly one audit entry per invocation, nothing extra
        assert_eq!(audit.entries().len(), audit_entries_after_first + 1);
    }

    #[tokio::test]
    async fn billing_failure_aborts_before_any_fan_out() {
        let directory = Arc::new(InMemoryDirectory::with_identities("tenant-a", 10, 60));
        let billing = Arc::new(InMemoryBilling::with_subject("tenant-a"));
        billing.fail_writes();
        let audit = Arc::new(RecordingAudit::new());
        let svc = service(&directory, &billing, &audit);

        let err = svc.request_deletion(&admin_actor("tenant-a")).await.unwrap_err();

        assert!(matches!(err, LifecycleError::BillingFailed(_)));
        assert_eq!(directory.count_flagged(DELETION_REQUESTED_AT_ATTR), 0);
    }

    #[tokio::test]
    async fn billing_timeout_surfaces_as_ambiguous_timeout() {
        let directory = Arc::new(InMemoryDirectory::with_identities("tenant-a", 10, 60));
        let billing = Arc::new(InMemoryBilling::with_subject("tenant-a"));
        billing.fail_writes_timeout();
        let audit = Arc::new(RecordingAudit::new());
        let svc = service(&directory, &billing, &audit);

        let err = svc.request_deletion(&admin_actor("tenant-a")).await.unwrap_err();

        // The flag may have been written; callers must re-check status
        // instead of treating this as a definite billing failure.
        assert!(matches!(err, LifecycleError::Timeout(_)));
        assert_eq!(directory.count_flagged(DELETION_REQUESTED_AT_ATTR), 0);
    }

    #[tokio::test]
    async fn lifecycle_operations_require_admin() {
        let directory = Arc::new(InMemoryDirectory::with_identities("tenant-a", 3, 60));
        let billing = Arc::new(InMemoryBilling::with_subject("tenant-a"));
        let audit = Arc::new(RecordingAudit::new());
        let svc = service(&directory, &billing, &audit);
        let member = member_actor("tenant-a");

        assert!(matches!(
            svc.request_deletion(&member).await.unwrap_err(),
            LifecycleError::NotAuthorized
        ));
        assert!(matches!(
            svc.restore_account(&member).await.unwrap_err(),
            LifecycleError::NotAuthorized
        ));
        // Status is a read and open to any tenant member
        assert!(svc.check_deletion_status(&member).await.is_ok());
    }

    #[tokio::test]
    async fn restore_clears_billing_flag_and_identities() {
        let directory = Arc::new(InMemoryDirectory::with_identities("tenant-a", 65, 60));
        let billing = Arc::new(InMemoryBilling::with_subject("tenant-a"));
        let audit = Arc::new(RecordingAudit::new());
        let svc = service(&directory, &billing, &audit);
        let actor = admin_actor("tenant-a");

        svc.request_deletion(&actor).await.unwrap();
        let restored = svc.restore_account(&actor).await.unwrap();

        assert_eq!(restored.fan_out.updated, 65);
        assert!(billing.metadata_field("tenant-a", DELETION_REQUESTED_AT_FIELD).is_none());
        assert_eq!(directory.count_flagged(DELETION_REQUESTED_AT_ATTR), 0);
    }

    #[tokio::test]
    async fn status_reflects_billing_record() {
        let directory = Arc::new(InMemoryDirectory::with_identities("tenant-a", 4, 60));
        let billing = Arc::new(InMemoryBilling::with_subject("tenant-a"));
        let audit = Arc::new(RecordingAudit::new());
        let svc = service(&directory, &billing, &audit);
        let actor = admin_actor("tenant-a");

        assert!(matches!(
            svc.check_deletion_status(&actor).await.unwrap(),
            DeletionStatus::Active
        ));

        svc.request_deletion(&actor).await.unwrap();
        match svc.check_deletion_status(&actor).await.unwrap() {
            DeletionStatus::PendingDeletion {
                days_remaining,
                affected_users,
                deletion_requested_at,
                eligible_at,
            } => {
                assert_eq!(affected_users, 4);
                assert_eq!(days_remaining, 90);
                assert_eq!(eligible_at, deletion_requested_at + Duration::days(90));
            }
            other => panic!("expected pending deletion, got {:?}", other),
        }

        billing.mark_deleted("tenant-a");
        assert!(matches!(
            svc.check_deletion_status(&actor).await.unwrap(),
            DeletionStatus::PermanentlyDeleted
        ));
    }

    #[test]
    fn days_remaining_is_monotonic_within_the_window() {
        let requested = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let t1 = "2024-01-10T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let t2 = "2024-02-20T12:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let d1 = days_until_eligible(requested, t1, 90);
        let d2 = days_until_eligible(requested, t2, 90);
        assert!(d1 >= d2);

        let past_window = "2024-04-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(days_until_eligible(requested, past_window, 90), 0);
    }
}
