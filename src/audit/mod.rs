//! Append-only audit trail of terminal outcomes.
//!
//! Every mutating operation emits exactly one entry per terminal outcome,
//! success or failure. Recording is best-effort and never fails the
//! operation being audited.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Read,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Read => "READ",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub actor: String,
    pub tenant_id: String,
    pub action: AuditAction,
    pub resource_type: &'static str,
    /// The field the mutation touched (or the identifying field for reads).
    pub field: String,
    pub before: Option<String>,
    pub after: Option<String>,
    pub success: bool,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn success(
        actor: &str,
        tenant_id: &str,
        action: AuditAction,
        resource_type: &'static str,
        field: &str,
    ) -> Self {
        Self {
            actor: actor.to_string(),
            tenant_id: tenant_id.to_string(),
            action,
            resource_type,
            field: field.to_string(),
            before: None,
            after: None,
            success: true,
            detail: None,
            at: Utc::now(),
        }
    }

    pub fn failure(
        actor: &str,
        tenant_id: &str,
        action: AuditAction,
        resource_type: &'static str,
        field: &str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            actor: actor.to_string(),
            tenant_id: tenant_id.to_string(),
            action,
            resource_type,
            field: field.to_string(),
            before: None,
            after: None,
            success: false,
            detail: Some(detail.into()),
            at: Utc::now(),
        }
    }

    pub fn with_change(mut self, before: Option<String>, after: Option<String>) -> Self {
        self.before = before;
        self.after = after;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Consumer seam for the audit log. The durable implementation lives with the
/// plain CRUD layer; this subsystem only produces entries.
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

/// Recorder that emits entries as structured tracing events.
pub struct TracingAuditRecorder;

#[async_trait]
impl AuditRecorder for TracingAuditRecorder {
    async fn record(&self, entry: AuditEntry) {
        info!(
            target: "audit",
            actor = %entry.actor,
            tenant_id = %entry.tenant_id,
            action = entry.action.as_str(),
            resource_type = entry.resource_type,
            field = %entry.field,
            before = entry.before.as_deref().unwrap_or(""),
            after = entry.after.as_deref().unwrap_or(""),
            success = entry.success,
            detail = entry.detail.as_deref().unwrap_or(""),
            "audit"
        );
    }
}
