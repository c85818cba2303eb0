//! In-memory fakes for the external collaborators, used by service tests.
//! Behavior mirrors the real systems where the orchestrators depend on it:
//! idempotent gateway deletes, paginated directory listings, conditional
//! store writes.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditRecorder};
use crate::auth::Role;
use crate::clients::{
    BillingClient, BillingSubject, ClientError, DirectoryClient, GatewayClient, Identity,
    IdentityPage, MintedResource,
};
use crate::services::Actor;
use crate::store::{ProvisionedResource, RecordStore, ResourceStatus, StoreError};

pub fn admin_actor(tenant_id: &str) -> Actor {
    Actor {
        user: "admin@example.com".to_string(),
        tenant_id: tenant_id.to_string(),
        role: Role::Admin,
    }
}

pub fn member_actor(tenant_id: &str) -> Actor {
    Actor {
        user: "member@example.com".to_string(),
        tenant_id: tenant_id.to_string(),
        role: Role::Member,
    }
}

fn api_error(service: &'static str, status: u16, message: &str) -> ClientError {
    ClientError::Api {
        service,
        status,
        message: message.to_string(),
    }
}

fn timeout_error(service: &'static str) -> ClientError {
    ClientError::Timeout {
        service,
        timeout: Duration::from_secs(10),
    }
}

// ---------------------------------------------------------------------------
// Gateway

#[derive(Default)]
struct FakeCredential {
    enabled: bool,
    bound: bool,
}

#[derive(Default)]
struct GatewayState {
    credentials: HashMap<String, FakeCredential>,
    next_id: u32,
    fail_next_create: bool,
    fail_next_create_timeout: bool,
    fail_bind: bool,
    fail_next_delete: bool,
    fail_set_enabled: bool,
}

#[derive(Default)]
pub struct InMemoryGateway {
    state: Mutex<GatewayState>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register an externally-created credential (bring-your-own cases).
    pub fn register(&self, external_id: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .credentials
            .insert(external_id.to_string(), FakeCredential { enabled: true, bound: false });
    }

    pub fn contains(&self, external_id: &str) -> bool {
        self.state.lock().unwrap().credentials.contains_key(external_id)
    }

    pub fn is_bound(&self, external_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .credentials
            .get(external_id)
            .map(|c| c.bound)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().credentials.len()
    }

    pub fn fail_next_create(&self) {
        self.state.lock().unwrap().fail_next_create = true;
    }

    /// Make the next mint time out instead of failing outright.
    pub fn fail_next_create_timeout(&self) {
        self.state.lock().unwrap().fail_next_create_timeout = true;
    }

    pub fn fail_bind(&self) {
        self.state.lock().unwrap().fail_bind = true;
    }

    pub fn fail_next_delete(&self) {
        self.state.lock().unwrap().fail_next_delete = true;
    }

    pub fn fail_set_enabled(&self) {
        self.state.lock().unwrap().fail_set_enabled = true;
    }
}

#[async_trait]
impl GatewayClient for InMemoryGateway {
    async fn create_resource(
        &self,
        _name: &str,
        _description: Option<&str>,
    ) -> Result<MintedResource, ClientError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_create {
            state.fail_next_create = false;
            return Err(api_error("gateway", 500, "injected create failure"));
        }
        if state.fail_next_create_timeout {
            state.fail_next_create_timeout = false;
            return Err(timeout_error("gateway"));
        }
        state.next_id += 1;
        let external_id = format!("ext-{:04}", state.next_id);
        state
            .credentials
            .insert(external_id.clone(), FakeCredential { enabled: true, bound: false });
        Ok(MintedResource {
            secret: format!("secret-{}", external_id),
            external_id,
        })
    }

    async fn delete_resource(&self, external_id: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_delete {
            state.fail_next_delete = false;
            return Err(api_error("gateway", 500, "injected delete failure"));
        }
        // Deleting a missing credential succeeds, like the real gateway
        state.credentials.remove(external_id);
        Ok(())
    }

    async fn bind_to_quota(&self, external_id: &str, _quota_plan_id: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_bind {
            return Err(api_error("gateway", 500, "injected bind failure"));
        }
        match state.credentials.get_mut(external_id) {
            Some(credential) => {
                credential.bound = true;
                Ok(())
            }
            None => Err(ClientError::NotFound { service: "gateway" }),
        }
    }

    async fn unbind_from_quota(
        &self,
        external_id: &str,
        _quota_plan_id: &str,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        if let Some(credential) = state.credentials.get_mut(external_id) {
            credential.bound = false;
        }
        Ok(())
    }

    async fn set_enabled(&self, external_id: &str, enabled: bool) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_set_enabled {
            return Err(api_error("gateway", 500, "injected set-enabled failure"));
        }
        match state.credentials.get_mut(external_id) {
            Some(credential) => {
                credential.enabled = enabled;
                Ok(())
            }
            None => Err(ClientError::NotFound { service: "gateway" }),
        }
    }
}

// ---------------------------------------------------------------------------
// Record store

#[derive(Default)]
struct StoreState {
    rows: HashMap<Uuid, ProvisionedResource>,
    fail_next_insert: bool,
    hide_next_external_lookup: bool,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_insert(&self) {
        self.state.lock().unwrap().fail_next_insert = true;
    }

    /// Make the next external-id lookup miss, simulating a racer whose
    /// precheck ran before the competing row became visible.
    pub fn hide_next_external_lookup(&self) {
        self.state.lock().unwrap().hide_next_external_lookup = true;
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().rows.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert_new(&self, resource: &ProvisionedResource) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_insert {
            state.fail_next_insert = false;
            return Err(StoreError::Query("injected insert failure".to_string()));
        }
        if state.rows.contains_key(&resource.resource_id) {
            return Err(StoreError::Conflict(format!(
                "resource {} already exists",
                resource.resource_id
            )));
        }
        // Unique external-id index, like the real store
        if state
            .rows
            .values()
            .any(|r| r.external_resource_id == resource.external_resource_id)
        {
            return Err(StoreError::DuplicateExternal(
                resource.external_resource_id.clone(),
            ));
        }
        state.rows.insert(resource.resource_id, resource.clone());
        Ok(())
    }

    async fn get(&self, resource_id: Uuid) -> Result<Option<ProvisionedResource>, StoreError> {
        Ok(self.state.lock().unwrap().rows.get(&resource_id).cloned())
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<ProvisionedResource>, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.hide_next_external_lookup {
            state.hide_next_external_lookup = false;
            return Ok(None);
        }
        Ok(state
            .rows
            .values()
            .find(|r| r.external_resource_id == external_id)
            .cloned())
    }

    async fn list_by_tenant(
        &self,
        tenant_id: &str,
        status: Option<ResourceStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProvisionedResource>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<ProvisionedResource> = state
            .rows
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .filter(|r| status.map(|s| r.status == s).unwrap_or(true))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_status(
        &self,
        resource_id: Uuid,
        status: ResourceStatus,
    ) -> Result<ProvisionedResource, StoreError> {
        let mut state = self.state.lock().unwrap();
        let row = state.rows.get_mut(&resource_id).ok_or(StoreError::NotFound)?;
        row.status = status;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn delete_owned(&self, resource_id: Uuid, tenant_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.rows.get(&resource_id) {
            Some(row) if row.tenant_id == tenant_id => {
                state.rows.remove(&resource_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity directory

struct DirectoryState {
    attributes: HashMap<String, HashMap<String, String>>,
    failing: HashSet<String>,
}

pub struct InMemoryDirectory {
    identities: Vec<Identity>,
    page_size: usize,
    state: Mutex<DirectoryState>,
}

impl InMemoryDirectory {
    /// Seed `count` identities for one tenant, listed `page_size` at a time.
    pub fn with_identities(tenant_id: &str, count: usize, page_size: usize) -> Self {
        let identities = (0..count)
            .map(|i| Identity {
                id: format!("user-{:03}", i),
                tenant_id: tenant_id.to_string(),
            })
            .collect();
        Self {
            identities,
            page_size,
            state: Mutex::new(DirectoryState {
                attributes: HashMap::new(),
                failing: HashSet::new(),
            }),
        }
    }

    /// Make attribute updates fail for the identities at the given seed
    /// indexes (e.g. `60..120` fails the whole second page at 60/page).
    pub fn fail_identities(&self, range: Range<usize>) {
        let mut state = self.state.lock().unwrap();
        for i in range {
            state.failing.insert(format!("user-{:03}", i));
        }
    }

    /// Identities currently carrying a non-empty value for `attr`.
    pub fn count_flagged(&self, attr: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .attributes
            .values()
            .filter(|attrs| attrs.get(attr).map(|v| !v.is_empty()).unwrap_or(false))
            .count()
    }
}

#[async_trait]
impl DirectoryClient for InMemoryDirectory {
    async fn list_identities(
        &self,
        tenant_id: &str,
        page_token: Option<&str>,
    ) -> Result<IdentityPage, ClientError> {
        let offset: usize = page_token.map(|t| t.parse().unwrap_or(0)).unwrap_or(0);
        let matching: Vec<Identity> = self
            .identities
            .iter()
            .filter(|i| i.tenant_id == tenant_id)
            .cloned()
            .collect();

        let page: Vec<Identity> = matching.iter().skip(offset).take(self.page_size).cloned().collect();
        let next_offset = offset + page.len();
        let next_token = if next_offset < matching.len() {
            Some(next_offset.to_string())
        } else {
            None
        };

        Ok(IdentityPage {
            identities: page,
            next_token,
        })
    }

    async fn update_attribute(
        &self,
        identity_id: &str,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(identity_id) {
            return Err(api_error("directory", 429, "throttled"));
        }
        let attrs = state.attributes.entry(identity_id.to_string()).or_default();
        match value {
            Some(value) => {
                attrs.insert(name.to_string(), value.to_string());
            }
            None => {
                attrs.remove(name);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Billing

struct FakeSubject {
    deleted: bool,
    metadata: HashMap<String, String>,
}

#[derive(Default)]
struct BillingState {
    subjects: HashMap<String, FakeSubject>,
    fail_writes: bool,
    fail_writes_timeout: bool,
}

#[derive(Default)]
pub struct InMemoryBilling {
    state: Mutex<BillingState>,
}

impl InMemoryBilling {
    pub fn with_subject(tenant_id: &str) -> Self {
        let billing = Self::default();
        billing.state.lock().unwrap().subjects.insert(
            tenant_id.to_string(),
            FakeSubject {
                deleted: false,
                metadata: HashMap::new(),
            },
        );
        billing
    }

    pub fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    /// Make metadata writes time out instead of failing outright.
    pub fn fail_writes_timeout(&self) {
        self.state.lock().unwrap().fail_writes_timeout = true;
    }

    pub fn mark_deleted(&self, tenant_id: &str) {
        if let Some(subject) = self.state.lock().unwrap().subjects.get_mut(tenant_id) {
            subject.deleted = true;
        }
    }

    pub fn metadata_field(&self, tenant_id: &str, field: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .subjects
            .get(tenant_id)
            .and_then(|s| s.metadata.get(field))
            .cloned()
    }
}

#[async_trait]
impl BillingClient for InMemoryBilling {
    async fn get_metadata(&self, tenant_id: &str) -> Result<BillingSubject, ClientError> {
        let state = self.state.lock().unwrap();
        match state.subjects.get(tenant_id) {
            Some(subject) if subject.deleted => Ok(BillingSubject::Deleted),
            Some(subject) => Ok(BillingSubject::Live {
                metadata: subject.metadata.clone(),
            }),
            None => Err(ClientError::NotFound { service: "billing" }),
        }
    }

    async fn set_metadata_field(
        &self,
        tenant_id: &str,
        field: &str,
        value: Option<&str>,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(api_error("billing", 500, "injected billing failure"));
        }
        if state.fail_writes_timeout {
            return Err(timeout_error("billing"));
        }
        let subject = state
            .subjects
            .get_mut(tenant_id)
            .ok_or(ClientError::NotFound { service: "billing" })?;
        match value {
            Some(value) => {
                subject.metadata.insert(field.to_string(), value.to_string());
            }
            None => {
                subject.metadata.remove(field);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Audit

#[derive(Default)]
pub struct RecordingAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditRecorder for RecordingAudit {
    async fn record(&self, entry: AuditEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}
