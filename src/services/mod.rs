pub mod lifecycle;
pub mod provisioning;

pub use lifecycle::LifecycleService;
pub use provisioning::ProvisioningService;

use crate::auth::Role;

/// The authenticated principal an operation runs as. Built from the session
/// token at the HTTP boundary and threaded through the orchestrators so
/// ownership and role checks live with the business logic.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user: String,
    pub tenant_id: String,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
