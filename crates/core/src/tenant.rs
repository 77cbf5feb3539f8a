//! Tenant context carried through every core operation.
//!
//! A [`TenantContext`] is built once per request from the authenticated
//! principal. Repositories and engine services take the tenant id from it
//! rather than from request payloads, so a caller can never address another
//! club's data.

use serde::{Deserialize, Serialize};

use crate::roles::{ROLE_ADMIN, ROLE_STAFF};
use crate::types::{DbId, TenantId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    pub principal_id: DbId,
    pub role: String,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<TenantId>, principal_id: DbId, role: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            principal_id,
            role: role.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Admins and staff may act on other members' resources.
    pub fn is_staff(&self) -> bool {
        self.role == ROLE_ADMIN || self.role == ROLE_STAFF
    }

    /// Whether this principal may mutate a resource owned by `owner_id`.
    pub fn can_act_for(&self, owner_id: DbId) -> bool {
        self.principal_id == owner_id || self.is_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::{ROLE_ADMIN, ROLE_MEMBER, ROLE_STAFF};

    #[test]
    fn owner_can_act_for_self() {
        let id = DbId::new_v4();
        let ctx = TenantContext::new("club-a", id, ROLE_MEMBER);
        assert!(ctx.can_act_for(id));
        assert!(!ctx.can_act_for(DbId::new_v4()));
    }

    #[test]
    fn admin_can_act_for_anyone() {
        let ctx = TenantContext::new("club-a", DbId::new_v4(), ROLE_ADMIN);
        assert!(ctx.can_act_for(DbId::new_v4()));
        assert!(ctx.is_staff());
    }

    #[test]
    fn staff_is_not_admin() {
        let ctx = TenantContext::new("club-a", DbId::new_v4(), ROLE_STAFF);
        assert!(ctx.is_staff());
        assert!(!ctx.is_admin());
        assert!(!ctx.can_act_for(DbId::new_v4()));
    }
}
