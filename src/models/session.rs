use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::organization::OrgType;
use super::policy::{AccessLevel, DataCategory, SharingScope};

/// Policy snapshot for one data category as embedded in a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CategoryPolicy {
    pub scope: SharingScope,
    pub level: AccessLevel,
}

/// The resolved snapshot of an actor's organization position and effective
/// policies, minted into the token at issuance and never re-resolved at
/// verification time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HierarchyContext {
    /// None only for degraded sessions minted before hierarchy assignment.
    pub organization_id: Option<Uuid>,
    pub organization_level: i64,
    pub organization_type: OrgType,
    pub organization_path: String,
    /// Organization ids visible from the actor's node (self + subtree).
    pub access_scope: Vec<Uuid>,
    #[schema(value_type = HashMap<String, CategoryPolicy>)]
    pub data_access_policies: HashMap<DataCategory, CategoryPolicy>,
}

impl HierarchyContext {
    /// Synthetic context for a token that carries a tenant but no hierarchy:
    /// same-tenant reads at HOTEL level, nothing broader.
    pub fn degraded() -> Self {
        let data_access_policies = DataCategory::ALL
            .into_iter()
            .map(|category| {
                (
                    category,
                    CategoryPolicy {
                        scope: SharingScope::Hotel,
                        level: AccessLevel::ReadOnly,
                    },
                )
            })
            .collect();

        HierarchyContext {
            organization_id: None,
            organization_level: 3,
            organization_type: OrgType::Hotel,
            organization_path: String::new(),
            access_scope: Vec::new(),
            data_access_policies,
        }
    }
}

/// A verified session as handed to the access evaluator: identity claims plus
/// the embedded hierarchy snapshot and reachable tenants.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HierarchicalSession {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub permission_level: i64,
    pub tenant_id: Option<Uuid>,
    pub hierarchy: Option<HierarchyContext>,
    pub accessible_tenants: Vec<Uuid>,
}

impl HierarchicalSession {
    /// Apply the degraded-session rule: a session with a tenant but no
    /// embedded context gets the minimal same-tenant snapshot. A session with
    /// neither stays context-less and fails the evaluator's identity check.
    pub fn with_degraded_fallback(mut self) -> Self {
        if self.hierarchy.is_none() {
            if let Some(tenant_id) = self.tenant_id {
                self.hierarchy = Some(HierarchyContext::degraded());
                self.accessible_tenants = vec![tenant_id];
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_session(tenant_id: Option<Uuid>) -> HierarchicalSession {
        HierarchicalSession {
            user_id: Uuid::new_v4(),
            email: "guest@example.com".to_string(),
            role: "staff".to_string(),
            permission_level: 10,
            tenant_id,
            hierarchy: None,
            accessible_tenants: Vec::new(),
        }
    }

    #[test]
    fn degraded_session_reaches_only_its_own_tenant() {
        let tenant = Uuid::new_v4();
        let session = bare_session(Some(tenant)).with_degraded_fallback();

        assert_eq!(session.accessible_tenants, vec![tenant]);
        let ctx = session.hierarchy.unwrap();
        assert_eq!(ctx.organization_id, None);
        assert_eq!(ctx.organization_type, OrgType::Hotel);
        assert!(ctx.access_scope.is_empty());
        for policy in ctx.data_access_policies.values() {
            assert_eq!(policy.level, AccessLevel::ReadOnly);
            assert_eq!(policy.scope, SharingScope::Hotel);
        }
    }

    #[test]
    fn tenantless_session_stays_context_less() {
        let session = bare_session(None).with_degraded_fallback();
        assert!(session.hierarchy.is_none());
        assert!(session.accessible_tenants.is_empty());
    }

    #[test]
    fn existing_context_is_never_overwritten() {
        let tenant = Uuid::new_v4();
        let mut session = bare_session(Some(tenant));
        let mut ctx = HierarchyContext::degraded();
        ctx.organization_id = Some(Uuid::new_v4());
        session.hierarchy = Some(ctx.clone());
        session.accessible_tenants = vec![tenant, Uuid::new_v4()];

        let out = session.clone().with_degraded_fallback();
        assert_eq!(out.hierarchy, Some(ctx));
        assert_eq!(out.accessible_tenants.len(), 2);
    }
}
