//! Access Evaluator: the allow/deny decision for one `(session, target)`
//! pair.
//!
//! Pure given its inputs — no store or cache reads — so it is safe to call
//! from concurrent request handlers without synchronization. Every deny path
//! carries a stable reason code; absence of a policy is never an implicit
//! allow.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::policy::{AccessLevel, DataCategory, Operation, SharingScope};
use crate::models::session::HierarchicalSession;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
pub struct AccessTarget {
    pub tenant_id: Uuid,
    pub category: DataCategory,
    pub operation: Operation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    AuthenticationRequired,
    TenantAccessDenied,
    NoPolicyForCategory,
    SharingDisabled,
    InsufficientAccessLevel,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccessDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_scope: Option<SharingScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_level: Option<AccessLevel>,
}

impl AccessDecision {
    fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            effective_scope: None,
            effective_level: None,
        }
    }

    fn allow(scope: SharingScope, level: AccessLevel) -> Self {
        Self {
            allowed: true,
            reason: None,
            effective_scope: Some(scope),
            effective_level: Some(level),
        }
    }
}

/// Decide whether `session` may perform `target.operation` on
/// `target.category` data belonging to `target.tenant_id`.
///
/// Checks run in order and short-circuit on the first failure:
/// identity, tenant reachability, category policy presence, sharing scope,
/// operation-vs-level.
pub fn check_access(session: &HierarchicalSession, target: &AccessTarget) -> AccessDecision {
    let (own_tenant, hierarchy) = match (session.tenant_id, session.hierarchy.as_ref()) {
        (Some(tenant), Some(hierarchy)) => (tenant, hierarchy),
        _ => return AccessDecision::deny(DenyReason::AuthenticationRequired),
    };

    // The actor's own tenant is always reachable; the issuance invariant puts
    // it into accessible_tenants, and this comparison covers tokens from
    // before that invariant existed.
    let reachable = target.tenant_id == own_tenant
        || session.accessible_tenants.contains(&target.tenant_id);
    if !reachable {
        return AccessDecision::deny(DenyReason::TenantAccessDenied);
    }

    let policy = match hierarchy.data_access_policies.get(&target.category) {
        Some(policy) => policy,
        None => return AccessDecision::deny(DenyReason::NoPolicyForCategory),
    };

    if policy.scope == SharingScope::None {
        return AccessDecision::deny(DenyReason::SharingDisabled);
    }

    if target.operation.is_mutation() && policy.level != AccessLevel::Full {
        return AccessDecision::deny(DenyReason::InsufficientAccessLevel);
    }

    AccessDecision::allow(policy.scope, policy.level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::organization::OrgType;
    use crate::models::session::{CategoryPolicy, HierarchyContext};
    use std::collections::HashMap;

    fn context_with(
        policies: &[(DataCategory, SharingScope, AccessLevel)],
    ) -> HierarchyContext {
        let data_access_policies: HashMap<_, _> = policies
            .iter()
            .map(|(category, scope, level)| {
                (
                    *category,
                    CategoryPolicy {
                        scope: *scope,
                        level: *level,
                    },
                )
            })
            .collect();

        HierarchyContext {
            organization_id: Some(Uuid::new_v4()),
            organization_level: 1,
            organization_type: OrgType::Group,
            organization_path: "aurora".to_string(),
            access_scope: Vec::new(),
            data_access_policies,
        }
    }

    fn session_with(
        tenant_id: Option<Uuid>,
        hierarchy: Option<HierarchyContext>,
        accessible: Vec<Uuid>,
    ) -> HierarchicalSession {
        HierarchicalSession {
            user_id: Uuid::new_v4(),
            email: "ops@example.com".to_string(),
            role: "manager".to_string(),
            permission_level: 50,
            tenant_id,
            hierarchy,
            accessible_tenants: accessible,
        }
    }

    fn target(tenant: Uuid, category: DataCategory, operation: Operation) -> AccessTarget {
        AccessTarget {
            tenant_id: tenant,
            category,
            operation,
        }
    }

    #[test]
    fn missing_tenant_or_context_requires_authentication() {
        let tenant = Uuid::new_v4();
        let ctx = context_with(&[]);

        let no_tenant = session_with(None, Some(ctx.clone()), vec![]);
        let decision = check_access(
            &no_tenant,
            &target(tenant, DataCategory::Customer, Operation::Read),
        );
        assert_eq!(decision.reason, Some(DenyReason::AuthenticationRequired));

        let no_context = session_with(Some(tenant), None, vec![tenant]);
        let decision = check_access(
            &no_context,
            &target(tenant, DataCategory::Customer, Operation::Read),
        );
        assert_eq!(decision.reason, Some(DenyReason::AuthenticationRequired));
    }

    #[test]
    fn unreachable_tenant_is_denied_regardless_of_category() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let ctx = context_with(&[(
            DataCategory::Financial,
            SharingScope::Group,
            AccessLevel::Full,
        )]);
        let session = session_with(Some(own), Some(ctx), vec![own]);

        for operation in [Operation::Read, Operation::Create, Operation::Delete] {
            let decision =
                check_access(&session, &target(other, DataCategory::Financial, operation));
            assert!(!decision.allowed);
            assert_eq!(decision.reason, Some(DenyReason::TenantAccessDenied));
        }
    }

    #[test]
    fn own_tenant_is_reachable_even_if_list_omits_it() {
        let own = Uuid::new_v4();
        let ctx = context_with(&[(
            DataCategory::Reservation,
            SharingScope::Hotel,
            AccessLevel::Full,
        )]);
        let session = session_with(Some(own), Some(ctx), Vec::new());

        let decision = check_access(
            &session,
            &target(own, DataCategory::Reservation, Operation::Read),
        );
        assert!(decision.allowed);
    }

    #[test]
    fn absent_policy_fails_closed() {
        let own = Uuid::new_v4();
        let ctx = context_with(&[(
            DataCategory::Customer,
            SharingScope::Hotel,
            AccessLevel::Full,
        )]);
        let session = session_with(Some(own), Some(ctx), vec![own]);

        let decision = check_access(
            &session,
            &target(own, DataCategory::Financial, Operation::Read),
        );
        assert_eq!(decision.reason, Some(DenyReason::NoPolicyForCategory));
    }

    #[test]
    fn none_scope_denies_even_reads() {
        let own = Uuid::new_v4();
        let ctx = context_with(&[(
            DataCategory::Staff,
            SharingScope::None,
            AccessLevel::Full,
        )]);
        let session = session_with(Some(own), Some(ctx), vec![own]);

        let decision = check_access(&session, &target(own, DataCategory::Staff, Operation::Read));
        assert_eq!(decision.reason, Some(DenyReason::SharingDisabled));
    }

    #[test]
    fn mutations_require_full_level() {
        let own = Uuid::new_v4();
        let ctx = context_with(&[(
            DataCategory::Analytics,
            SharingScope::Hotel,
            AccessLevel::AnalyticsOnly,
        )]);
        let session = session_with(Some(own), Some(ctx), vec![own]);

        let read = check_access(&session, &target(own, DataCategory::Analytics, Operation::Read));
        assert!(read.allowed);

        let update = check_access(
            &session,
            &target(own, DataCategory::Analytics, Operation::Update),
        );
        assert!(!update.allowed);
        assert_eq!(update.reason, Some(DenyReason::InsufficientAccessLevel));
    }

    #[test]
    fn allowed_decision_reports_effective_scope_and_level() {
        let own = Uuid::new_v4();
        let ctx = context_with(&[(
            DataCategory::Financial,
            SharingScope::Group,
            AccessLevel::Full,
        )]);
        let session = session_with(Some(own), Some(ctx), vec![own]);

        let decision = check_access(
            &session,
            &target(own, DataCategory::Financial, Operation::Update),
        );
        assert!(decision.allowed);
        assert_eq!(decision.effective_scope, Some(SharingScope::Group));
        assert_eq!(decision.effective_level, Some(AccessLevel::Full));
    }

    /// Every (session, target) combination terminates in exactly one reason
    /// code or an allow.
    #[test]
    fn evaluation_is_total() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let levels = [
            AccessLevel::Full,
            AccessLevel::ReadOnly,
            AccessLevel::AnalyticsOnly,
            AccessLevel::SummaryOnly,
        ];
        let scopes = [
            SharingScope::Group,
            SharingScope::Brand,
            SharingScope::Hotel,
            SharingScope::Department,
            SharingScope::None,
        ];
        let operations = [
            Operation::Read,
            Operation::Create,
            Operation::Update,
            Operation::Delete,
        ];

        for scope in scopes {
            for level in levels {
                let ctx = context_with(&[(DataCategory::Customer, scope, level)]);
                let session = session_with(Some(own), Some(ctx), vec![own]);
                for operation in operations {
                    for tenant in [own, other] {
                        let decision = check_access(
                            &session,
                            &target(tenant, DataCategory::Customer, operation),
                        );
                        assert_ne!(decision.allowed, decision.reason.is_some());
                    }
                }
            }
        }
    }
}
