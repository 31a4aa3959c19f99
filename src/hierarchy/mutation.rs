//! Hierarchy Mutation API: orchestrates structural and policy mutations,
//! keeps the cache honest, and notifies sibling systems.
//!
//! Every operation follows the same shape: write through the store (the
//! source of truth), invalidate the affected cache key, then publish a
//! best-effort change event. Event failure never rolls back a committed
//! mutation.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::events::{publish, EventBus, HierarchyChangeEvent, HierarchyOperation};
use crate::models::organization::{
    NodeSettings, OrganizationCreateRequest, OrganizationNode, OrganizationUpdateRequest,
};
use crate::models::policy::{DataCategory, DataSharingPolicy, PolicyInput};
use crate::models::session::{CategoryPolicy, HierarchyContext};
use crate::models::tenant::{TenantLink, TenantRole};
use crate::models::user::User;

use super::cache::HierarchyCache;
use super::policy::{preset_policies, PolicyResolver};
use super::store::{NewOrganization, OrganizationPatch, OrganizationStore};

#[derive(Clone)]
pub struct HierarchyService {
    store: OrganizationStore,
    resolver: PolicyResolver,
    cache: Arc<HierarchyCache>,
    events: EventBus,
}

impl HierarchyService {
    pub fn new(store: OrganizationStore, cache: Arc<HierarchyCache>, events: EventBus) -> Self {
        let resolver = PolicyResolver::new(store.clone());
        Self {
            store,
            resolver,
            cache,
            events,
        }
    }

    pub fn store(&self) -> &OrganizationStore {
        &self.store
    }

    pub fn cache(&self) -> &Arc<HierarchyCache> {
        &self.cache
    }

    /// Create a node and seed its default policies. A fresh node has nothing
    /// cached yet, so no invalidation happens here.
    pub async fn create_organization(
        &self,
        actor_id: Option<Uuid>,
        req: OrganizationCreateRequest,
    ) -> AppResult<OrganizationNode> {
        let node = self
            .store
            .create(NewOrganization {
                org_type: req.org_type,
                name: req.name,
                code: req.code,
                parent_id: req.parent_id,
                settings: req
                    .settings
                    .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            })
            .await?;

        tracing::info!(
            organization_id = %node.id,
            org_type = node.org_type.as_str(),
            level = node.level,
            path = %node.path,
            "organization created"
        );

        publish(
            &self.events,
            HierarchyChangeEvent::new(HierarchyOperation::Create, node.id, actor_id)
                .with_after(state_of(&node)),
        );

        Ok(node)
    }

    /// Update name/code/settings. A code change rewrites every descendant's
    /// path; the node and all rewritten descendants are invalidated so reads
    /// recompute instead of serving stale paths inside the TTL window.
    pub async fn update_organization(
        &self,
        actor_id: Option<Uuid>,
        id: Uuid,
        req: OrganizationUpdateRequest,
    ) -> AppResult<OrganizationNode> {
        let before = self.store.get_active(id).await?;

        let (node, affected_children) = self
            .store
            .update(
                id,
                OrganizationPatch {
                    name: req.name,
                    code: req.code,
                    settings: req.settings,
                },
            )
            .await?;

        self.cache.invalidate(id);
        self.cache.invalidate_many(affected_children.iter().copied());

        tracing::info!(
            organization_id = %id,
            affected_children = affected_children.len(),
            "organization updated"
        );

        publish(
            &self.events,
            HierarchyChangeEvent::new(HierarchyOperation::Update, id, actor_id)
                .with_before(state_of(&before))
                .with_after(state_of(&node))
                .with_children(affected_children),
        );

        Ok(node)
    }

    /// Soft-delete a childless, tenant-less node.
    pub async fn delete_organization(&self, actor_id: Option<Uuid>, id: Uuid) -> AppResult<()> {
        let before = self.store.delete(id).await?;
        self.cache.invalidate(id);

        tracing::info!(organization_id = %id, "organization deleted");

        publish(
            &self.events,
            HierarchyChangeEvent::new(HierarchyOperation::Delete, id, actor_id)
                .with_before(state_of(&before)),
        );

        Ok(())
    }

    /// Idempotent per-category upsert. Policy is not inherited downward, so
    /// only this node's cache entry is invalidated.
    pub async fn set_data_sharing_policies(
        &self,
        actor_id: Option<Uuid>,
        organization_id: Uuid,
        policies: Vec<PolicyInput>,
    ) -> AppResult<Vec<DataSharingPolicy>> {
        self.store.get_active(organization_id).await?;

        for input in &policies {
            self.store.upsert_policy(organization_id, input).await?;
        }
        self.cache.invalidate(organization_id);

        let stored = self.store.list_policies(organization_id).await?;

        publish(
            &self.events,
            HierarchyChangeEvent::new(HierarchyOperation::PolicyChange, organization_id, actor_id)
                .with_after(
                    serde_json::to_value(&stored).unwrap_or(Value::Null),
                ),
        );

        Ok(stored)
    }

    /// Expand a named preset into individual policy upserts and record the
    /// applied preset id in the node settings.
    pub async fn apply_preset(
        &self,
        actor_id: Option<Uuid>,
        organization_id: Uuid,
        preset_id: &str,
    ) -> AppResult<Vec<DataSharingPolicy>> {
        let bundle = preset_policies(preset_id).ok_or_else(|| {
            AppError::not_found(format!(
                "unknown preset '{}' (known presets: {})",
                preset_id,
                super::policy::PRESET_IDS.join(", ")
            ))
        })?;

        let node = self.store.get_active(organization_id).await?;

        for input in &bundle {
            self.store.upsert_policy(organization_id, input).await?;
        }

        let mut settings = node.settings.clone();
        NodeSettings {
            applied_preset: Some(preset_id.to_string()),
        }
        .merge_into(&mut settings);

        self.store
            .update(
                organization_id,
                OrganizationPatch {
                    settings: Some(settings),
                    ..Default::default()
                },
            )
            .await?;

        self.cache.invalidate(organization_id);

        let stored = self.store.list_policies(organization_id).await?;

        tracing::info!(
            organization_id = %organization_id,
            preset = preset_id,
            "preset applied"
        );

        publish(
            &self.events,
            HierarchyChangeEvent::new(
                HierarchyOperation::PresetApplied,
                organization_id,
                actor_id,
            )
            .with_after(serde_json::to_value(&stored).unwrap_or(Value::Null)),
        );

        Ok(stored)
    }

    /// Link a tenant under a node; the node's accessible-tenant entry is now
    /// stale and gets dropped.
    pub async fn link_tenant(
        &self,
        actor_id: Option<Uuid>,
        tenant_id: Uuid,
        organization_id: Uuid,
        role: TenantRole,
    ) -> AppResult<TenantLink> {
        let link = self
            .store
            .link_tenant(tenant_id, organization_id, role)
            .await?;
        self.cache.invalidate(organization_id);

        publish(
            &self.events,
            HierarchyChangeEvent::new(
                HierarchyOperation::TenantLinked,
                organization_id,
                actor_id,
            )
            .with_tenants(vec![tenant_id]),
        );

        Ok(link)
    }

    /// Resolve the full hierarchy context for an organization at token-mint
    /// time: position, visible subtree, effective policy per category, and
    /// reachable tenants.
    pub async fn resolve_hierarchy_context(
        &self,
        organization_id: Uuid,
    ) -> AppResult<(HierarchyContext, Vec<Uuid>)> {
        let node = self.store.get_active(organization_id).await?;

        let subtree = self.cache.get_subtree(organization_id).await?;
        let access_scope: Vec<Uuid> = subtree.iter().map(|n| n.id).collect();

        let mut data_access_policies = std::collections::HashMap::new();
        for category in DataCategory::ALL {
            let (scope, level) = self
                .resolver
                .effective_policy(organization_id, node.org_type, category)
                .await?;
            data_access_policies.insert(category, CategoryPolicy { scope, level });
        }

        let accessible_tenants = self
            .cache
            .get_accessible_tenants(organization_id)
            .await?
            .as_ref()
            .clone();

        let context = HierarchyContext {
            organization_id: Some(node.id),
            organization_level: node.level,
            organization_type: node.org_type,
            organization_path: node.path,
            access_scope,
            data_access_policies,
        };

        Ok((context, accessible_tenants))
    }

    /// Resolve the snapshot embedded into a user's tokens. `accessible_tenants`
    /// always includes the actor's own tenant, even when no link exists yet.
    pub async fn resolve_session_context(
        &self,
        user: &User,
        organization_id: Option<Uuid>,
    ) -> AppResult<(Option<HierarchyContext>, Vec<Uuid>)> {
        let org = organization_id.or(user.organization_id);
        match org {
            Some(org_id) => {
                let (context, mut accessible) = self.resolve_hierarchy_context(org_id).await?;
                if let Some(own) = user.tenant_id {
                    if !accessible.contains(&own) {
                        accessible.push(own);
                    }
                }
                Ok((Some(context), accessible))
            }
            None => Ok((None, user.tenant_id.into_iter().collect())),
        }
    }
}

fn state_of(node: &OrganizationNode) -> Value {
    serde_json::to_value(node).unwrap_or(Value::Null)
}
