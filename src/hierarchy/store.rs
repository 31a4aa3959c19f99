//! Organization Store: persistence of the organization tree, its sharing
//! policies, and tenant links.
//!
//! Mutations are transactional: node write, cascading descendant path
//! rewrite, and default-policy seeding commit atomically or not at all.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::db::row_parsers::{
    data_sharing_policy_from_row, db_organization_from_row, tenant_from_row, tenant_link_from_row,
};
use crate::errors::{AppError, AppResult};
use crate::models::organization::{
    child_path, rebase_path, OrgType, OrganizationNode, MAX_HIERARCHY_DEPTH,
};
use crate::models::policy::{DataCategory, DataSharingPolicy, PolicyInput};
use crate::models::tenant::{Tenant, TenantLink, TenantRole};
use crate::utils::utc_now;

use super::policy::default_policy;

/// Source the hierarchy cache recomputes from on a miss. Split out as a trait
/// so cache behavior is testable without a database.
#[async_trait]
pub trait HierarchySource: Send + Sync {
    /// Active nodes of the subtree rooted at `root_id`, root included.
    async fn load_subtree(&self, root_id: Uuid) -> AppResult<Vec<OrganizationNode>>;
    /// Distinct tenants linked to `root_id` or any active descendant.
    async fn load_accessible_tenants(&self, root_id: Uuid) -> AppResult<Vec<Uuid>>;
}

#[derive(Debug, Clone)]
pub struct NewOrganization {
    pub org_type: OrgType,
    pub name: String,
    pub code: String,
    pub parent_id: Option<Uuid>,
    pub settings: Value,
}

#[derive(Debug, Clone, Default)]
pub struct OrganizationPatch {
    pub name: Option<String>,
    pub code: Option<String>,
    pub settings: Option<Value>,
}

#[derive(Clone)]
pub struct OrganizationStore {
    pool: SqlitePool,
}

impl OrganizationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_active(&self, id: Uuid) -> AppResult<Option<OrganizationNode>> {
        let row = sqlx::query(
            "SELECT id, org_type, name, code, parent_id, level, path, settings, created_at, updated_at, deleted_at \
             FROM organizations WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| db_organization_from_row(&r).and_then(OrganizationNode::try_from))
            .transpose()
    }

    pub async fn get_active(&self, id: Uuid) -> AppResult<OrganizationNode> {
        self.find_active(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("organization {} not found", id)))
    }

    /// Create a node, seed its default policies, return it.
    pub async fn create(&self, req: NewOrganization) -> AppResult<OrganizationNode> {
        validate_code(&req.code)?;

        let (level, path) = match req.parent_id {
            Some(parent_id) => {
                let parent = self.find_active(parent_id).await?.ok_or_else(|| {
                    AppError::not_found(format!("parent organization {} not found", parent_id))
                })?;
                let level = parent.level + 1;
                if level > MAX_HIERARCHY_DEPTH {
                    return Err(AppError::precondition(format!(
                        "maximum hierarchy depth ({}) exceeded",
                        MAX_HIERARCHY_DEPTH
                    )));
                }
                (level, child_path(Some(&parent.path), &req.code))
            }
            None => {
                if req.org_type != OrgType::Group {
                    return Err(AppError::validation(
                        "only GROUP organizations may be roots",
                    ));
                }
                (1, child_path(None, &req.code))
            }
        };

        self.ensure_code_available(req.parent_id, &req.code, None)
            .await?;

        let id = Uuid::new_v4();
        let now = utc_now();
        let settings = serde_json::to_string(&req.settings)
            .map_err(|err| AppError::internal(format!("failed to encode settings: {err}")))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO organizations (id, org_type, name, code, parent_id, level, path, settings, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(req.org_type.as_str())
        .bind(&req.name)
        .bind(&req.code)
        .bind(req.parent_id.map(|p| p.to_string()))
        .bind(level)
        .bind(&path)
        .bind(&settings)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        seed_default_policies(&mut tx, id, req.org_type).await?;

        tx.commit().await?;

        self.get_active(id).await
    }

    /// Apply a patch. A code change recomputes this node's path and rewrites
    /// every active descendant's path in the same transaction. Returns the
    /// updated node and the ids of rewritten descendants.
    pub async fn update(
        &self,
        id: Uuid,
        patch: OrganizationPatch,
    ) -> AppResult<(OrganizationNode, Vec<Uuid>)> {
        let node = self.get_active(id).await?;

        let new_code = match &patch.code {
            Some(code) if code != &node.code => {
                validate_code(code)?;
                self.ensure_code_available(node.parent_id, code, Some(id))
                    .await?;
                Some(code.clone())
            }
            _ => None,
        };

        let name = patch.name.unwrap_or_else(|| node.name.clone());
        let settings_value = patch.settings.unwrap_or_else(|| node.settings.clone());
        let settings = serde_json::to_string(&settings_value)
            .map_err(|err| AppError::internal(format!("failed to encode settings: {err}")))?;
        let now = utc_now();

        let mut affected = Vec::new();
        let mut tx = self.pool.begin().await?;

        match new_code {
            Some(code) => {
                let parent_path = parent_path_of(&node);
                let new_path = child_path(parent_path.as_deref(), &code);

                sqlx::query(
                    "UPDATE organizations SET name = ?, code = ?, path = ?, settings = ?, updated_at = ? WHERE id = ?",
                )
                .bind(&name)
                .bind(&code)
                .bind(&new_path)
                .bind(&settings)
                .bind(now)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;

                // Depth-first over the old prefix; 4 levels bound the recursion.
                let descendants = sqlx::query(
                    "SELECT id, path FROM organizations \
                     WHERE path LIKE ? || '/%' AND deleted_at IS NULL ORDER BY path",
                )
                .bind(&node.path)
                .fetch_all(&mut *tx)
                .await?;

                for row in &descendants {
                    let child_id: String = row
                        .try_get("id")
                        .map_err(|e| AppError::internal(format!("missing id: {e}")))?;
                    let old_child_path: String = row
                        .try_get("path")
                        .map_err(|e| AppError::internal(format!("missing path: {e}")))?;
                    let rebased = rebase_path(&old_child_path, &node.path, &new_path);

                    sqlx::query("UPDATE organizations SET path = ?, updated_at = ? WHERE id = ?")
                        .bind(&rebased)
                        .bind(now)
                        .bind(&child_id)
                        .execute(&mut *tx)
                        .await?;

                    let child_uuid = Uuid::parse_str(&child_id)
                        .map_err(|e| AppError::internal(format!("invalid uuid: {e}")))?;
                    affected.push(child_uuid);
                }
            }
            None => {
                sqlx::query(
                    "UPDATE organizations SET name = ?, settings = ?, updated_at = ? WHERE id = ?",
                )
                .bind(&name)
                .bind(&settings)
                .bind(now)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        let updated = self.get_active(id).await?;
        Ok((updated, affected))
    }

    /// Soft-delete. Blocked while the node has active children or tenant links.
    pub async fn delete(&self, id: Uuid) -> AppResult<OrganizationNode> {
        let node = self.get_active(id).await?;

        let child_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM organizations WHERE parent_id = ? AND deleted_at IS NULL",
        )
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await?;
        if child_count > 0 {
            return Err(AppError::precondition(format!(
                "organization {} still has {} active children",
                id, child_count
            )));
        }

        let tenant_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM tenant_links WHERE organization_id = ?")
                .bind(id.to_string())
                .fetch_one(&self.pool)
                .await?;
        if tenant_count > 0 {
            return Err(AppError::precondition(format!(
                "organization {} still has {} linked tenants",
                id, tenant_count
            )));
        }

        let now = utc_now();
        sqlx::query("UPDATE organizations SET deleted_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(node)
    }

    /// Prefix query over the materialized path: the root plus every active
    /// descendant, optionally bounded to `max_depth` levels below the root.
    pub async fn find_subtree(
        &self,
        root_id: Uuid,
        max_depth: Option<i64>,
    ) -> AppResult<Vec<OrganizationNode>> {
        let root = self.get_active(root_id).await?;
        let level_cap = match max_depth {
            Some(depth) => root.level + depth.max(0),
            None => MAX_HIERARCHY_DEPTH,
        };

        let rows = sqlx::query(
            "SELECT id, org_type, name, code, parent_id, level, path, settings, created_at, updated_at, deleted_at \
             FROM organizations \
             WHERE (path = ? OR path LIKE ? || '/%') AND deleted_at IS NULL AND level <= ? \
             ORDER BY path",
        )
        .bind(&root.path)
        .bind(&root.path)
        .bind(level_cap)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| db_organization_from_row(r).and_then(OrganizationNode::try_from))
            .collect()
    }

    /// The materialized ancestor path of a node (self included).
    pub async fn find_ancestor_path(&self, id: Uuid) -> AppResult<String> {
        Ok(self.get_active(id).await?.path)
    }

    async fn ensure_code_available(
        &self,
        parent_id: Option<Uuid>,
        code: &str,
        exclude: Option<Uuid>,
    ) -> AppResult<()> {
        // NULL parents are distinct under the UNIQUE index, so root-level
        // collisions must be caught here as well.
        let count: i64 = match parent_id {
            Some(parent) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM organizations \
                     WHERE parent_id = ? AND code = ? AND deleted_at IS NULL AND id != ?",
                )
                .bind(parent.to_string())
                .bind(code)
                .bind(exclude.map(|e| e.to_string()).unwrap_or_default())
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM organizations \
                     WHERE parent_id IS NULL AND code = ? AND deleted_at IS NULL AND id != ?",
                )
                .bind(code)
                .bind(exclude.map(|e| e.to_string()).unwrap_or_default())
                .fetch_one(&self.pool)
                .await?
            }
        };

        if count > 0 {
            return Err(AppError::precondition(format!(
                "code '{}' already exists in this parent scope",
                code
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Data-sharing policies
    // ------------------------------------------------------------------

    pub async fn find_policy(
        &self,
        organization_id: Uuid,
        category: DataCategory,
    ) -> AppResult<Option<DataSharingPolicy>> {
        let row = sqlx::query(
            "SELECT organization_id, data_category, sharing_scope, access_level, conditions, created_at, updated_at \
             FROM data_sharing_policies WHERE organization_id = ? AND data_category = ?",
        )
        .bind(organization_id.to_string())
        .bind(category.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| data_sharing_policy_from_row(&r)).transpose()
    }

    pub async fn list_policies(&self, organization_id: Uuid) -> AppResult<Vec<DataSharingPolicy>> {
        let rows = sqlx::query(
            "SELECT organization_id, data_category, sharing_scope, access_level, conditions, created_at, updated_at \
             FROM data_sharing_policies WHERE organization_id = ? ORDER BY data_category",
        )
        .bind(organization_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(data_sharing_policy_from_row).collect()
    }

    /// Idempotent upsert on the (organization, category) composite key.
    pub async fn upsert_policy(&self, organization_id: Uuid, input: &PolicyInput) -> AppResult<()> {
        let now = utc_now();
        let conditions = input
            .conditions
            .clone()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        let conditions = serde_json::to_string(&conditions)
            .map_err(|err| AppError::internal(format!("failed to encode conditions: {err}")))?;

        sqlx::query(
            "INSERT INTO data_sharing_policies \
             (organization_id, data_category, sharing_scope, access_level, conditions, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(organization_id, data_category) DO UPDATE SET \
             sharing_scope = excluded.sharing_scope, \
             access_level = excluded.access_level, \
             conditions = excluded.conditions, \
             updated_at = excluded.updated_at",
        )
        .bind(organization_id.to_string())
        .bind(input.data_category.as_str())
        .bind(input.sharing_scope.as_str())
        .bind(input.access_level.as_str())
        .bind(&conditions)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Tenants
    // ------------------------------------------------------------------

    pub async fn insert_tenant(&self, name: &str, domain: Option<&str>) -> AppResult<Tenant> {
        let id = Uuid::new_v4();
        let now = utc_now();

        sqlx::query(
            "INSERT INTO tenants (id, name, domain, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(name)
        .bind(domain)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_tenant(id).await
    }

    pub async fn get_tenant(&self, id: Uuid) -> AppResult<Tenant> {
        let row = sqlx::query(
            "SELECT id, name, domain, created_at, updated_at FROM tenants WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| tenant_from_row(&r))
            .transpose()?
            .ok_or_else(|| AppError::not_found(format!("tenant {} not found", id)))
    }

    pub async fn link_tenant(
        &self,
        tenant_id: Uuid,
        organization_id: Uuid,
        role: TenantRole,
    ) -> AppResult<TenantLink> {
        self.get_tenant(tenant_id).await?;
        self.get_active(organization_id).await?;

        if role == TenantRole::Primary {
            let existing: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM tenant_links WHERE tenant_id = ? AND role = 'PRIMARY'",
            )
            .bind(tenant_id.to_string())
            .fetch_one(&self.pool)
            .await?;
            if existing > 0 {
                return Err(AppError::precondition(format!(
                    "tenant {} already has a primary organization",
                    tenant_id
                )));
            }
        }

        let now = utc_now();
        sqlx::query(
            "INSERT INTO tenant_links (tenant_id, organization_id, role, created_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(tenant_id, organization_id) DO UPDATE SET role = excluded.role",
        )
        .bind(tenant_id.to_string())
        .bind(organization_id.to_string())
        .bind(role.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT tenant_id, organization_id, role, created_at FROM tenant_links \
             WHERE tenant_id = ? AND organization_id = ?",
        )
        .bind(tenant_id.to_string())
        .bind(organization_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        tenant_link_from_row(&row)
    }
}

#[async_trait]
impl HierarchySource for OrganizationStore {
    async fn load_subtree(&self, root_id: Uuid) -> AppResult<Vec<OrganizationNode>> {
        self.find_subtree(root_id, None).await
    }

    async fn load_accessible_tenants(&self, root_id: Uuid) -> AppResult<Vec<Uuid>> {
        let root = self.get_active(root_id).await?;

        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT tl.tenant_id FROM tenant_links tl \
             JOIN organizations o ON o.id = tl.organization_id \
             WHERE (o.path = ? OR o.path LIKE ? || '/%') AND o.deleted_at IS NULL \
             ORDER BY tl.tenant_id",
        )
        .bind(&root.path)
        .bind(&root.path)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|s| {
                Uuid::parse_str(s)
                    .map_err(|e| AppError::internal(format!("invalid tenant uuid: {e}")))
            })
            .collect()
    }
}

async fn seed_default_policies(
    tx: &mut Transaction<'_, Sqlite>,
    organization_id: Uuid,
    org_type: OrgType,
) -> AppResult<()> {
    let now = utc_now();
    for category in DataCategory::ALL {
        let (scope, level) = default_policy(org_type, category);
        sqlx::query(
            "INSERT INTO data_sharing_policies \
             (organization_id, data_category, sharing_scope, access_level, conditions, created_at, updated_at) \
             VALUES (?, ?, ?, ?, '{}', ?, ?)",
        )
        .bind(organization_id.to_string())
        .bind(category.as_str())
        .bind(scope.as_str())
        .bind(level.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn parent_path_of(node: &OrganizationNode) -> Option<String> {
    node.parent_id.as_ref()?;
    node.path
        .rfind('/')
        .map(|idx| node.path[..idx].to_string())
}

// '%' and '_' stay out of codes so materialized paths are safe inside
// LIKE prefix scans.
fn validate_code(code: &str) -> AppResult<()> {
    if code.is_empty() {
        return Err(AppError::validation("code must not be empty"));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(AppError::validation(
            "code may only contain letters, digits and '-'",
        ));
    }
    Ok(())
}
