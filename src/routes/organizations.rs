//! Organization hierarchy admin API. Structural and policy mutations go
//! through the `HierarchyService`, which owns cache invalidation and change
//! events; handlers stay thin.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::jwt::AuthSession;
use crate::models::organization::{
    OrganizationCreateRequest, OrganizationNode, OrganizationUpdateRequest,
};
use crate::models::policy::{DataSharingPolicy, PolicyInput};
use crate::models::tenant::{LinkTenantRequest, Tenant, TenantLink};

#[utoipa::path(
    post,
    path = "/organizations",
    tag = "Organizations",
    request_body = OrganizationCreateRequest,
    responses(
        (status = 201, description = "Organization created", body = OrganizationNode),
        (status = 404, description = "Parent not found"),
        (status = 409, description = "Duplicate code or depth limit exceeded")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_organization(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(payload): Json<OrganizationCreateRequest>,
) -> AppResult<(StatusCode, Json<OrganizationNode>)> {
    auth.require_admin()?;
    let node = state
        .hierarchy
        .create_organization(Some(auth.0.user_id), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(node)))
}

#[utoipa::path(
    get,
    path = "/organizations/{id}",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Organization detail", body = OrganizationNode),
        (status = 404, description = "Not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_organization(
    State(state): State<AppState>,
    _auth: AuthSession,
    Path(id): Path<Uuid>,
) -> AppResult<Json<OrganizationNode>> {
    let node = state.hierarchy.store().get_active(id).await?;
    Ok(Json(node))
}

#[utoipa::path(
    put,
    path = "/organizations/{id}",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = OrganizationUpdateRequest,
    responses(
        (status = 200, description = "Organization updated", body = OrganizationNode),
        (status = 404, description = "Not found"),
        (status = 409, description = "Duplicate code")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_organization(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<OrganizationUpdateRequest>,
) -> AppResult<Json<OrganizationNode>> {
    auth.require_admin()?;
    let node = state
        .hierarchy
        .update_organization(Some(auth.0.user_id), id, payload)
        .await?;
    Ok(Json(node))
}

#[utoipa::path(
    delete,
    path = "/organizations/{id}",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 204, description = "Organization soft deleted"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Node still has children or tenants")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_organization(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    auth.require_admin()?;
    state
        .hierarchy
        .delete_organization(Some(auth.0.user_id), id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SubtreeQuery {
    /// Levels below the root to include; defaults to the whole subtree.
    pub max_depth: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/organizations/{id}/subtree",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Subtree root"), SubtreeQuery),
    responses(
        (status = 200, description = "Root plus active descendants", body = Vec<OrganizationNode>),
        (status = 404, description = "Not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_subtree(
    State(state): State<AppState>,
    _auth: AuthSession,
    Path(id): Path<Uuid>,
    Query(query): Query<SubtreeQuery>,
) -> AppResult<Json<Vec<OrganizationNode>>> {
    let nodes = state
        .hierarchy
        .store()
        .find_subtree(id, query.max_depth)
        .await?;
    Ok(Json(nodes))
}

#[utoipa::path(
    get,
    path = "/organizations/{id}/path",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Materialized ancestor path"),
        (status = 404, description = "Not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_ancestor_path(
    State(state): State<AppState>,
    _auth: AuthSession,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let path = state.hierarchy.store().find_ancestor_path(id).await?;
    Ok(Json(serde_json::json!({ "organization_id": id, "path": path })))
}

#[utoipa::path(
    get,
    path = "/organizations/{id}/tenants",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Tenants reachable from this node", body = Vec<Tenant>),
        (status = 404, description = "Not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_accessible_tenants(
    State(state): State<AppState>,
    _auth: AuthSession,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Tenant>>> {
    let tenant_ids = state.hierarchy.cache().get_accessible_tenants(id).await?;

    // Enrich with tenant metadata; the ids alone are what access decisions use.
    let mut tenants = Vec::with_capacity(tenant_ids.len());
    for tenant_id in tenant_ids.iter() {
        tenants.push(state.hierarchy.store().get_tenant(*tenant_id).await?);
    }
    Ok(Json(tenants))
}

#[utoipa::path(
    put,
    path = "/organizations/{id}/policies",
    tag = "Policies",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = Vec<PolicyInput>,
    responses(
        (status = 200, description = "Stored policies after the upsert", body = Vec<DataSharingPolicy>),
        (status = 404, description = "Not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn set_policies(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<Vec<PolicyInput>>,
) -> AppResult<Json<Vec<DataSharingPolicy>>> {
    auth.require_admin()?;
    let stored = state
        .hierarchy
        .set_data_sharing_policies(Some(auth.0.user_id), id, payload)
        .await?;
    Ok(Json(stored))
}

#[utoipa::path(
    get,
    path = "/organizations/{id}/policies",
    tag = "Policies",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Stored policies", body = Vec<DataSharingPolicy>),
        (status = 404, description = "Not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_policies(
    State(state): State<AppState>,
    _auth: AuthSession,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<DataSharingPolicy>>> {
    state.hierarchy.store().get_active(id).await?;
    let policies = state.hierarchy.store().list_policies(id).await?;
    Ok(Json(policies))
}

#[utoipa::path(
    post,
    path = "/organizations/{id}/presets/{preset_id}",
    tag = "Policies",
    params(
        ("id" = Uuid, Path, description = "Organization id"),
        ("preset_id" = String, Path, description = "Preset name")
    ),
    responses(
        (status = 200, description = "Policies after applying the preset", body = Vec<DataSharingPolicy>),
        (status = 404, description = "Organization or preset not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn apply_preset(
    State(state): State<AppState>,
    auth: AuthSession,
    Path((id, preset_id)): Path<(Uuid, String)>,
) -> AppResult<Json<Vec<DataSharingPolicy>>> {
    auth.require_admin()?;
    let stored = state
        .hierarchy
        .apply_preset(Some(auth.0.user_id), id, &preset_id)
        .await?;
    Ok(Json(stored))
}

#[utoipa::path(
    post,
    path = "/organizations/{id}/tenants",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = LinkTenantRequest,
    responses(
        (status = 201, description = "Tenant linked", body = TenantLink),
        (status = 404, description = "Tenant or organization not found"),
        (status = 409, description = "Tenant already has a primary organization")
    ),
    security(("bearerAuth" = []))
)]
pub async fn link_tenant(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(id): Path<Uuid>,
    Json(payload): Json<LinkTenantRequest>,
) -> AppResult<(StatusCode, Json<TenantLink>)> {
    auth.require_admin()?;
    let link = state
        .hierarchy
        .link_tenant(Some(auth.0.user_id), payload.tenant_id, id, payload.role)
        .await?;
    Ok((StatusCode::CREATED, Json(link)))
}
