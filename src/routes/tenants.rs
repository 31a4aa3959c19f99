use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::jwt::AuthSession;
use crate::models::tenant::{Tenant, TenantCreateRequest};

#[utoipa::path(
    post,
    path = "/tenants",
    tag = "Tenants",
    request_body = TenantCreateRequest,
    responses(
        (status = 201, description = "Tenant created", body = Tenant)
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_tenant(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(payload): Json<TenantCreateRequest>,
) -> AppResult<(StatusCode, Json<Tenant>)> {
    auth.require_admin()?;
    let tenant = state
        .hierarchy
        .store()
        .insert_tenant(&payload.name, payload.domain.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

#[utoipa::path(
    get,
    path = "/tenants/{id}",
    tag = "Tenants",
    params(("id" = Uuid, Path, description = "Tenant id")),
    responses(
        (status = 200, description = "Tenant metadata", body = Tenant),
        (status = 404, description = "Not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_tenant(
    State(state): State<AppState>,
    _auth: AuthSession,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Tenant>> {
    let tenant = state.hierarchy.store().get_tenant(id).await?;
    Ok(Json(tenant))
}
