use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::row_parsers;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthSession;
use crate::models::session::HierarchicalSession;
use crate::models::user::{
    AuthResponse, DbUser, LoginRequest, RefreshRequest, RegisterRequest,
    SwitchOrganizationRequest, User, PERMISSION_LEVEL_ADMIN,
};
use crate::utils::{hash_password, utc_now, verify_password};

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    ensure_email_available(&state.pool, &payload.email).await?;

    if let Some(tenant_id) = payload.tenant_id {
        state.hierarchy.store().get_tenant(tenant_id).await?;
    }
    if let Some(organization_id) = payload.organization_id {
        state.hierarchy.store().get_active(organization_id).await?;
    }

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let user_id = Uuid::new_v4();

    // Bootstrap rule: the first account becomes the platform administrator,
    // everyone after that starts as regular staff.
    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL")
        .fetch_one(&state.pool)
        .await?;
    let (role, permission_level) = if user_count == 0 {
        ("admin", 100_i64)
    } else {
        ("staff", 10_i64)
    };

    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, permission_level, tenant_id, organization_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(role)
    .bind(permission_level)
    .bind(payload.tenant_id.map(|t| t.to_string()))
    .bind(payload.organization_id.map(|o| o.to_string()))
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let user: User = fetch_user_by_id(&state.pool, user_id).await?.try_into()?;
    let response = issue_for_user(&state, user, None).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_user = fetch_user_by_email(&state.pool, &payload.email)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid email or password"))?;

    if !verify_password(&payload.password, &db_user.password_hash)? {
        return Err(AppError::unauthorized("invalid email or password"));
    }

    let user: User = db_user.try_into()?;
    let response = issue_for_user(&state, user, None).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Fresh token pair", body = AuthResponse),
        (status = 401, description = "Invalid refresh token")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let claims = state.jwt.decode_refresh(&payload.refresh_token)?;

    // Re-resolve from current store state; stale claims are never copied
    // forward into the new pair.
    let user: User = fetch_user_by_id(&state.pool, claims.sub)
        .await
        .map_err(|_| AppError::unauthorized("user no longer exists"))?
        .try_into()?;

    let response = issue_for_user(&state, user, None).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/auth/switch-organization",
    tag = "Auth",
    request_body = SwitchOrganizationRequest,
    responses(
        (status = 200, description = "Token pair scoped to the organization", body = AuthResponse),
        (status = 403, description = "Organization outside the caller's scope"),
        (status = 404, description = "Organization not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn switch_organization(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(payload): Json<SwitchOrganizationRequest>,
) -> AppResult<Json<AuthResponse>> {
    state
        .hierarchy
        .store()
        .get_active(payload.organization_id)
        .await?;

    // Non-admins may only narrow into organizations already visible from
    // their current snapshot.
    if auth.0.permission_level < PERMISSION_LEVEL_ADMIN {
        let in_scope = auth
            .0
            .hierarchy
            .as_ref()
            .map(|ctx| ctx.access_scope.contains(&payload.organization_id))
            .unwrap_or(false);
        if !in_scope {
            return Err(AppError::forbidden(
                "organization is outside the current session scope",
            ));
        }
    }

    let user: User = fetch_user_by_id(&state.pool, auth.0.user_id)
        .await?
        .try_into()?;
    let response = issue_for_user(&state, user, Some(payload.organization_id)).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "The parsed session", body = HierarchicalSession)
    ),
    security(("bearerAuth" = []))
)]
pub async fn me(auth: AuthSession) -> Json<HierarchicalSession> {
    Json(auth.0)
}

/// Resolve the hierarchy snapshot and mint a token pair for `user`.
async fn issue_for_user(
    state: &AppState,
    user: User,
    organization_id: Option<Uuid>,
) -> AppResult<AuthResponse> {
    let (hierarchy, accessible_tenants) = state
        .hierarchy
        .resolve_session_context(&user, organization_id)
        .await?;

    let pair = state
        .jwt
        .issue_pair(&user, hierarchy, accessible_tenants)?;

    Ok(AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        expires_in: pair.expires_in,
        user,
    })
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ? AND deleted_at IS NULL")
            .bind(email)
            .fetch_one(pool)
            .await?;
    if count > 0 {
        return Err(AppError::precondition("email already in use"));
    }
    Ok(())
}

pub(crate) async fn fetch_user_by_id(pool: &SqlitePool, id: Uuid) -> AppResult<DbUser> {
    let row = sqlx::query(
        "SELECT id, name, email, password_hash, role, permission_level, tenant_id, organization_id, created_at, updated_at, deleted_at \
         FROM users WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| row_parsers::db_user_from_row(&r))
        .transpose()?
        .ok_or_else(|| AppError::not_found(format!("user {} not found", id)))
}

async fn fetch_user_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<DbUser>> {
    let row = sqlx::query(
        "SELECT id, name, email, password_hash, role, permission_level, tenant_id, organization_id, created_at, updated_at, deleted_at \
         FROM users WHERE email = ? AND deleted_at IS NULL",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    row.map(|r| row_parsers::db_user_from_row(&r)).transpose()
}
