use axum::extract::State;
use axum::Json;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::hierarchy::cache::CacheStats;
use crate::hierarchy::{check_access, AccessDecision, AccessTarget};
use crate::jwt::AuthSession;

/// Evaluate the caller's session against a target. The decision runs purely
/// on the token's embedded snapshot — no store or cache reads — so a denied
/// caller learns the stable reason code without leaking anything else.
#[utoipa::path(
    post,
    path = "/access/check",
    tag = "Access",
    request_body = AccessTarget,
    responses(
        (status = 200, description = "The access decision", body = AccessDecision)
    ),
    security(("bearerAuth" = []))
)]
pub async fn check(
    auth: AuthSession,
    Json(target): Json<AccessTarget>,
) -> Json<AccessDecision> {
    let decision = check_access(&auth.0, &target);

    if !decision.allowed {
        tracing::debug!(
            user_id = %auth.0.user_id,
            tenant_id = %target.tenant_id,
            category = ?target.category,
            operation = ?target.operation,
            reason = ?decision.reason,
            "access denied"
        );
    }

    Json(decision)
}

#[utoipa::path(
    get,
    path = "/access/cache-stats",
    tag = "Access",
    responses(
        (status = 200, description = "Hierarchy cache counters")
    ),
    security(("bearerAuth" = []))
)]
pub async fn cache_stats(
    State(state): State<AppState>,
    auth: AuthSession,
) -> AppResult<Json<CacheStats>> {
    auth.require_admin()?;
    Ok(Json(state.hierarchy.cache().stats()))
}
