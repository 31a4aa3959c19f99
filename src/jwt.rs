//! Session Token Codec.
//!
//! Issuance resolves the actor's full hierarchy context (position, policy
//! snapshot, reachable tenants) and embeds it into the access token — the
//! token is a capability snapshot. Verification checks signature and expiry
//! only; it never re-resolves policy and never touches the store or cache.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppError;
use crate::models::session::{HierarchicalSession, HierarchyContext};
use crate::models::user::{User, PERMISSION_LEVEL_ADMIN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchicalClaims {
    pub sub: Uuid,
    pub email: String,
    pub role: String,
    pub permission_level: i64,
    pub tenant_id: Option<Uuid>,
    /// The capability snapshot. Absent on refresh tokens and on tokens minted
    /// before hierarchy assignment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<HierarchyContext>,
    #[serde(default)]
    pub accessible_tenants: Vec<Uuid>,
    pub token_type: TokenType,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_hours: i64,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret =
            std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let access_ttl_minutes = std::env::var("JWT_ACCESS_TTL_MINUTES")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(60))
            .map_err(|_| AppError::configuration("JWT_ACCESS_TTL_MINUTES must be a valid integer"))?;
        let refresh_ttl_hours = std::env::var("JWT_REFRESH_TTL_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(168))
            .map_err(|_| AppError::configuration("JWT_REFRESH_TTL_HOURS must be a valid integer"))?;

        Ok(Self {
            secret: Arc::new(secret.into_bytes()),
            access_ttl_minutes,
            refresh_ttl_hours,
        })
    }

    /// Mint an access/refresh pair. The access token embeds the resolved
    /// snapshot; the refresh token deliberately carries identity only, so a
    /// refresh always re-resolves from current store state instead of copying
    /// stale claims forward.
    pub fn issue_pair(
        &self,
        user: &User,
        hierarchy: Option<HierarchyContext>,
        accessible_tenants: Vec<Uuid>,
    ) -> Result<TokenPair, AppError> {
        use chrono::{Duration, Utc};

        let now = Utc::now();
        let access_exp = now + Duration::minutes(self.access_ttl_minutes);
        let refresh_exp = now + Duration::hours(self.refresh_ttl_hours);

        let access_claims = HierarchicalClaims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            permission_level: user.permission_level,
            tenant_id: user.tenant_id,
            hierarchy,
            accessible_tenants,
            token_type: TokenType::Access,
            exp: access_exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let refresh_claims = HierarchicalClaims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            permission_level: user.permission_level,
            tenant_id: user.tenant_id,
            hierarchy: None,
            accessible_tenants: Vec::new(),
            token_type: TokenType::Refresh,
            exp: refresh_exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        Ok(TokenPair {
            access_token: self.encode(&access_claims)?,
            refresh_token: self.encode(&refresh_claims)?,
            expires_in: self.access_ttl_minutes * 60,
        })
    }

    fn encode(&self, claims: &HierarchicalClaims) -> Result<String, AppError> {
        jsonwebtoken::encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|err| AppError::token(err.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<HierarchicalClaims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        jsonwebtoken::decode::<HierarchicalClaims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|err| AppError::token(err.to_string()))
    }

    pub fn decode_access(&self, token: &str) -> Result<HierarchicalClaims, AppError> {
        let claims = self.decode(token)?;
        if claims.token_type != TokenType::Access {
            return Err(AppError::token("not an access token"));
        }
        Ok(claims)
    }

    pub fn decode_refresh(&self, token: &str) -> Result<HierarchicalClaims, AppError> {
        let claims = self.decode(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AppError::token("not a refresh token"));
        }
        Ok(claims)
    }
}

/// Turn verified claims into the session the evaluator consumes, applying the
/// degraded-session rule for context-less tokens.
pub fn session_from_claims(claims: HierarchicalClaims) -> HierarchicalSession {
    HierarchicalSession {
        user_id: claims.sub,
        email: claims.email,
        role: claims.role,
        permission_level: claims.permission_level,
        tenant_id: claims.tenant_id,
        hierarchy: claims.hierarchy,
        accessible_tenants: claims.accessible_tenants,
    }
    .with_degraded_fallback()
}

/// Extractor for authenticated requests. Verification is signature + expiry
/// only and never blocks on the store or cache.
#[derive(Debug, Clone)]
pub struct AuthSession(pub HierarchicalSession);

impl AuthSession {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.0.permission_level >= PERMISSION_LEVEL_ADMIN {
            Ok(())
        } else {
            Err(AppError::forbidden(
                "administrative permission level required",
            ))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;

        let claims = state.jwt.decode_access(token)?;

        Ok(AuthSession(session_from_claims(claims)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::organization::OrgType;
    use crate::models::policy::{AccessLevel, DataCategory, SharingScope};
    use crate::models::session::CategoryPolicy;
    use crate::utils::utc_now;
    use std::collections::HashMap;

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: Arc::new(b"unit-test-secret".to_vec()),
            access_ttl_minutes: 60,
            refresh_ttl_hours: 24,
        }
    }

    fn test_user(tenant_id: Option<Uuid>) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role: "manager".to_string(),
            permission_level: 50,
            tenant_id,
            organization_id: None,
            created_at: utc_now(),
            updated_at: utc_now(),
            deleted_at: None,
        }
    }

    fn test_context() -> HierarchyContext {
        let mut policies = HashMap::new();
        policies.insert(
            DataCategory::Financial,
            CategoryPolicy {
                scope: SharingScope::Group,
                level: AccessLevel::Full,
            },
        );
        HierarchyContext {
            organization_id: Some(Uuid::new_v4()),
            organization_level: 1,
            organization_type: OrgType::Group,
            organization_path: "aurora".to_string(),
            access_scope: vec![Uuid::new_v4()],
            data_access_policies: policies,
        }
    }

    #[test]
    fn token_round_trip_preserves_the_snapshot() {
        let config = test_config();
        let tenant = Uuid::new_v4();
        let user = test_user(Some(tenant));
        let context = test_context();

        let pair = config
            .issue_pair(&user, Some(context.clone()), vec![tenant])
            .unwrap();
        let claims = config.decode_access(&pair.access_token).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.hierarchy, Some(context));
        assert_eq!(claims.accessible_tenants, vec![tenant]);
    }

    #[test]
    fn refresh_token_is_rejected_as_bearer() {
        let config = test_config();
        let user = test_user(Some(Uuid::new_v4()));
        let pair = config.issue_pair(&user, None, Vec::new()).unwrap();

        assert!(config.decode_access(&pair.refresh_token).is_err());
        assert!(config.decode_refresh(&pair.refresh_token).is_ok());
        assert!(config.decode_refresh(&pair.access_token).is_err());
    }

    #[test]
    fn refresh_token_never_carries_the_snapshot() {
        let config = test_config();
        let tenant = Uuid::new_v4();
        let user = test_user(Some(tenant));
        let pair = config
            .issue_pair(&user, Some(test_context()), vec![tenant])
            .unwrap();

        let claims = config.decode_refresh(&pair.refresh_token).unwrap();
        assert!(claims.hierarchy.is_none());
        assert!(claims.accessible_tenants.is_empty());
    }

    #[test]
    fn context_less_access_token_degrades_to_own_tenant() {
        let config = test_config();
        let tenant = Uuid::new_v4();
        let user = test_user(Some(tenant));
        let pair = config.issue_pair(&user, None, vec![tenant]).unwrap();

        let claims = config.decode_access(&pair.access_token).unwrap();
        let session = session_from_claims(claims);

        assert_eq!(session.accessible_tenants, vec![tenant]);
        let ctx = session.hierarchy.expect("degraded context");
        assert_eq!(ctx.organization_id, None);
        assert_eq!(ctx.organization_type, OrgType::Hotel);
    }

    #[test]
    fn tampered_token_fails_verification() {
        let config = test_config();
        let user = test_user(Some(Uuid::new_v4()));
        let pair = config.issue_pair(&user, None, Vec::new()).unwrap();

        let mut tampered = pair.access_token.clone();
        tampered.pop();
        tampered.push('x');
        assert!(config.decode(&tampered).is_err());
    }
}
