use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Tenant metadata, consumed for response enrichment only — access decisions
/// never read it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub domain: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantRole {
    Primary,
    Secondary,
}

impl TenantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantRole::Primary => "PRIMARY",
            TenantRole::Secondary => "SECONDARY",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "PRIMARY" => Ok(TenantRole::Primary),
            "SECONDARY" => Ok(TenantRole::Secondary),
            other => Err(AppError::internal(format!("unknown tenant role: {other}"))),
        }
    }
}

/// Membership of a tenant under an organization node. A tenant links to
/// exactly one PRIMARY organization and any number of SECONDARY ones.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TenantLink {
    pub tenant_id: Uuid,
    pub organization_id: Uuid,
    pub role: TenantRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TenantCreateRequest {
    #[schema(example = "Hotel Borealis Reykjavik")]
    pub name: String,
    #[schema(example = "borealis-rvk.example.com")]
    pub domain: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkTenantRequest {
    pub tenant_id: Uuid,
    pub role: TenantRole,
}
