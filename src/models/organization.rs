use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Maximum depth of the organization tree (GROUP=1 .. DEPARTMENT=4).
pub const MAX_HIERARCHY_DEPTH: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrgType {
    Group,
    Brand,
    Hotel,
    Department,
}

impl OrgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgType::Group => "GROUP",
            OrgType::Brand => "BRAND",
            OrgType::Hotel => "HOTEL",
            OrgType::Department => "DEPARTMENT",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "GROUP" => Ok(OrgType::Group),
            "BRAND" => Ok(OrgType::Brand),
            "HOTEL" => Ok(OrgType::Hotel),
            "DEPARTMENT" => Ok(OrgType::Department),
            other => Err(AppError::internal(format!("unknown org type: {other}"))),
        }
    }
}

/// One node of the organization tree. `path` is the slash-joined chain of
/// ancestor codes including self; `level == parent.level + 1`, root = 1.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrganizationNode {
    pub id: Uuid,
    pub org_type: OrgType,
    pub name: String,
    pub code: String,
    pub parent_id: Option<Uuid>,
    pub level: i64,
    pub path: String,
    #[schema(value_type = Object)]
    pub settings: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl OrganizationNode {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Raw row shape before the JSON settings column is decoded.
#[derive(Debug, Clone)]
pub struct DbOrganization {
    pub id: Uuid,
    pub org_type: OrgType,
    pub name: String,
    pub code: String,
    pub parent_id: Option<Uuid>,
    pub level: i64,
    pub path: String,
    pub settings: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbOrganization> for OrganizationNode {
    type Error = AppError;

    fn try_from(value: DbOrganization) -> Result<Self, Self::Error> {
        let settings = serde_json::from_str(&value.settings)
            .map_err(|err| AppError::internal(format!("invalid settings json: {err}")))?;
        Ok(OrganizationNode {
            id: value.id,
            org_type: value.org_type,
            name: value.name,
            code: value.code,
            parent_id: value.parent_id,
            level: value.level,
            path: value.path,
            settings,
            created_at: value.created_at,
            updated_at: value.updated_at,
            deleted_at: value.deleted_at,
        })
    }
}

/// The settings keys the engine itself reads and writes. Everything else in
/// the bag passes through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_preset: Option<String>,
}

impl NodeSettings {
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Write the typed fields back into the bag without clobbering foreign keys.
    pub fn merge_into(&self, value: &mut Value) {
        if !value.is_object() {
            *value = Value::Object(serde_json::Map::new());
        }
        if let Some(map) = value.as_object_mut() {
            match &self.applied_preset {
                Some(preset) => {
                    map.insert("applied_preset".to_string(), Value::String(preset.clone()));
                }
                None => {
                    map.remove("applied_preset");
                }
            }
        }
    }
}

/// Compute a child's materialized path from its parent's.
pub fn child_path(parent_path: Option<&str>, code: &str) -> String {
    match parent_path {
        Some(parent) => format!("{}/{}", parent, code),
        None => code.to_string(),
    }
}

/// Rewrite a descendant path after an ancestor's path changed.
/// `descendant` must start with `old_prefix`.
pub fn rebase_path(descendant: &str, old_prefix: &str, new_prefix: &str) -> String {
    match descendant.strip_prefix(old_prefix) {
        Some(rest) => format!("{}{}", new_prefix, rest),
        None => descendant.to_string(),
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrganizationCreateRequest {
    pub org_type: OrgType,
    #[schema(example = "Aurora Hospitality Group")]
    pub name: String,
    #[schema(example = "aurora")]
    pub code: String,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub settings: Option<Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrganizationUpdateRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub settings: Option<Value>,
}
