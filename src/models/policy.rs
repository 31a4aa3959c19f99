use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Business data classes whose sharing is independently policy-controlled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataCategory {
    Customer,
    Reservation,
    Analytics,
    Financial,
    Staff,
    Inventory,
}

impl DataCategory {
    pub const ALL: [DataCategory; 6] = [
        DataCategory::Customer,
        DataCategory::Reservation,
        DataCategory::Analytics,
        DataCategory::Financial,
        DataCategory::Staff,
        DataCategory::Inventory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataCategory::Customer => "CUSTOMER",
            DataCategory::Reservation => "RESERVATION",
            DataCategory::Analytics => "ANALYTICS",
            DataCategory::Financial => "FINANCIAL",
            DataCategory::Staff => "STAFF",
            DataCategory::Inventory => "INVENTORY",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "CUSTOMER" => Ok(DataCategory::Customer),
            "RESERVATION" => Ok(DataCategory::Reservation),
            "ANALYTICS" => Ok(DataCategory::Analytics),
            "FINANCIAL" => Ok(DataCategory::Financial),
            "STAFF" => Ok(DataCategory::Staff),
            "INVENTORY" => Ok(DataCategory::Inventory),
            other => Err(AppError::internal(format!("unknown data category: {other}"))),
        }
    }
}

/// The organizational breadth at which a data category is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SharingScope {
    Group,
    Brand,
    Hotel,
    Department,
    None,
}

impl SharingScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharingScope::Group => "GROUP",
            SharingScope::Brand => "BRAND",
            SharingScope::Hotel => "HOTEL",
            SharingScope::Department => "DEPARTMENT",
            SharingScope::None => "NONE",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "GROUP" => Ok(SharingScope::Group),
            "BRAND" => Ok(SharingScope::Brand),
            "HOTEL" => Ok(SharingScope::Hotel),
            "DEPARTMENT" => Ok(SharingScope::Department),
            "NONE" => Ok(SharingScope::None),
            other => Err(AppError::internal(format!("unknown sharing scope: {other}"))),
        }
    }
}

/// The operation ceiling granted for a category at a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessLevel {
    Full,
    ReadOnly,
    AnalyticsOnly,
    SummaryOnly,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Full => "FULL",
            AccessLevel::ReadOnly => "READ_ONLY",
            AccessLevel::AnalyticsOnly => "ANALYTICS_ONLY",
            AccessLevel::SummaryOnly => "SUMMARY_ONLY",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "FULL" => Ok(AccessLevel::Full),
            "READ_ONLY" => Ok(AccessLevel::ReadOnly),
            "ANALYTICS_ONLY" => Ok(AccessLevel::AnalyticsOnly),
            "SUMMARY_ONLY" => Ok(AccessLevel::SummaryOnly),
            other => Err(AppError::internal(format!("unknown access level: {other}"))),
        }
    }
}

/// Operation the caller wants to perform on a data category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
}

impl Operation {
    /// CREATE/UPDATE/DELETE require a FULL access level; READ does not.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::Read)
    }
}

/// Explicit per-node sharing policy row. Absence means the type-based
/// default applies (see `hierarchy::policy`).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DataSharingPolicy {
    pub organization_id: Uuid,
    pub data_category: DataCategory,
    pub sharing_scope: SharingScope,
    pub access_level: AccessLevel,
    /// Opaque structured constraints (time windows etc.), evaluated by the
    /// caller, never interpreted by the engine.
    #[schema(value_type = Object)]
    pub conditions: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of a policy upsert batch.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PolicyInput {
    pub data_category: DataCategory,
    pub sharing_scope: SharingScope,
    pub access_level: AccessLevel,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub conditions: Option<Value>,
}
