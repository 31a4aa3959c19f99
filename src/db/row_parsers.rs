//! Row decoding for TEXT-encoded uuid and timestamp columns.
//!
//! SQLite stores everything as text here; these helpers turn raw rows into
//! typed structs and keep the parsing noise out of the stores.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::organization::{DbOrganization, OrgType};
use crate::models::policy::{AccessLevel, DataCategory, DataSharingPolicy, SharingScope};
use crate::models::tenant::{Tenant, TenantLink, TenantRole};
use crate::models::user::DbUser;

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // RFC3339 first (e.g. 2025-11-19T12:34:56Z), then SQLite's default
    // "YYYY-MM-DD HH:MM:SS" with optional fractional seconds, then date-only.
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range".to_string()))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

fn get_text(row: &SqliteRow, column: &str) -> Result<String, AppError> {
    row.try_get(column)
        .map_err(|e| AppError::internal(format!("missing {}: {}", column, e)))
}

fn get_opt_text(row: &SqliteRow, column: &str) -> Result<Option<String>, AppError> {
    row.try_get(column)
        .map_err(|e| AppError::internal(format!("missing {}: {}", column, e)))
}

fn get_i64(row: &SqliteRow, column: &str) -> Result<i64, AppError> {
    row.try_get(column)
        .map_err(|e| AppError::internal(format!("missing {}: {}", column, e)))
}

fn parse_uuid(s: &str, column: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(s).map_err(|e| AppError::internal(format!("invalid uuid in {}: {}", column, e)))
}

fn get_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, AppError> {
    parse_uuid(&get_text(row, column)?, column)
}

fn get_opt_uuid(row: &SqliteRow, column: &str) -> Result<Option<Uuid>, AppError> {
    match get_opt_text(row, column)? {
        Some(s) if !s.is_empty() => Ok(Some(parse_uuid(&s, column)?)),
        _ => Ok(None),
    }
}

fn get_datetime(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, AppError> {
    parse_datetime(&get_text(row, column)?)
}

fn get_opt_datetime(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>, AppError> {
    match get_opt_text(row, column)? {
        Some(s) if !s.trim().is_empty() => Ok(Some(parse_datetime(&s)?)),
        _ => Ok(None),
    }
}

pub fn db_organization_from_row(row: &SqliteRow) -> Result<DbOrganization, AppError> {
    Ok(DbOrganization {
        id: get_uuid(row, "id")?,
        org_type: OrgType::parse(&get_text(row, "org_type")?)?,
        name: get_text(row, "name")?,
        code: get_text(row, "code")?,
        parent_id: get_opt_uuid(row, "parent_id")?,
        level: get_i64(row, "level")?,
        path: get_text(row, "path")?,
        settings: get_text(row, "settings")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
        deleted_at: get_opt_datetime(row, "deleted_at")?,
    })
}

pub fn data_sharing_policy_from_row(row: &SqliteRow) -> Result<DataSharingPolicy, AppError> {
    let conditions_raw = get_text(row, "conditions")?;
    let conditions = serde_json::from_str(&conditions_raw)
        .map_err(|e| AppError::internal(format!("invalid conditions json: {}", e)))?;

    Ok(DataSharingPolicy {
        organization_id: get_uuid(row, "organization_id")?,
        data_category: DataCategory::parse(&get_text(row, "data_category")?)?,
        sharing_scope: SharingScope::parse(&get_text(row, "sharing_scope")?)?,
        access_level: AccessLevel::parse(&get_text(row, "access_level")?)?,
        conditions,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}

pub fn tenant_from_row(row: &SqliteRow) -> Result<Tenant, AppError> {
    Ok(Tenant {
        id: get_uuid(row, "id")?,
        name: get_text(row, "name")?,
        domain: get_opt_text(row, "domain")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}

pub fn tenant_link_from_row(row: &SqliteRow) -> Result<TenantLink, AppError> {
    Ok(TenantLink {
        tenant_id: get_uuid(row, "tenant_id")?,
        organization_id: get_uuid(row, "organization_id")?,
        role: TenantRole::parse(&get_text(row, "role")?)?,
        created_at: get_datetime(row, "created_at")?,
    })
}

pub fn db_user_from_row(row: &SqliteRow) -> Result<DbUser, AppError> {
    Ok(DbUser {
        id: get_uuid(row, "id")?,
        name: get_text(row, "name")?,
        email: get_text(row, "email")?,
        password_hash: get_text(row, "password_hash")?,
        role: get_text(row, "role")?,
        permission_level: get_i64(row, "permission_level")?,
        tenant_id: get_opt_uuid(row, "tenant_id")?,
        organization_id: get_opt_uuid(row, "organization_id")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
        deleted_at: get_opt_datetime(row, "deleted_at")?,
    })
}
