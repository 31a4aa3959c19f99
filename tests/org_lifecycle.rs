//! Delete preconditions: a node leaves the tree only once it is childless
//! and tenant-less, and soft-deleted nodes drop out of traversal.

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt;

async fn setup_app(db_name: &str) -> Result<(Router, TempDir)> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join(db_name);
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = stayhub::create_app(pool).await?;
    Ok((app, dir))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

async fn register_admin(app: &Router) -> Result<String> {
    let (status, body) = send(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "name": "Root Admin",
            "email": "admin@example.com",
            "password": "password123"
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(body["access_token"].as_str().unwrap().to_string())
}

async fn create_org(
    app: &Router,
    token: &str,
    org_type: &str,
    name: &str,
    code: &str,
    parent_id: Option<&str>,
) -> Result<Value> {
    let (status, body) = send(
        app,
        "POST",
        "/organizations",
        Some(token),
        Some(json!({
            "org_type": org_type,
            "name": name,
            "code": code,
            "parent_id": parent_id
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(body)
}

#[tokio::test]
async fn delete_is_blocked_by_active_children_then_succeeds() -> Result<()> {
    let (app, _dir) = setup_app("lifecycle_children.db").await?;
    let token = register_admin(&app).await?;

    let group = create_org(&app, &token, "GROUP", "G", "g", None).await?;
    let group_id = group["id"].as_str().unwrap().to_string();
    let brand = create_org(&app, &token, "BRAND", "B", "b", Some(&group_id)).await?;
    let brand_id = brand["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "DELETE",
        &format!("/organizations/{group_id}"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "precondition_failed");

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/organizations/{brand_id}"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // With the child gone the parent can follow.
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/organizations/{group_id}"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/organizations/{group_id}"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn delete_is_blocked_by_linked_tenants() -> Result<()> {
    let (app, _dir) = setup_app("lifecycle_tenants.db").await?;
    let token = register_admin(&app).await?;

    let group = create_org(&app, &token, "GROUP", "G", "g", None).await?;
    let group_id = group["id"].as_str().unwrap().to_string();

    let (status, tenant) = send(
        &app,
        "POST",
        "/tenants",
        Some(&token),
        Some(json!({ "name": "Ops Tenant" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/organizations/{group_id}/tenants"),
        Some(&token),
        Some(json!({
            "tenant_id": tenant["id"],
            "role": "PRIMARY"
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        "DELETE",
        &format!("/organizations/{group_id}"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "precondition_failed");

    Ok(())
}

#[tokio::test]
async fn a_deleted_nodes_code_can_be_reused() -> Result<()> {
    let (app, _dir) = setup_app("lifecycle_code_reuse.db").await?;
    let token = register_admin(&app).await?;

    let group = create_org(&app, &token, "GROUP", "G", "g", None).await?;
    let group_id = group["id"].as_str().unwrap().to_string();
    let brand = create_org(&app, &token, "BRAND", "Old", "legacy", Some(&group_id)).await?;

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/organizations/{}", brand["id"].as_str().unwrap()),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // The soft-deleted sibling no longer blocks the code.
    let replacement = create_org(&app, &token, "BRAND", "New", "legacy", Some(&group_id)).await?;
    assert_eq!(replacement["path"], "g/legacy");

    Ok(())
}

#[tokio::test]
async fn second_primary_link_for_a_tenant_is_rejected() -> Result<()> {
    let (app, _dir) = setup_app("lifecycle_primary.db").await?;
    let token = register_admin(&app).await?;

    let group = create_org(&app, &token, "GROUP", "G", "g", None).await?;
    let group_id = group["id"].as_str().unwrap().to_string();
    let brand = create_org(&app, &token, "BRAND", "B", "b", Some(&group_id)).await?;
    let brand_id = brand["id"].as_str().unwrap().to_string();

    let (_, tenant) = send(
        &app,
        "POST",
        "/tenants",
        Some(&token),
        Some(json!({ "name": "Wanderer" })),
    )
    .await?;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/organizations/{group_id}/tenants"),
        Some(&token),
        Some(json!({ "tenant_id": tenant["id"], "role": "PRIMARY" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/organizations/{brand_id}/tenants"),
        Some(&token),
        Some(json!({ "tenant_id": tenant["id"], "role": "PRIMARY" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // A secondary link elsewhere is fine.
    let (status, _) = send(
        &app,
        "POST",
        &format!("/organizations/{brand_id}/tenants"),
        Some(&token),
        Some(json!({ "tenant_id": tenant["id"], "role": "SECONDARY" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    Ok(())
}

#[tokio::test]
async fn structural_mutations_require_admin() -> Result<()> {
    let (app, _dir) = setup_app("lifecycle_authz.db").await?;
    let admin_token = register_admin(&app).await?;

    // Second registration is a regular staff account.
    let (status, staff) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "name": "Staff",
            "email": "staff@example.com",
            "password": "password123"
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let staff_token = staff["access_token"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/organizations",
        Some(staff_token),
        Some(json!({
            "org_type": "GROUP",
            "name": "Nope",
            "code": "nope",
            "parent_id": null
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = send(
        &app,
        "POST",
        "/organizations",
        Some(&admin_token),
        Some(json!({
            "org_type": "GROUP",
            "name": "Yes",
            "code": "yes",
            "parent_id": null
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    Ok(())
}
