//! Policy seeding, idempotent upserts, and named presets.

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

fn policy_for<'a>(policies: &'a Value, category: &str) -> &'a Value {
    policies
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["data_category"] == category)
        .unwrap_or_else(|| panic!("no policy for {category}"))
}

#[tokio::test]
async fn node_creation_seeds_type_defaults() -> Result<()> {
    let (app, _dir) = setup_app("policy_defaults.db").await?;
    let token = register_admin(&app).await?;

    let group = create_org(&app, &token, "GROUP", "G", "g", None).await?;
    let group_id = group["id"].as_str().unwrap().to_string();
    let brand = create_org(&app, &token, "BRAND", "B", "b", Some(&group_id)).await?;
    let brand_id = brand["id"].as_str().unwrap().to_string();

    let (status, group_policies) = send(
        &app,
        "GET",
        &format!("/organizations/{group_id}/policies"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(group_policies.as_array().unwrap().len(), 6);
    for policy in group_policies.as_array().unwrap() {
        assert_eq!(policy["sharing_scope"], "GROUP");
        assert_eq!(policy["access_level"], "FULL");
    }

    let (_, brand_policies) = send(
        &app,
        "GET",
        &format!("/organizations/{brand_id}/policies"),
        Some(&token),
        None,
    )
    .await?;
    let analytics = policy_for(&brand_policies, "ANALYTICS");
    assert_eq!(analytics["sharing_scope"], "GROUP");
    assert_eq!(analytics["access_level"], "SUMMARY_ONLY");
    let customer = policy_for(&brand_policies, "CUSTOMER");
    assert_eq!(customer["sharing_scope"], "BRAND");
    assert_eq!(customer["access_level"], "FULL");

    Ok(())
}

#[tokio::test]
async fn department_defaults_split_guest_facing_from_operational() -> Result<()> {
    let (app, _dir) = setup_app("policy_department.db").await?;
    let token = register_admin(&app).await?;

    let group = create_org(&app, &token, "GROUP", "G", "g", None).await?;
    let brand = create_org(&app, &token, "BRAND", "B", "b", Some(group["id"].as_str().unwrap())).await?;
    let hotel = create_org(&app, &token, "HOTEL", "H", "h", Some(brand["id"].as_str().unwrap())).await?;
    let dept = create_org(
        &app,
        &token,
        "DEPARTMENT",
        "D",
        "d",
        Some(hotel["id"].as_str().unwrap()),
    )
    .await?;

    let (_, policies) = send(
        &app,
        "GET",
        &format!("/organizations/{}/policies", dept["id"].as_str().unwrap()),
        Some(&token),
        None,
    )
    .await?;

    assert_eq!(policy_for(&policies, "CUSTOMER")["access_level"], "READ_ONLY");
    assert_eq!(policy_for(&policies, "RESERVATION")["access_level"], "READ_ONLY");
    assert_eq!(policy_for(&policies, "FINANCIAL")["access_level"], "READ_ONLY");
    assert_eq!(policy_for(&policies, "STAFF")["access_level"], "FULL");
    assert_eq!(policy_for(&policies, "INVENTORY")["access_level"], "FULL");
    assert_eq!(policy_for(&policies, "ANALYTICS")["access_level"], "ANALYTICS_ONLY");
    for policy in policies.as_array().unwrap() {
        assert_eq!(policy["sharing_scope"], "DEPARTMENT");
    }

    Ok(())
}

#[tokio::test]
async fn policy_upsert_is_idempotent() -> Result<()> {
    let (app, _dir) = setup_app("policy_idempotent.db").await?;
    let token = register_admin(&app).await?;

    let group = create_org(&app, &token, "GROUP", "G", "g", None).await?;
    let group_id = group["id"].as_str().unwrap().to_string();

    let upsert = json!([
        { "data_category": "FINANCIAL", "sharing_scope": "BRAND", "access_level": "READ_ONLY" },
        { "data_category": "ANALYTICS", "sharing_scope": "NONE", "access_level": "SUMMARY_ONLY" }
    ]);

    let (status, first) = send(
        &app,
        "PUT",
        &format!("/organizations/{group_id}/policies"),
        Some(&token),
        Some(upsert.clone()),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, second) = send(
        &app,
        "PUT",
        &format!("/organizations/{group_id}/policies"),
        Some(&token),
        Some(upsert),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let strip_timestamps = |value: &Value| -> Vec<(String, String, String)> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|p| {
                (
                    p["data_category"].as_str().unwrap().to_string(),
                    p["sharing_scope"].as_str().unwrap().to_string(),
                    p["access_level"].as_str().unwrap().to_string(),
                )
            })
            .collect()
    };
    assert_eq!(strip_timestamps(&first), strip_timestamps(&second));

    let (_, stored) = send(
        &app,
        "GET",
        &format!("/organizations/{group_id}/policies"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(policy_for(&stored, "FINANCIAL")["access_level"], "READ_ONLY");
    assert_eq!(policy_for(&stored, "ANALYTICS")["sharing_scope"], "NONE");

    Ok(())
}

#[tokio::test]
async fn hotel_independence_preset_sets_all_six_and_records_itself() -> Result<()> {
    let (app, _dir) = setup_app("policy_preset.db").await?;
    let token = register_admin(&app).await?;

    let group = create_org(&app, &token, "GROUP", "G", "g", None).await?;
    let brand = create_org(&app, &token, "BRAND", "B", "b", Some(group["id"].as_str().unwrap())).await?;
    let hotel = create_org(&app, &token, "HOTEL", "H", "h", Some(brand["id"].as_str().unwrap())).await?;
    let hotel_id = hotel["id"].as_str().unwrap().to_string();

    let (status, policies) = send(
        &app,
        "POST",
        &format!("/organizations/{hotel_id}/presets/hotel-independence"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let policies = policies.as_array().unwrap();
    assert_eq!(policies.len(), 6);
    for policy in policies {
        assert_eq!(policy["sharing_scope"], "HOTEL");
        assert_eq!(policy["access_level"], "FULL");
    }

    let (_, node) = send(
        &app,
        "GET",
        &format!("/organizations/{hotel_id}"),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(node["settings"]["applied_preset"], "hotel-independence");

    Ok(())
}

#[tokio::test]
async fn unknown_preset_is_not_found() -> Result<()> {
    let (app, _dir) = setup_app("policy_preset_unknown.db").await?;
    let token = register_admin(&app).await?;

    let group = create_org(&app, &token, "GROUP", "G", "g", None).await?;
    let (status, body) = send(
        &app,
        "POST",
        &format!(
            "/organizations/{}/presets/total-anarchy",
            group["id"].as_str().unwrap()
        ),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    Ok(())
}
