use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::server::Server;
use utoipa::OpenApi;

use crate::hierarchy::evaluator::{AccessDecision, AccessTarget, DenyReason};
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health,
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::refresh,
        crate::routes::auth::switch_organization,
        crate::routes::auth::me,
        crate::routes::organizations::create_organization,
        crate::routes::organizations::get_organization,
        crate::routes::organizations::update_organization,
        crate::routes::organizations::delete_organization,
        crate::routes::organizations::get_subtree,
        crate::routes::organizations::get_ancestor_path,
        crate::routes::organizations::get_accessible_tenants,
        crate::routes::organizations::set_policies,
        crate::routes::organizations::list_policies,
        crate::routes::organizations::apply_preset,
        crate::routes::organizations::link_tenant,
        crate::routes::tenants::create_tenant,
        crate::routes::tenants::get_tenant,
        crate::routes::access::check,
        crate::routes::access::cache_stats,
    ),
    components(
        schemas(
            models::user::User,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::user::RefreshRequest,
            models::user::SwitchOrganizationRequest,
            models::organization::OrgType,
            models::organization::OrganizationNode,
            models::organization::OrganizationCreateRequest,
            models::organization::OrganizationUpdateRequest,
            models::policy::DataCategory,
            models::policy::SharingScope,
            models::policy::AccessLevel,
            models::policy::Operation,
            models::policy::DataSharingPolicy,
            models::policy::PolicyInput,
            models::session::CategoryPolicy,
            models::session::HierarchyContext,
            models::session::HierarchicalSession,
            models::tenant::Tenant,
            models::tenant::TenantRole,
            models::tenant::TenantLink,
            models::tenant::TenantCreateRequest,
            models::tenant::LinkTenantRequest,
            AccessTarget,
            AccessDecision,
            DenyReason,
        )
    ),
    tags(
        (name = "Auth", description = "Session issuance and refresh"),
        (name = "Organizations", description = "Hierarchy management"),
        (name = "Policies", description = "Data-sharing policies and presets"),
        (name = "Tenants", description = "Tenant metadata"),
        (name = "Access", description = "Access evaluation"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ApiDoc;

/// Assemble the OpenAPI document with the bearer scheme and a local server
/// entry so Swagger UI's Authorize dialog works out of the box.
pub fn build_openapi(port: u16) -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    doc.servers = Some(vec![Server::new(format!("http://localhost:{port}"))]);

    if let Some(components) = doc.components.as_mut() {
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }

    doc
}
