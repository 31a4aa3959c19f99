use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener};
use crate::hierarchy::store::HierarchySource;
use crate::hierarchy::{CacheConfig, HierarchyCache, HierarchyService, OrganizationStore};
use crate::jwt::JwtConfig;
use crate::routes::{access, auth, health, organizations, tenants};

/// Shared application state. Store, cache, and codec are constructed once
/// here and injected; nothing reaches for ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub hierarchy: HierarchyService,
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let cache_config = CacheConfig::from_env();

    let store = OrganizationStore::new(pool.clone());
    let source: Arc<dyn HierarchySource> = Arc::new(store.clone());
    let cache = Arc::new(HierarchyCache::new(source, cache_config));
    let _sweeper = cache.spawn_ttl_sweep(cache_config.sweep_interval);

    let (events, events_rx) = init_event_bus();
    let _listener = tokio::spawn(start_activity_listener(events_rx, pool.clone()));

    let hierarchy = HierarchyService::new(store, cache, events);

    let state = AppState {
        pool,
        jwt: Arc::new(jwt_config),
        hierarchy,
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/switch-organization", post(auth::switch_organization))
        .route("/me", get(auth::me));

    let organization_routes = Router::new()
        .route("/", post(organizations::create_organization))
        .route(
            "/:id",
            get(organizations::get_organization)
                .put(organizations::update_organization)
                .delete(organizations::delete_organization),
        )
        .route("/:id/subtree", get(organizations::get_subtree))
        .route("/:id/path", get(organizations::get_ancestor_path))
        .route(
            "/:id/tenants",
            get(organizations::get_accessible_tenants).post(organizations::link_tenant),
        )
        .route(
            "/:id/policies",
            get(organizations::list_policies).put(organizations::set_policies),
        )
        .route("/:id/presets/:preset_id", post(organizations::apply_preset));

    let tenant_routes = Router::new()
        .route("/", post(tenants::create_tenant))
        .route("/:id", get(tenants::get_tenant));

    let access_routes = Router::new()
        .route("/check", post(access::check))
        .route("/cache-stats", get(access::cache_stats));

    let router = Router::new()
        .route("/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/organizations", organization_routes)
        .nest("/tenants", tenant_routes)
        .nest("/access", access_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
