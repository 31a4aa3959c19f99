use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use stayhub::events::init_event_bus;
use stayhub::hierarchy::store::HierarchySource;
use stayhub::hierarchy::{CacheConfig, HierarchyCache, HierarchyService, OrganizationStore};
use stayhub::models::organization::{OrgType, OrganizationCreateRequest};
use stayhub::models::tenant::TenantRole;
use stayhub::utils::{hash_password, utc_now};

#[derive(Parser, Debug)]
#[command(author, version, about = "stayhub admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Roll back the last applied migration
    MigrateRollback,
    /// Build a demonstration hierarchy (group/brand/hotel/department, two
    /// tenants, and an admin account)
    SeedDemo {
        /// Password for the seeded admin account
        #[arg(long, default_value = "demo-admin-password")]
        admin_password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try to load env from CWD; when running in Docker the binary CWD may differ,
    // so fall back to the crate-local `.env` using CARGO_MANIFEST_DIR.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::MigrateRollback => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator
                .undo(&pool, 1)
                .await
                .context("no migrations were rolled back")?;
            println!("Rolled back last migration");
        }
        Commands::SeedDemo { admin_password } => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            seed_demo(&pool, &admin_password).await?;
        }
    }

    Ok(())
}

async fn seed_demo(pool: &SqlitePool, admin_password: &str) -> anyhow::Result<()> {
    let store = OrganizationStore::new(pool.clone());
    let source: Arc<dyn HierarchySource> = Arc::new(store.clone());
    let cache = Arc::new(HierarchyCache::new(source, CacheConfig::default()));
    let (events, _rx) = init_event_bus();
    let service = HierarchyService::new(store.clone(), cache, events);

    let group = service
        .create_organization(
            None,
            OrganizationCreateRequest {
                org_type: OrgType::Group,
                name: "Aurora Hospitality Group".to_string(),
                code: "aurora".to_string(),
                parent_id: None,
                settings: None,
            },
        )
        .await?;

    let brand = service
        .create_organization(
            None,
            OrganizationCreateRequest {
                org_type: OrgType::Brand,
                name: "Borealis Hotels".to_string(),
                code: "borealis".to_string(),
                parent_id: Some(group.id),
                settings: None,
            },
        )
        .await?;

    let hotel = service
        .create_organization(
            None,
            OrganizationCreateRequest {
                org_type: OrgType::Hotel,
                name: "Borealis Reykjavik".to_string(),
                code: "rvk01".to_string(),
                parent_id: Some(brand.id),
                settings: None,
            },
        )
        .await?;

    let department = service
        .create_organization(
            None,
            OrganizationCreateRequest {
                org_type: OrgType::Department,
                name: "Front Desk".to_string(),
                code: "front-desk".to_string(),
                parent_id: Some(hotel.id),
                settings: None,
            },
        )
        .await?;

    let city_tenant = store
        .insert_tenant("Borealis Reykjavik Operations", Some("rvk.borealis.example"))
        .await?;
    let spa_tenant = store.insert_tenant("Borealis Spa", None).await?;

    service
        .link_tenant(None, city_tenant.id, hotel.id, TenantRole::Primary)
        .await?;
    service
        .link_tenant(None, spa_tenant.id, department.id, TenantRole::Primary)
        .await?;

    service
        .apply_preset(None, brand.id, "brand-separation")
        .await?;

    let admin_id = Uuid::new_v4();
    let password_hash = hash_password(admin_password)?;
    let now = utc_now();
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash, role, permission_level, tenant_id, organization_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 'admin', 100, ?, ?, ?, ?)",
    )
    .bind(admin_id.to_string())
    .bind("Demo Admin")
    .bind("admin@stayhub.local")
    .bind(password_hash)
    .bind(city_tenant.id.to_string())
    .bind(group.id.to_string())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    println!("Seeded demo hierarchy:");
    println!("  group      {}  ({})", group.id, group.path);
    println!("  brand      {}  ({})", brand.id, brand.path);
    println!("  hotel      {}  ({})", hotel.id, hotel.path);
    println!("  department {}  ({})", department.id, department.path);
    println!("  tenants    {} / {}", city_tenant.id, spa_tenant.id);
    println!("  admin      admin@stayhub.local (password: {})", admin_password);

    Ok(())
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let timestamp = Utc::now().format("%Y_%m_%d_%H%M%S");
    let sanitized = sanitize_name(name);
    let filename = format!("{}_{}.sql", timestamp, sanitized);
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
    sqlx::migrate::Migrator::new(dir)
        .await
        .context("failed to load migrations")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let db_applied = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'",
    )
    .fetch_optional(pool)
    .await?;
    let applied_versions: HashSet<i64> = if db_applied.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter()
            .filter_map(|row| row.try_get::<i64, _>("version").ok())
            .collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let version = migration.version;
        let applied = applied_versions.contains(&version);
        let status = if applied { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        println!("{:<8} {:<20} {}", status, version, desc);
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}
