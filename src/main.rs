//! VoiceFlow API - Employee Voice Escalation Platform
//!
//! Employees submit proposals ("voices") that accumulate weighted votes and
//! escalate through a five-tier governance hierarchy.
//!
//! ESCALATION ENGINE: the server hosts the full escalation workflow:
//! - Scoring: weighted vote contributions from voter attributes
//! - Classification: score thresholds drive six ordered agenda levels
//! - Visibility: per-viewer permissions recomputed on every read
//! - Decisions: tier-indexed state machine with rescue flows
//! - Expiration: forced resolution when a deadline lapses below target

mod config;
mod directory;
mod engine;
mod error;
mod models;
mod notify;
mod repository;
mod routes;
mod state;
mod voice;

use crate::config::Settings;
use crate::engine::config::EngineConfig;
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting VoiceFlow - Employee Voice Escalation Platform...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    // Engine configuration: file override or compiled-in defaults
    let engine_config = match settings.engine_config_path.as_deref() {
        Some(path) => {
            info!("📐 Loading engine configuration from {}", path);
            EngineConfig::load_from_file(path)
                .map_err(|e| anyhow::anyhow!("Engine config rejected: {}", e))?
        }
        None => {
            warn!("⚠️  ENGINE_CONFIG_PATH not set, using built-in weight and threshold tables");
            EngineConfig::builtin().clone()
        }
    };

    // Initialize database pool - REQUIRED (no fallback to in-memory)
    let state = match init_database_pool().await {
        Ok(pool) => {
            info!("✅ Database pool created successfully");

            if let Err(e) = create_database_tables(&pool).await {
                warn!("⚠️  Warning creating tables: {}", e);
            }

            Arc::new(AppState::new(pool, engine_config))
        }
        Err(e) => {
            error!("❌ FATAL: Failed to initialize database pool: {}", e);
            error!("DATABASE_URL must be set in .env and database must be accessible");
            return Err(e);
        }
    };

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   ─── Voices ───");
    info!("   POST /api/voices                    - Submit a new voice");
    info!("   GET  /api/voices                    - List voices (filterable)");
    info!("   GET  /api/voices/:id                - Fetch a voice");
    info!("   POST /api/voices/:id/votes          - Cast a weighted vote");
    info!("   GET  /api/voices/:id/permissions    - Per-viewer permissions");
    info!("   GET  /api/voices/:id/progress       - Score progress & consensus");
    info!("");
    info!("   ─── Escalation Decisions ───");
    info!("   POST /api/voices/:id/decisions      - Execute a tier decision");
    info!("   GET  /api/voices/:id/decisions      - Decision history");
    info!("");
    info!("   ─── Deadline Expiration ───");
    info!("   POST /api/expiration/scan           - List expired voices");
    info!("   POST /api/voices/:id/expiration     - Resolve an expired voice");
    info!("   GET  /api/voices/:id/expiration     - Expiration history");
    info!("");
    info!("   ─── Administration ───");
    info!("   GET  /api/admin/engine-config            - Active configuration");
    info!("   PUT  /api/admin/engine-config            - Update configuration");
    info!("   GET  /api/admin/engine-config/revisions  - Revision audit trail");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,voiceflow_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Initialize database pool from DATABASE_URL
async fn init_database_pool() -> anyhow::Result<deadpool_postgres::Pool> {
    // Load .env file first
    let _ = dotenvy::dotenv();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL not set in environment or .env file"))?;

    // Parse the DATABASE_URL using tokio_postgres::Config
    let config = database_url
        .parse::<tokio_postgres::Config>()
        .map_err(|e| anyhow::anyhow!("Failed to parse DATABASE_URL: {}", e))?;

    // Extract connection parameters from parsed config
    let hosts = config.get_hosts();
    let host_str = if !hosts.is_empty() {
        match &hosts[0] {
            tokio_postgres::config::Host::Tcp(s) => s.clone(),
            tokio_postgres::config::Host::Unix(_) => {
                return Err(anyhow::anyhow!("Unix socket connections are not supported"));
            }
        }
    } else {
        return Err(anyhow::anyhow!("No host in DATABASE_URL"));
    };

    let ports = config.get_ports();
    let port = if !ports.is_empty() { ports[0] } else { 5432 };

    let user = config
        .get_user()
        .map(|u| u.to_string())
        .ok_or_else(|| anyhow::anyhow!("No user in DATABASE_URL"))?;

    let password = config
        .get_password()
        .map(|p| String::from_utf8_lossy(p).to_string())
        .unwrap_or_default();

    let database = config
        .get_dbname()
        .map(|db| db.to_string())
        .ok_or_else(|| anyhow::anyhow!("No database name in DATABASE_URL"))?;

    // Determine if TLS is needed (managed Postgres hosts usually require it)
    let use_tls = database_url.contains("sslmode=require");

    // Create deadpool config
    use deadpool_postgres::{Config, ManagerConfig, RecyclingMethod};

    let mut cfg = Config::new();
    cfg.host = Some(host_str.clone());
    cfg.port = Some(port);
    cfg.user = Some(user);
    cfg.password = Some(password);
    cfg.dbname = Some(database);
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    // Create pool with TLS support if needed
    let pool = if use_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

        cfg.create_pool(Some(deadpool_postgres::Runtime::Tokio1), tls)
            .map_err(|e| anyhow::anyhow!("Failed to create TLS pool: {}", e))?
    } else {
        cfg.create_pool(Some(deadpool_postgres::Runtime::Tokio1), tokio_postgres::NoTls)
            .map_err(|e| anyhow::anyhow!("Failed to create pool: {}", e))?
    };

    // Test the connection
    let client = pool
        .get()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get pool connection: {}", e))?;

    // Simple test query to verify connection works
    let _row = client
        .query_one("SELECT 1 as ok", &[])
        .await
        .map_err(|e| anyhow::anyhow!("Failed to verify database connection: {}", e))?;

    info!("✅ Database connection successful (TLS: {})", use_tls);
    Ok(pool)
}

/// Create database tables if they don't exist
async fn create_database_tables(pool: &deadpool_postgres::Pool) -> anyhow::Result<()> {
    let client = pool.get().await?;

    // Organization members (identity facts for scoring and visibility)
    client
        .execute(
            "CREATE TABLE IF NOT EXISTS org_members (
                id UUID PRIMARY KEY,
                email VARCHAR(255) UNIQUE,
                display_name VARCHAR(255),
                department VARCHAR(255) NOT NULL,
                facility VARCHAR(255) NOT NULL,
                corporation VARCHAR(255) NOT NULL,
                permission_tier VARCHAR(50) NOT NULL,
                profession VARCHAR(100),
                years_of_experience INTEGER NOT NULL DEFAULT 0,
                certifications TEXT[] NOT NULL DEFAULT '{}',
                role VARCHAR(50),
                is_manager BOOLEAN NOT NULL DEFAULT false,
                created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            &[],
        )
        .await?;

    // Voices
    client
        .execute(
            "CREATE TABLE IF NOT EXISTS voices (
                id UUID PRIMARY KEY,
                author_id UUID NOT NULL,
                department VARCHAR(255) NOT NULL,
                facility VARCHAR(255) NOT NULL,
                corporation VARCHAR(255) NOT NULL,
                category VARCHAR(100) NOT NULL,
                title VARCHAR(255) NOT NULL,
                body TEXT NOT NULL,
                level VARCHAR(50) NOT NULL,
                status VARCHAR(50) NOT NULL,
                raw_score DOUBLE PRECISION NOT NULL DEFAULT 0,
                score DOUBLE PRECISION NOT NULL DEFAULT 0,
                deadline TIMESTAMPTZ NOT NULL,
                rescue_level VARCHAR(50),
                version BIGINT NOT NULL DEFAULT 1,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )",
            &[],
        )
        .await?;

    // Votes (append-only)
    client
        .execute(
            "CREATE TABLE IF NOT EXISTS votes (
                id UUID PRIMARY KEY,
                voice_id UUID NOT NULL REFERENCES voices(id),
                voter_id UUID NOT NULL,
                stance VARCHAR(50) NOT NULL,
                cast_at TIMESTAMPTZ NOT NULL,
                UNIQUE(voice_id, voter_id)
            )",
            &[],
        )
        .await?;

    // Decisions (append-only audit trail)
    client
        .execute(
            "CREATE TABLE IF NOT EXISTS decisions (
                id UUID PRIMARY KEY,
                voice_id UUID NOT NULL REFERENCES voices(id),
                decision VARCHAR(50) NOT NULL,
                decider_id UUID NOT NULL,
                decider_role VARCHAR(50) NOT NULL,
                reason TEXT NOT NULL,
                committee_id UUID,
                decided_at TIMESTAMPTZ NOT NULL
            )",
            &[],
        )
        .await?;

    // Expiration history (append-only)
    client
        .execute(
            "CREATE TABLE IF NOT EXISTS expiration_history (
                id UUID PRIMARY KEY,
                voice_id UUID NOT NULL REFERENCES voices(id),
                decider_id UUID NOT NULL,
                level VARCHAR(50) NOT NULL,
                current_score DOUBLE PRECISION NOT NULL,
                target_score DOUBLE PRECISION NOT NULL,
                achievement_rate DOUBLE PRECISION NOT NULL,
                days_overdue BIGINT NOT NULL,
                resolution VARCHAR(50) NOT NULL,
                reason TEXT NOT NULL,
                resolved_at TIMESTAMPTZ NOT NULL
            )",
            &[],
        )
        .await?;

    // Indexes for the hot lookups
    let _ = client
        .execute(
            "CREATE INDEX IF NOT EXISTS idx_voices_deadline ON voices(deadline) \
             WHERE status IN ('in_review', 'accepted')",
            &[],
        )
        .await;
    let _ = client
        .execute(
            "CREATE INDEX IF NOT EXISTS idx_votes_voice_id ON votes(voice_id)",
            &[],
        )
        .await;
    let _ = client
        .execute(
            "CREATE INDEX IF NOT EXISTS idx_decisions_voice_id ON decisions(voice_id)",
            &[],
        )
        .await;
    let _ = client
        .execute(
            "CREATE INDEX IF NOT EXISTS idx_org_members_department ON org_members(department)",
            &[],
        )
        .await;

    info!("✅ Database tables initialized");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
