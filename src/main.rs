//! # Integrations API Main Entry Point
//!
//! This is the main entry point for the Integrations API service. It wires
//! configuration, telemetry, the database, the provider adapter registry,
//! and the lifecycle services together, then serves HTTP until shutdown.

use std::sync::Arc;
use std::time::Duration;

use integrations::audit::{AuditRecorder, TracingAuditRecorder};
use integrations::callback::CallbackOrchestrator;
use integrations::config::ConfigLoader;
use integrations::crypto::{CryptoKey, TokenVault};
use integrations::db::init_pool;
use integrations::health_probe::HealthProbeService;
use integrations::migration::{Migrator, MigratorTrait};
use integrations::providers::{AdapterRegistry, build_http_client};
use integrations::repositories::{IntegrationRepository, ProviderRepository};
use integrations::seeds::seed_providers;
use integrations::server::{AppState, run_server};
use integrations::state_token::StateTokenCodec;
use integrations::telemetry;
use integrations::token_refresh::RefreshCoordinator;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = Arc::new(config_loader.load()?);

    telemetry::init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::info!(configuration = %redacted_json, "Effective configuration");
    }

    let db = init_pool(&config).await?;
    Migrator::up(&db, None).await?;
    seed_providers(&db, &config).await?;

    // Adapter registry from the seeded catalog
    let catalog = ProviderRepository::new(Arc::new(db.clone()))
        .find_all()
        .await?;
    let http = build_http_client(Duration::from_secs(config.provider_http_timeout_seconds))?;
    let registry = Arc::new(AdapterRegistry::from_catalog(catalog, http));

    // Both keys were validated during config loading
    let vault_key = CryptoKey::new(config.crypto_key.clone().ok_or("crypto key not configured")?)?;
    let state_key = CryptoKey::new(config.state_key.clone().ok_or("state key not configured")?)?;
    let vault = Arc::new(TokenVault::new(vault_key));
    let state_codec = Arc::new(StateTokenCodec::new(state_key));

    let audit: Arc<dyn AuditRecorder> = Arc::new(TracingAuditRecorder);

    let repo = IntegrationRepository::new(Arc::new(db.clone()));
    let refresh = Arc::new(RefreshCoordinator::new(
        config.clone(),
        repo.clone(),
        vault.clone(),
        registry.clone(),
        audit.clone(),
    ));
    let health = Arc::new(HealthProbeService::new(
        config.clone(),
        repo.clone(),
        vault.clone(),
        registry.clone(),
        refresh.clone(),
    ));
    let callback = Arc::new(CallbackOrchestrator::new(
        config.clone(),
        state_codec.clone(),
        repo,
        vault.clone(),
        registry.clone(),
        audit.clone(),
    ));

    let shutdown = CancellationToken::new();
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?err, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
        ctrl_c_token.cancel();
    });

    // Background sweeps run for the lifetime of the server
    let refresh_sweep = {
        let refresh = refresh.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { refresh.run(token).await })
    };
    let health_sweep = {
        let health = health.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { health.run(token).await })
    };

    let state = AppState {
        config,
        db,
        vault,
        state_codec,
        registry,
        audit,
        refresh,
        health,
        callback,
    };

    let result = run_server(state, shutdown.clone()).await;

    // Stop the sweeps even when the server exited on its own
    shutdown.cancel();
    let _ = tokio::join!(refresh_sweep, health_sweep);

    result
}
