//! Shared fixtures for integration tests.
//!
//! Provides the in-memory database, catalog and integration row builders, and
//! a service stack wired the way `main` wires it, with the in-memory audit
//! recorder swapped in so tests can assert on recorded events.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection, Set};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use integrations::audit::{AuditRecorder, MemoryAuditRecorder};
use integrations::callback::CallbackOrchestrator;
use integrations::config::AppConfig;
use integrations::crypto::{CryptoKey, TokenSet, TokenVault};
use integrations::health_probe::HealthProbeService;
use integrations::lifecycle::IntegrationStatus;
use integrations::models::{integration, provider};
use integrations::providers::{AdapterRegistry, build_http_client};
use integrations::repositories::{IntegrationRepository, ProviderRepository};
use integrations::server::{AppState, create_app};
use integrations::state_token::StateTokenCodec;
use integrations::token_refresh::RefreshCoordinator;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Configuration with test keys and one operator token; everything else stays
/// at the defaults.
#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    AppConfig {
        operator_tokens: vec!["test-token".to_string()],
        crypto_key: Some(vec![0u8; 32]),
        state_key: Some(vec![1u8; 32]),
        ..AppConfig::default()
    }
}

/// Inserts a provider catalog row whose token and probe endpoints live under
/// `base_url` (normally a wiremock server).
#[allow(dead_code)]
pub async fn insert_provider(
    db: &DatabaseConnection,
    slug: &str,
    base_url: &str,
) -> Result<provider::Model> {
    let now = Utc::now();
    let row = provider::ActiveModel {
        slug: Set(slug.to_string()),
        display_name: Set(format!("{} Provider", slug)),
        auth_url: Set("https://provider.test/oauth/authorize".to_string()),
        token_url: Set(format!("{}/oauth2/token", base_url)),
        scopes: Set(serde_json::json!(["read:files"])),
        client_id: Set("test_client_id".to_string()),
        client_secret: Set("test_client_secret".to_string()),
        grant_type: Set("authorization_code".to_string()),
        token_method: Set("post".to_string()),
        probe_url: Set(format!("{}/me", base_url)),
        extra_params: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    ProviderRepository::new(Arc::new(db.clone())).create(row).await
}

/// Inserts an integration row in the given lifecycle status. No credential is
/// attached; tests that need one seal it through [`store_credential`].
#[allow(dead_code)]
pub async fn insert_integration(
    db: &DatabaseConnection,
    tenant_id: Uuid,
    provider_slug: &str,
    status: IntegrationStatus,
) -> Result<integration::Model> {
    let now = Utc::now();
    let row = integration::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant_id),
        provider_slug: Set(provider_slug.to_string()),
        status: Set(status.as_str().to_string()),
        version: Set(1),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    };
    IntegrationRepository::new(Arc::new(db.clone())).create(row).await
}

/// Seals `tokens` onto the row through the versioned write the services use.
/// The lifecycle status is left as inserted. Returns the updated row.
#[allow(dead_code)]
pub async fn store_credential(
    db: &DatabaseConnection,
    row: &integration::Model,
    vault: &TokenVault,
    tokens: &TokenSet,
) -> Result<integration::Model> {
    let ciphertext = vault.seal(&row.tenant_id, &row.id, tokens)?;
    let update = integration::ActiveModel {
        credential_ciphertext: Set(Some(ciphertext)),
        token_expires_at: Set(tokens.expires_at.map(Into::into)),
        connected_at: Set(Some(Utc::now().into())),
        ..Default::default()
    };

    let repo = IntegrationRepository::new(Arc::new(db.clone()));
    repo.update_versioned(&row.id, row.version, update)
        .await?
        .ok_or_else(|| anyhow!("integration row changed underneath the fixture"))
}

/// A stored token set with the given expiry.
#[allow(dead_code)]
pub fn sample_tokens(expires_at: Option<DateTime<Utc>>) -> TokenSet {
    TokenSet {
        access_token: "stored_access_token".to_string(),
        refresh_token: Some("stored_refresh_token".to_string()),
        expires_at,
        scopes: vec!["read:files".to_string()],
    }
}

/// The service stack under test.
#[allow(dead_code)]
pub struct TestServices {
    pub config: Arc<AppConfig>,
    pub repo: IntegrationRepository,
    pub vault: Arc<TokenVault>,
    pub codec: Arc<StateTokenCodec>,
    pub registry: Arc<AdapterRegistry>,
    pub audit: Arc<MemoryAuditRecorder>,
    pub refresh: Arc<RefreshCoordinator>,
    pub health: Arc<HealthProbeService>,
    pub callback: Arc<CallbackOrchestrator>,
}

/// Builds the full service stack from whatever providers are already in the
/// catalog. Insert provider rows first; the adapter registry is frozen here.
#[allow(dead_code)]
pub async fn build_services(db: &DatabaseConnection, config: AppConfig) -> Result<TestServices> {
    let config = Arc::new(config);
    let repo = IntegrationRepository::new(Arc::new(db.clone()));
    let provider_repo = ProviderRepository::new(Arc::new(db.clone()));

    let crypto_key = config
        .crypto_key
        .clone()
        .context("test config must carry a crypto key")?;
    let state_key = config
        .state_key
        .clone()
        .context("test config must carry a state key")?;
    let vault = Arc::new(TokenVault::new(CryptoKey::new(crypto_key)?));
    let codec = Arc::new(StateTokenCodec::new(CryptoKey::new(state_key)?));

    let catalog = provider_repo.find_all().await?;
    let http = build_http_client(Duration::from_secs(2))?;
    let registry = Arc::new(AdapterRegistry::from_catalog(catalog, http));

    let audit = Arc::new(MemoryAuditRecorder::new());
    let audit_sink: Arc<dyn AuditRecorder> = audit.clone();

    let refresh = Arc::new(RefreshCoordinator::new(
        config.clone(),
        repo.clone(),
        vault.clone(),
        registry.clone(),
        audit_sink.clone(),
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
        codec.clone(),
        repo.clone(),
        vault.clone(),
        registry.clone(),
        audit_sink,
    ));

    Ok(TestServices {
        config,
        repo,
        vault,
        codec,
        registry,
        audit,
        refresh,
        health,
        callback,
    })
}

/// Handle to a spawned test server.
#[allow(dead_code)]
pub struct TestServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

#[allow(dead_code)]
impl TestServerHandle {
    fn new(shutdown_tx: oneshot::Sender<()>, join_handle: JoinHandle<Result<()>>) -> Self {
        Self {
            shutdown_tx: Some(shutdown_tx),
            join_handle: Some(join_handle),
        }
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.join_handle.take() {
            handle.await.context("server task join failed")??;
        }

        Ok(())
    }
}

/// Spawns the real HTTP server on a random port over the given database.
///
/// Returns the base URL, the application state (for reaching the codec and
/// vault directly), the typed audit recorder, and the shutdown handle.
#[allow(dead_code)]
pub async fn spawn_test_app(
    db: DatabaseConnection,
    config: AppConfig,
) -> Result<(String, AppState, Arc<MemoryAuditRecorder>, TestServerHandle)> {
    let services = build_services(&db, config).await?;
    let audit = services.audit.clone();

    let state = AppState {
        config: services.config.clone(),
        db,
        vault: services.vault.clone(),
        state_codec: services.codec.clone(),
        registry: services.registry.clone(),
        audit: services.audit.clone(),
        refresh: services.refresh.clone(),
        health: services.health.clone(),
        callback: services.callback.clone(),
    };

    let app = create_app(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server_url = format!("http://{}", addr);

    let (ready_tx, ready_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server_task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let _ = ready_tx.send(());

        server.await.context("axum server error")
    });

    ready_rx.await.context("server task dropped before ready")?;

    Ok((
        server_url,
        state,
        audit,
        TestServerHandle::new(shutdown_tx, server_task),
    ))
}
