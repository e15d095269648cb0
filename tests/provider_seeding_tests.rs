//! Integration tests for provider catalog seeding

use anyhow::Result;
use std::sync::Arc;

use integrations::config::AppConfig;
use integrations::repositories::ProviderRepository;
use integrations::seeds::seed_providers;

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::setup_test_db;

#[tokio::test]
async fn test_seed_populates_expected_catalog() -> Result<()> {
    let db = setup_test_db().await?;
    seed_providers(&db, &AppConfig::default()).await?;

    let repo = ProviderRepository::new(Arc::new(db));
    let catalog = repo.find_all().await?;
    assert_eq!(catalog.len(), 2);

    let dropbox = repo.find_by_slug("dropbox").await?.expect("dropbox seeded");
    assert_eq!(dropbox.display_name, "Dropbox");
    assert_eq!(dropbox.grant_type, "authorization_code");
    assert_eq!(
        dropbox.extra_params,
        Some(serde_json::json!({ "token_access_type": "offline" }))
    );

    let google = repo
        .find_by_slug("google-drive")
        .await?
        .expect("google-drive seeded");
    assert!(google.auth_url.starts_with("https://accounts.google.com"));
    assert!(
        google
            .scope_list()
            .iter()
            .any(|scope| scope.contains("drive.readonly"))
    );

    Ok(())
}

#[tokio::test]
async fn test_seeding_is_idempotent() -> Result<()> {
    let db = setup_test_db().await?;
    seed_providers(&db, &AppConfig::default()).await?;
    seed_providers(&db, &AppConfig::default()).await?;

    let repo = ProviderRepository::new(Arc::new(db));
    let catalog = repo.find_all().await?;
    assert_eq!(catalog.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_configured_credentials_reach_catalog() -> Result<()> {
    let db = setup_test_db().await?;
    let config = AppConfig {
        dropbox_client_id: Some("configured-dropbox-id".to_string()),
        dropbox_client_secret: Some("configured-dropbox-secret".to_string()),
        ..AppConfig::default()
    };
    seed_providers(&db, &config).await?;

    let repo = ProviderRepository::new(Arc::new(db.clone()));
    let dropbox = repo.find_by_slug("dropbox").await?.expect("dropbox seeded");
    assert_eq!(dropbox.client_id, "configured-dropbox-id");
    assert_eq!(dropbox.client_secret, "configured-dropbox-secret");

    // Existing rows are left alone on reseed, even with new credentials
    let reconfigured = AppConfig {
        dropbox_client_id: Some("different-id".to_string()),
        ..AppConfig::default()
    };
    seed_providers(&db, &reconfigured).await?;

    let dropbox = repo.find_by_slug("dropbox").await?.expect("dropbox seeded");
    assert_eq!(dropbox.client_id, "configured-dropbox-id");

    Ok(())
}
