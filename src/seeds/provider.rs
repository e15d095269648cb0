//! Provider catalog seeding
//!
//! Inserts the supported cloud providers with their OAuth endpoints, scopes
//! and client credentials. Existing rows are left untouched, so endpoint
//! changes ship as migrations rather than seed edits.

use anyhow::Result;
use chrono::Utc;
use sea_orm::{DatabaseConnection, Set};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::models::provider;
use crate::providers::GOOGLE_DRIVE_SLUG;
use crate::repositories::ProviderRepository;

/// Seeds the providers table with the supported cloud providers.
///
/// Client credentials come from configuration; outside the local and test
/// profiles they are required, so the placeholder fallbacks only ever land
/// in development databases.
pub async fn seed_providers(db: &DatabaseConnection, config: &AppConfig) -> Result<()> {
    let repo = ProviderRepository::new(Arc::new(db.clone()));

    for entry in catalog(config) {
        // Check if provider already exists
        match repo.find_by_slug(entry.slug).await {
            Ok(Some(_)) => {
                log::info!("Provider '{}' already exists, skipping", entry.slug);
                continue;
            }
            Ok(None) => {
                log::info!("Creating provider: {}", entry.slug);

                let now = Utc::now();
                let row = provider::ActiveModel {
                    slug: Set(entry.slug.to_string()),
                    display_name: Set(entry.display_name.to_string()),
                    auth_url: Set(entry.auth_url.to_string()),
                    token_url: Set(entry.token_url.to_string()),
                    scopes: Set(entry.scopes),
                    client_id: Set(entry.client_id),
                    client_secret: Set(entry.client_secret),
                    grant_type: Set("authorization_code".to_string()),
                    token_method: Set("post".to_string()),
                    probe_url: Set(entry.probe_url.to_string()),
                    extra_params: Set(entry.extra_params),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                };

                match repo.create(row).await {
                    Ok(_) => {
                        log::info!("Successfully created provider: {}", entry.slug);
                    }
                    Err(e) => {
                        log::error!("Failed to create provider '{}': {}", entry.slug, e);
                        return Err(e);
                    }
                }
            }
            Err(e) => {
                log::error!("Error checking if provider '{}' exists: {}", entry.slug, e);
                return Err(e);
            }
        }
    }

    log::info!("Provider seeding completed successfully");
    Ok(())
}

/// One row of the seeded catalog
struct CatalogEntry {
    slug: &'static str,
    display_name: &'static str,
    auth_url: &'static str,
    token_url: &'static str,
    probe_url: &'static str,
    scopes: JsonValue,
    client_id: String,
    client_secret: String,
    extra_params: Option<JsonValue>,
}

fn catalog(config: &AppConfig) -> Vec<CatalogEntry> {
    vec![
        // Google Drive's offline-access parameters are adapter behavior, not
        // catalog data; see the dedicated adapter.
        CatalogEntry {
            slug: GOOGLE_DRIVE_SLUG,
            display_name: "Google Drive",
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
            token_url: "https://oauth2.googleapis.com/token",
            probe_url: "https://www.googleapis.com/drive/v3/about?fields=user",
            scopes: json!(["https://www.googleapis.com/auth/drive.readonly"]),
            client_id: config
                .google_drive_client_id
                .clone()
                .unwrap_or_else(|| "local-google-drive-client-id".to_string()),
            client_secret: config
                .google_drive_client_secret
                .clone()
                .unwrap_or_else(|| "local-google-drive-client-secret".to_string()),
            extra_params: None,
        },
        CatalogEntry {
            slug: "dropbox",
            display_name: "Dropbox",
            auth_url: "https://www.dropbox.com/oauth2/authorize",
            token_url: "https://api.dropboxapi.com/oauth2/token",
            probe_url: "https://api.dropboxapi.com/2/users/get_current_account",
            scopes: json!(["account_info.read", "files.metadata.read"]),
            client_id: config
                .dropbox_client_id
                .clone()
                .unwrap_or_else(|| "local-dropbox-client-id".to_string()),
            client_secret: config
                .dropbox_client_secret
                .clone()
                .unwrap_or_else(|| "local-dropbox-client-secret".to_string()),
            // Dropbox only issues refresh tokens when asked at authorize time
            extra_params: Some(json!({ "token_access_type": "offline" })),
        },
    ]
}
