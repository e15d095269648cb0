//! # Providers API Handlers
//!
//! This module contains the handler for listing the provider catalog.
//! Client credentials never leave the database; the listing only carries
//! what a caller needs to decide which provider to connect.

use crate::auth::{OperatorAuth, TenantHeader};
use crate::error::ApiError;
use crate::repositories::ProviderRepository;
use crate::server::AppState;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Provider information for catalog listing
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ProviderInfo {
    /// Provider slug used in connect and integration responses
    pub slug: String,
    /// Human-readable provider name
    pub display_name: String,
    /// OAuth scopes requested at authorization
    pub scopes: Vec<String>,
}

impl From<crate::models::provider::Model> for ProviderInfo {
    fn from(model: crate::models::provider::Model) -> Self {
        let scopes = model.scope_list();
        Self {
            slug: model.slug,
            display_name: model.display_name,
            scopes,
        }
    }
}

/// Response containing the list of available providers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProvidersResponse {
    /// List of available providers
    pub providers: Vec<ProviderInfo>,
}

/// Lists the provider catalog
#[utoipa::path(
    get,
    path = "/providers",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    responses(
        (status = 200, description = "List of available providers", body = ProvidersResponse, example = json!({
            "providers": [
                {
                    "slug": "dropbox",
                    "display_name": "Dropbox",
                    "scopes": ["account_info.read", "files.metadata.read"]
                },
                {
                    "slug": "google-drive",
                    "display_name": "Google Drive",
                    "scopes": ["https://www.googleapis.com/auth/drive.readonly"]
                }
            ]
        })),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn list_providers(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<ProvidersResponse>, ApiError> {
    let repo = ProviderRepository::new(Arc::new(state.db.clone()));
    let mut rows = repo.find_all().await?;

    // Stable ascending order by slug
    rows.sort_by(|a, b| a.slug.cmp(&b.slug));

    Ok(Json(ProvidersResponse {
        providers: rows.into_iter().map(ProviderInfo::from).collect(),
    }))
}
