//! # Connect Handlers
//!
//! This module contains the handler that starts an OAuth authorization flow
//! for a provider: it resolves the provider, finds or creates the tenant's
//! integration row, issues a signed state token, and returns the
//! authorization URL for user redirection.

use crate::audit::AuditEvent;
use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::error::{ApiError, LifecycleError, validation_error};
use crate::lifecycle::IntegrationStatus;
use crate::models::integration;
use crate::repositories::{IntegrationRepository, ProviderRepository};
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::Utc;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Request path parameter for provider slug
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProviderPath {
    /// Provider identifier (kebab-case slug, e.g., "google-drive")
    pub provider: String,
}

/// OpenAPI header parameter for X-User-Id
#[derive(Debug, Serialize, Deserialize, IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Header)]
pub struct UserHeader {
    /// Acting user (UUID) on whose behalf the authorization is requested
    #[serde(rename = "X-User-Id")]
    #[param(rename = "X-User-Id", value_type = String)]
    pub user_id: String,
}

/// OAuth authorization URL response for API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectResponse {
    /// Complete authorization URL for user redirection
    /// Must be HTTPS, valid per RFC 3986, max 2048 chars, no fragment
    pub authorize_url: String,
    /// Integration the callback will link tokens to
    #[schema(value_type = String)]
    pub integration_id: Uuid,
}

/// Start OAuth flow for a provider
///
/// Initiates an OAuth authorization flow for the specified provider and
/// tenant. Creates the integration row in `pending` status if the tenant has
/// never connected this provider, reuses the existing row otherwise, and
/// returns a fully formed authorization URL carrying a signed state token.
#[utoipa::path(
    post,
    path = "/connect/{provider}",
    security(("bearer_auth" = [])),
    params(
        ("provider" = String, Path, description = "Provider identifier (kebab-case slug, e.g., 'google-drive')"),
        TenantHeader,
        UserHeader
    ),
    responses(
        (status = 200, description = "Authorization URL generated successfully", body = ConnectResponse),
        (status = 400, description = "Missing tenant or user header", body = ApiError),
        (status = 401, description = "Missing or invalid authorization token", body = ApiError),
        (status = 404, description = "Provider not found", body = ApiError),
        (status = 409, description = "Integration was revoked and cannot be reconnected", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn start_oauth(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(provider_path): Path<ProviderPath>,
    headers: HeaderMap,
) -> Result<Json<ConnectResponse>, ApiError> {
    let provider = provider_path.provider;
    let user_id = extract_user_id(&headers)?;

    let provider_repo = ProviderRepository::new(Arc::new(state.db.clone()));
    if provider_repo.find_by_slug(&provider).await?.is_none() {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("provider '{}' not found", provider),
        ));
    }

    // The adapter must exist before any row is created; a catalog row without
    // a registered adapter is a deployment defect surfaced here.
    let adapter = state.registry.get(&provider)?;

    let integration_repo = IntegrationRepository::new(Arc::new(state.db.clone()));
    let row = ensure_integration(&integration_repo, tenant.0, &provider, user_id).await?;

    if row.lifecycle_status() == IntegrationStatus::Revoked {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            &format!(
                "integration for provider '{}' was revoked and cannot be reconnected",
                provider
            ),
        ));
    }

    let state_token = state
        .state_codec
        .issue(tenant.0, row.id, user_id, None)
        .map_err(LifecycleError::from)?;

    let redirect_uri = state.config.callback_url();
    let authorize_url = adapter
        .build_authorization_url(&state_token, &redirect_uri)
        .map_err(|err| {
            tracing::error!(
                provider = %provider,
                error = ?err,
                "Failed to build authorization URL"
            );
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Failed to generate authorization URL",
            )
        })?;

    // Validate the URL meets OAuth 2.0 requirements
    validate_authorize_url(&authorize_url)?;

    let mut event = AuditEvent::new("authorize.issued", true);
    event.tenant_id = Some(tenant.0);
    event.integration_id = Some(row.id);
    event.user_id = Some(user_id);
    event.provider = Some(provider.clone());
    state.audit.record(event);

    tracing::info!(
        tenant_id = %tenant.0,
        provider = %provider,
        integration_id = %row.id,
        "OAuth flow initiated successfully"
    );

    Ok(Json(ConnectResponse {
        authorize_url: authorize_url.to_string(),
        integration_id: row.id,
    }))
}

/// Parse the required X-User-Id header
fn extract_user_id(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let raw = headers
        .get("X-User-Id")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            validation_error(
                "X-User-Id header is required",
                serde_json::json!({"X-User-Id": "required header"}),
            )
        })?;

    Uuid::parse_str(raw).map_err(|_| {
        validation_error(
            "X-User-Id header must be a valid UUID",
            serde_json::json!({"X-User-Id": "must be a valid UUID"}),
        )
    })
}

/// Find the tenant's integration for this provider, creating a fresh
/// `pending` row when none exists.
///
/// Creation races against the unique (tenant, provider) constraint: a
/// concurrent initiation that wins the insert is detected via the duplicate
/// key error and its row is reused.
async fn ensure_integration(
    repo: &IntegrationRepository,
    tenant_id: Uuid,
    provider_slug: &str,
    user_id: Uuid,
) -> Result<integration::Model, ApiError> {
    if let Some(existing) = repo
        .find_by_tenant_and_provider(&tenant_id, provider_slug)
        .await?
    {
        return Ok(existing);
    }

    let now = Utc::now();
    let pending = integration::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant_id),
        provider_slug: Set(provider_slug.to_string()),
        status: Set(IntegrationStatus::Pending.as_str().to_string()),
        version: Set(1),
        created_by: Set(Some(user_id)),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    };

    match repo.create(pending).await {
        Ok(created) => Ok(created),
        Err(err) => {
            let lost_insert_race = err
                .downcast_ref::<sea_orm::DbErr>()
                .map(crate::error::is_unique_violation)
                .unwrap_or(false);
            if lost_insert_race {
                repo.find_by_tenant_and_provider(&tenant_id, provider_slug)
                    .await?
                    .ok_or_else(|| {
                        ApiError::new(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "INTERNAL_SERVER_ERROR",
                            "Failed to create integration",
                        )
                    })
            } else {
                Err(err.into())
            }
        }
    }
}

/// Validate authorization URL meets OAuth 2.0 and security requirements
fn validate_authorize_url(url: &Url) -> Result<(), ApiError> {
    // Must be HTTPS
    if url.scheme() != "https" {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Generated authorization URL must use HTTPS",
        ));
    }

    // Must not include fragment component per OAuth 2.0 RFC 6749 section 3.1
    if url.fragment().is_some() {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Generated authorization URL must not include fragment component",
        ));
    }

    // Maximum length 2048 characters
    if url.as_str().len() > 2048 {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Generated authorization URL exceeds maximum length of 2048 characters",
        ));
    }

    Ok(())
}
