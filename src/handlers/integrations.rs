//! # Integrations API Handlers
//!
//! This module contains handlers for inspecting and operating a tenant's
//! integrations: listing, fetching one, forcing a credential refresh, and
//! running an on-demand health probe. Responses never carry credential
//! material, only whether a sealed credential exists.

use crate::auth::{OperatorAuth, TenantExtension, TenantHeader};
use crate::error::ApiError;
use crate::health_probe::HealthReport;
use crate::repositories::IntegrationRepository;
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Request path parameter for an integration id
#[derive(Debug, Deserialize, ToSchema)]
pub struct IntegrationPath {
    /// Integration identifier (UUID)
    pub id: Uuid,
}

/// Integration information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IntegrationInfo {
    /// Unique identifier for the integration
    #[schema(value_type = String)]
    pub id: Uuid,
    /// Provider slug (e.g., "google-drive", "dropbox")
    pub provider: String,
    /// Lifecycle status (pending|active|expired|revoked|error)
    pub status: String,
    /// Indicates whether a sealed credential is stored
    #[schema(default = false, example = true)]
    pub has_credential: bool,
    /// When the stored access token expires, if known
    pub token_expires_at: Option<String>,
    /// Scopes the provider granted at the last successful exchange
    pub scopes_granted: Option<serde_json::Value>,
    /// Latest health assessment (healthy|expired|unauthorized|error)
    pub health_status: Option<String>,
    /// When the health fields were last written
    pub health_checked_at: Option<String>,
    /// When the credential was last sealed by a successful exchange
    pub connected_at: Option<String>,
    /// Optimistic concurrency version of the row
    pub version: i64,
}

impl From<crate::models::integration::Model> for IntegrationInfo {
    fn from(model: crate::models::integration::Model) -> Self {
        Self {
            id: model.id,
            provider: model.provider_slug,
            status: model.status,
            // Only presence crosses the API; the ciphertext never does
            has_credential: model.credential_ciphertext.is_some(),
            token_expires_at: model.token_expires_at.map(rfc3339),
            scopes_granted: model.scopes_granted,
            health_status: model.health_status,
            health_checked_at: model.health_checked_at.map(rfc3339),
            connected_at: model.connected_at.map(rfc3339),
            version: model.version,
        }
    }
}

fn rfc3339(dt: sea_orm::prelude::DateTimeWithTimeZone) -> String {
    let utc: DateTime<Utc> = dt.with_timezone(&Utc);
    utc.to_rfc3339()
}

/// Response wrapper for integrations listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IntegrationsResponse {
    /// List of integrations for the tenant
    pub integrations: Vec<IntegrationInfo>,
}

/// Lists integrations for the authenticated tenant
#[utoipa::path(
    get,
    path = "/integrations",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    responses(
        (status = 200, description = "List of tenant integrations", body = IntegrationsResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn list_integrations(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
) -> Result<Json<IntegrationsResponse>, ApiError> {
    let repo = IntegrationRepository::new(Arc::new(state.db.clone()));
    let rows = repo.find_by_tenant(&tenant.0).await?;

    Ok(Json(IntegrationsResponse {
        integrations: rows.into_iter().map(IntegrationInfo::from).collect(),
    }))
}

/// Fetches a single integration by id
#[utoipa::path(
    get,
    path = "/integrations/{id}",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Integration identifier (UUID)"),
        TenantHeader
    ),
    responses(
        (status = 200, description = "Integration details", body = IntegrationInfo),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Integration not found", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn get_integration(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(path): Path<IntegrationPath>,
) -> Result<Json<IntegrationInfo>, ApiError> {
    let repo = IntegrationRepository::new(Arc::new(state.db.clone()));
    let row = find_owned(&repo, &tenant.0, &path.id).await?;
    Ok(Json(IntegrationInfo::from(row)))
}

/// Forces a credential refresh for an integration
///
/// Runs the refresh immediately regardless of how far out the token expiry
/// is. Serialized against the background sweep through the same
/// per-integration lock, so a concurrent sweep refresh cannot double-spend
/// the refresh token.
#[utoipa::path(
    post,
    path = "/integrations/{id}/refresh",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Integration identifier (UUID)"),
        TenantHeader
    ),
    responses(
        (status = 200, description = "Integration after the refresh", body = IntegrationInfo),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Integration not found", body = ApiError),
        (status = 409, description = "Integration holds no refreshable credential", body = ApiError),
        (status = 502, description = "Provider permanently rejected the refresh", body = ApiError),
        (status = 503, description = "Provider temporarily unavailable", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn refresh_integration(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(path): Path<IntegrationPath>,
) -> Result<Json<IntegrationInfo>, ApiError> {
    let repo = IntegrationRepository::new(Arc::new(state.db.clone()));
    find_owned(&repo, &tenant.0, &path.id).await?;

    let updated = state.refresh.refresh(path.id, true).await?;

    tracing::info!(
        tenant_id = %tenant.0,
        integration_id = %path.id,
        "On-demand refresh completed"
    );

    Ok(Json(IntegrationInfo::from(updated)))
}

/// Probes an integration's credential against the provider
#[utoipa::path(
    post,
    path = "/integrations/{id}/probe",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Integration identifier (UUID)"),
        TenantHeader
    ),
    responses(
        (status = 200, description = "Probe result", body = HealthReport),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Integration not found", body = ApiError),
        (status = 503, description = "Provider unreachable", body = ApiError)
    ),
    tag = "integrations"
)]
pub async fn probe_integration(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    TenantExtension(tenant): TenantExtension,
    Path(path): Path<IntegrationPath>,
) -> Result<Json<HealthReport>, ApiError> {
    let repo = IntegrationRepository::new(Arc::new(state.db.clone()));
    find_owned(&repo, &tenant.0, &path.id).await?;

    let report = state.health.check(path.id).await?;
    Ok(Json(report))
}

/// Resolve an integration within the tenant scope or fail with 404.
///
/// Cross-tenant ids fall into the same arm as unknown ids, so a caller
/// cannot distinguish another tenant's integration from a nonexistent one.
async fn find_owned(
    repo: &IntegrationRepository,
    tenant_id: &Uuid,
    id: &Uuid,
) -> Result<crate::models::integration::Model, ApiError> {
    repo.find_by_id(tenant_id, id).await?.ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("integration '{}' not found", id),
        )
    })
}
