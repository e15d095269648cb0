//! # Callback Orchestrator
//!
//! Runs the provider redirect through state verification, ownership and
//! replay checks, code exchange, and the versioned credential write as one
//! operation. Every attempt emits exactly one audit event, success or not.
//! Callers only ever see a typed error whose class maps to a generic
//! message; provider details stay in logs and the audit trail.

use chrono::Utc;
use metrics::counter;
use sea_orm::Set;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditRecorder};
use crate::config::AppConfig;
use crate::crypto::TokenVault;
use crate::error::LifecycleError;
use crate::lifecycle::{HealthStatus, IntegrationStatus};
use crate::models::integration;
use crate::providers::AdapterRegistry;
use crate::repositories::IntegrationRepository;
use crate::state_token::{StateTokenCodec, StateTokenError};

/// Query parameters delivered by the provider redirect
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct CallbackRequest {
    /// Authorization code issued by the provider on success
    pub code: Option<String>,
    /// Signed state originally embedded in the authorize URL
    pub state: Option<String>,
    /// Provider error code when the user denied or the grant failed
    pub error: Option<String>,
    /// Human-readable companion to `error`, ignored by the flow
    pub error_description: Option<String>,
}

/// Successful link result
#[derive(Debug, Clone, Copy)]
pub struct CallbackLink {
    pub tenant_id: Uuid,
    pub integration_id: Uuid,
}

/// Identity context discovered while processing a callback, carried into
/// the audit event even when the flow fails partway
#[derive(Debug, Default)]
struct CallbackContext {
    tenant_id: Option<Uuid>,
    integration_id: Option<Uuid>,
    user_id: Option<Uuid>,
    provider: Option<String>,
    state_age_ms: Option<i64>,
}

/// Drives the OAuth callback flow end to end
#[derive(Clone)]
pub struct CallbackOrchestrator {
    config: Arc<AppConfig>,
    codec: Arc<StateTokenCodec>,
    repo: IntegrationRepository,
    vault: Arc<TokenVault>,
    registry: Arc<AdapterRegistry>,
    audit: Arc<dyn AuditRecorder>,
}

impl CallbackOrchestrator {
    pub fn new(
        config: Arc<AppConfig>,
        codec: Arc<StateTokenCodec>,
        repo: IntegrationRepository,
        vault: Arc<TokenVault>,
        registry: Arc<AdapterRegistry>,
        audit: Arc<dyn AuditRecorder>,
    ) -> Self {
        Self {
            config,
            codec,
            repo,
            vault,
            registry,
            audit,
        }
    }

    /// Process a provider redirect. Exactly one audit event is recorded per
    /// call, carrying whatever identity context the flow got far enough to
    /// establish.
    #[instrument(skip_all)]
    pub async fn handle(&self, request: CallbackRequest) -> Result<CallbackLink, LifecycleError> {
        let mut ctx = CallbackContext::default();
        let result = self.process(&request, &mut ctx).await;

        let mut event = AuditEvent::new("callback.attempt", result.is_ok());
        event.tenant_id = ctx.tenant_id;
        event.integration_id = ctx.integration_id;
        event.user_id = ctx.user_id;
        event.provider = ctx.provider;
        event.state_age_ms = ctx.state_age_ms;
        if let Err(err) = &result {
            event.error_code = Some(err.code().to_string());
            if let Some(age_ms) = err.state_age_ms() {
                event.state_age_ms = Some(age_ms);
            }
        }
        self.audit.record(event);

        let outcome = if result.is_ok() { "success" } else { "failure" };
        let metric_labels = vec![("outcome", outcome.to_string())];
        counter!("integration_callbacks_total", &metric_labels).increment(1);

        match &result {
            Ok(link) => info!(
                integration_id = %link.integration_id,
                tenant_id = %link.tenant_id,
                "Integration linked"
            ),
            Err(err) => warn!(error_code = err.code(), "Callback rejected"),
        }

        result
    }

    async fn process(
        &self,
        request: &CallbackRequest,
        ctx: &mut CallbackContext,
    ) -> Result<CallbackLink, LifecycleError> {
        // A provider-reported denial wins before anything else; the state is
        // not consumed and nothing is decoded from it.
        if let Some(error_code) = request.error.clone() {
            return Err(LifecycleError::ProviderDenied { error_code });
        }

        let state = request.state.as_deref().ok_or(LifecycleError::StateInvalid)?;
        let now = Utc::now();
        let token = match self.codec.verify(state, now) {
            Ok(token) => token,
            Err(err) => {
                if let StateTokenError::Expired { age_ms } = &err {
                    ctx.state_age_ms = Some(*age_ms);
                }
                return Err(err.into());
            }
        };
        ctx.tenant_id = Some(token.tenant_id);
        ctx.integration_id = Some(token.integration_id);
        ctx.user_id = Some(token.user_id);
        ctx.state_age_ms = Some(token.age_ms(now));

        let row = self
            .repo
            .get_by_id(&token.integration_id)
            .await?
            .ok_or(LifecycleError::IntegrationNotFound)?;
        ctx.provider = Some(row.provider_slug.clone());

        if row.tenant_id != token.tenant_id {
            return Err(LifecycleError::OwnershipMismatch);
        }

        // A credential sealed at or after this state was issued means this
        // state already completed once; reject without any provider call.
        let status = row.lifecycle_status();
        if status == IntegrationStatus::Active
            && row.credential_ciphertext.is_some()
            && row
                .connected_at
                .map(|at| at.with_timezone(&Utc) >= token.issued_at)
                .unwrap_or(false)
        {
            return Err(LifecycleError::StateReplayed);
        }
        if !status.accepts_callback() {
            return Err(LifecycleError::StateInvalid);
        }

        let code = request
            .code
            .as_deref()
            .ok_or_else(|| LifecycleError::CodeExchangeFailed {
                details: "missing authorization code".to_string(),
            })?;

        let adapter = self.registry.get(&row.provider_slug)?;
        let redirect_uri = token
            .redirect_uri
            .clone()
            .unwrap_or_else(|| self.config.callback_url());

        let tokens = match adapter.exchange_code(code, &redirect_uri).await {
            Ok(tokens) => tokens,
            Err(err) => {
                let details = err.to_string();
                self.record_exchange_failure(&row, &details).await;
                return Err(LifecycleError::CodeExchangeFailed { details });
            }
        };

        let ciphertext = self.vault.seal(&row.tenant_id, &row.id, &tokens)?;
        let connected_at = Utc::now();
        let update = integration::ActiveModel {
            status: Set(IntegrationStatus::Active.as_str().to_string()),
            credential_ciphertext: Set(Some(ciphertext)),
            token_expires_at: Set(tokens.expires_at.map(Into::into)),
            scopes_granted: Set(Some(serde_json::json!(tokens.scopes))),
            connected_at: Set(Some(connected_at.into())),
            health_status: Set(Some(HealthStatus::Healthy.as_str().to_string())),
            health_checked_at: Set(Some(connected_at.into())),
            health_error: Set(None),
            ..Default::default()
        };

        let updated = self
            .repo
            .update_versioned_retry(&row.id, row.version, update)
            .await?
            .ok_or(LifecycleError::VersionConflict)?;

        Ok(CallbackLink {
            tenant_id: updated.tenant_id,
            integration_id: updated.id,
        })
    }

    /// Mark the row errored after a failed exchange. Best-effort: a
    /// concurrent write winning the version race keeps its state.
    async fn record_exchange_failure(&self, row: &integration::Model, details: &str) {
        let update = integration::ActiveModel {
            status: Set(IntegrationStatus::Error.as_str().to_string()),
            health_status: Set(Some(HealthStatus::Error.as_str().to_string())),
            health_checked_at: Set(Some(Utc::now().into())),
            health_error: Set(Some(details.to_string())),
            ..Default::default()
        };

        match self.repo.update_versioned(&row.id, row.version, update).await {
            Ok(Some(_)) => {}
            Ok(None) => debug!(
                integration_id = %row.id,
                "Skipped error annotation after concurrent update"
            ),
            Err(err) => error!(
                integration_id = %row.id,
                error = ?err,
                "Failed to record exchange failure"
            ),
        }
    }
}
