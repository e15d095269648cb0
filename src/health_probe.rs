//! # Health Probe Service
//!
//! Periodically probes stored credentials against their provider and records
//! the outcome on the integration row. Also serves on-demand probes from the
//! API. Probe results are advisory: the write is a single compare-and-set
//! attempt and a lost version race simply drops the result, since a
//! concurrent lifecycle transition carries fresher information anyway.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use sea_orm::Set;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{Duration as TokioDuration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::crypto::TokenVault;
use crate::error::LifecycleError;
use crate::lifecycle::HealthStatus;
use crate::models::integration;
use crate::providers::{AdapterRegistry, ProbeOutcome};
use crate::repositories::IntegrationRepository;
use crate::token_refresh::RefreshCoordinator;

/// Probes integration credentials and records their liveness
#[derive(Clone)]
pub struct HealthProbeService {
    config: Arc<AppConfig>,
    repo: IntegrationRepository,
    vault: Arc<TokenVault>,
    registry: Arc<AdapterRegistry>,
    refresh: Arc<RefreshCoordinator>,
}

/// Snapshot returned to on-demand probe callers
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthReport {
    pub integration_id: Uuid,
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthProbeService {
    pub fn new(
        config: Arc<AppConfig>,
        repo: IntegrationRepository,
        vault: Arc<TokenVault>,
        registry: Arc<AdapterRegistry>,
        refresh: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            config,
            repo,
            vault,
            registry,
            refresh,
        }
    }

    /// Run the probe sweep loop until the provided shutdown token fires
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Starting health probe sweep");
        let tick_interval = TokioDuration::from_secs(self.config.health.interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Health probe sweep shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = std::time::Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Health probe tick failed");
                    }
                    histogram!("integration_health_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Health probe sweep stopped");
    }

    /// Probe every integration that holds (or recently held) a credential
    #[instrument(skip_all)]
    pub async fn tick(&self) -> Result<(), LifecycleError> {
        let rows = self.repo.find_for_health_sweep().await?;
        if rows.is_empty() {
            debug!("No integrations to probe");
            return Ok(());
        }

        debug!(found = rows.len(), "Probing integrations");
        for row in rows {
            if let Err(err) = self.check(row.id).await {
                warn!(integration_id = %row.id, error = %err, "Health probe failed");
            }
        }

        Ok(())
    }

    /// Probe a single integration's credential.
    ///
    /// An expired token triggers an implicit refresh first, so a working
    /// refresh token reads as healthy rather than expired. Without any
    /// stored credential the probe reports unauthorized and skips the
    /// provider entirely.
    #[instrument(skip_all, fields(integration_id = %integration_id))]
    pub async fn check(&self, integration_id: Uuid) -> Result<HealthReport, LifecycleError> {
        let mut row = self
            .repo
            .get_by_id(&integration_id)
            .await?
            .ok_or(LifecycleError::IntegrationNotFound)?;

        if row.credential_ciphertext.is_none() {
            return Ok(self
                .record(
                    row,
                    HealthStatus::Unauthorized,
                    Some("no stored credential".to_string()),
                )
                .await);
        }

        if row.token_expired(Utc::now()) {
            match self.refresh.refresh(integration_id, false).await {
                Ok(updated) => row = updated,
                Err(err) => {
                    // The coordinator already annotated the row; report what it left
                    debug!(
                        integration_id = %integration_id,
                        error = %err,
                        "Implicit refresh before probe failed"
                    );
                    let current = self
                        .repo
                        .get_by_id(&integration_id)
                        .await?
                        .ok_or(LifecycleError::IntegrationNotFound)?;
                    return Ok(HealthReport {
                        integration_id,
                        status: current.health().unwrap_or(HealthStatus::Expired),
                        checked_at: Utc::now(),
                        error: current.health_error,
                    });
                }
            }
        }

        let Some(ciphertext) = row.credential_ciphertext.as_deref() else {
            return Ok(self
                .record(
                    row,
                    HealthStatus::Unauthorized,
                    Some("no stored credential".to_string()),
                )
                .await);
        };
        let tokens = self.vault.open(&row.tenant_id, &row.id, ciphertext)?;
        let adapter = self.registry.get(&row.provider_slug)?;

        match adapter.probe(&tokens.access_token).await {
            Ok(outcome) => {
                let (status, error) = match outcome {
                    ProbeOutcome::Healthy => (HealthStatus::Healthy, None),
                    ProbeOutcome::Unauthorized => (HealthStatus::Unauthorized, None),
                    ProbeOutcome::Error { summary } => (HealthStatus::Error, Some(summary)),
                };
                Ok(self.record(row, status, error).await)
            }
            Err(err) => {
                // Could not even reach the provider; record it but surface the failure
                let details = err.to_string();
                self.record(row, HealthStatus::Error, Some(details.clone()))
                    .await;
                Err(LifecycleError::HealthProbeFailed { details })
            }
        }
    }

    /// Persist a probe result best-effort and build the caller's report
    async fn record(
        &self,
        row: integration::Model,
        status: HealthStatus,
        error: Option<String>,
    ) -> HealthReport {
        let checked_at = Utc::now();
        let update = integration::ActiveModel {
            health_status: Set(Some(status.as_str().to_string())),
            health_checked_at: Set(Some(checked_at.into())),
            health_error: Set(error.clone()),
            ..Default::default()
        };

        match self.repo.update_versioned(&row.id, row.version, update).await {
            Ok(Some(_)) => {}
            Ok(None) => debug!(
                integration_id = %row.id,
                "Probe result dropped after concurrent update"
            ),
            Err(err) => error!(
                integration_id = %row.id,
                error = ?err,
                "Failed to record probe result"
            ),
        }

        let metric_labels = vec![("status", status.as_str().to_string())];
        counter!("integration_health_probes_total", &metric_labels).increment(1);

        HealthReport {
            integration_id: row.id,
            status,
            checked_at,
            error,
        }
    }
}
