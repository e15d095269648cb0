//! # Credential Refresh Coordinator
//!
//! Background task that periodically scans active integrations and refreshes
//! credentials nearing expiry. Also provides on-demand refresh for the API
//! and for health probes that find an expired token. Concurrent attempts for
//! the same integration are serialized through a per-integration lock, so one
//! network call serves all callers.

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge, histogram};
use rand::Rng;
use sea_orm::Set;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};
use tokio::time::{Duration as TokioDuration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditRecorder};
use crate::config::AppConfig;
use crate::crypto::TokenVault;
use crate::error::LifecycleError;
use crate::lifecycle::{HealthStatus, IntegrationStatus};
use crate::models::integration;
use crate::providers::AdapterRegistry;
use crate::repositories::IntegrationRepository;

/// Coordinates credential refreshes across the background sweep and
/// on-demand callers
#[derive(Clone)]
pub struct RefreshCoordinator {
    config: Arc<AppConfig>,
    repo: IntegrationRepository,
    vault: Arc<TokenVault>,
    registry: Arc<AdapterRegistry>,
    audit: Arc<dyn AuditRecorder>,
    /// Per-integration locks serializing refresh attempts
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl RefreshCoordinator {
    pub fn new(
        config: Arc<AppConfig>,
        repo: IntegrationRepository,
        vault: Arc<TokenVault>,
        registry: Arc<AdapterRegistry>,
        audit: Arc<dyn AuditRecorder>,
    ) -> Self {
        Self {
            config,
            repo,
            vault,
            registry,
            audit,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run the refresh sweep loop until the provided shutdown token fires
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Starting credential refresh sweep");
        let tick_interval = TokioDuration::from_secs(self.config.refresh.tick_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Credential refresh sweep shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = std::time::Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Credential refresh tick failed");
                    }
                    histogram!("integration_refresh_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Credential refresh sweep stopped");
    }

    /// Execute one sweep over integrations due for refresh
    #[instrument(skip_all)]
    pub async fn tick(&self) -> Result<(), LifecycleError> {
        let now = Utc::now();
        let cutoff = now + Duration::seconds(self.config.refresh.lead_time_seconds as i64);
        let due = self.repo.find_due_for_refresh(cutoff).await?;

        gauge!("integration_refresh_due_gauge").set(due.len() as f64);
        if due.is_empty() {
            debug!("No credentials due for refresh");
            return Ok(());
        }

        info!(
            found = due.len(),
            lead_time_seconds = self.config.refresh.lead_time_seconds,
            "Found credentials due for refresh"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.refresh.concurrency as usize));
        let mut handles = Vec::new();

        for row in due {
            let semaphore = semaphore.clone();
            let coordinator = self.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.unwrap();
                coordinator.refresh_with_jitter(row.id).await
            }));
        }

        let mut succeeded = 0u64;
        let mut failed = 0u64;
        for handle in handles {
            match handle.await {
                Ok(Ok(_)) => succeeded += 1,
                Ok(Err(err)) => {
                    failed += 1;
                    warn!(error = %err, "Sweep refresh failed");
                }
                Err(err) => {
                    failed += 1;
                    error!(error = ?err, "Refresh task panicked or was cancelled");
                }
            }
        }

        counter!("integration_refresh_sweep_success_total").increment(succeeded);
        counter!("integration_refresh_sweep_failure_total").increment(failed);
        debug!(succeeded, failed, "Credential refresh tick completed");

        Ok(())
    }

    /// Sweep entry point: apply jitter to avoid a thundering herd, then refresh
    async fn refresh_with_jitter(
        &self,
        integration_id: Uuid,
    ) -> Result<integration::Model, LifecycleError> {
        let jitter = self.compute_jitter();
        if jitter > TokioDuration::ZERO {
            debug!(
                integration_id = %integration_id,
                jitter_ms = jitter.as_millis() as u64,
                "Applying jitter before refresh"
            );
            sleep(jitter).await;
        }

        // The sweep already selected this row as due within the lead time, so
        // the post-lock recheck uses the same window. Anything a concurrent
        // refresh pushed past it is skipped without provider traffic.
        self.refresh_within(integration_id, false, self.config.refresh.lead_time_seconds)
            .await
    }

    /// Refresh an integration's credential.
    ///
    /// Unless `force` is set, a credential that is still outside the expiry
    /// safety margin is left alone and the current row is returned without
    /// any provider traffic. Permanent provider denials revoke the
    /// integration; transient failures are retried with exponential backoff
    /// before giving up.
    pub async fn refresh(
        &self,
        integration_id: Uuid,
        force: bool,
    ) -> Result<integration::Model, LifecycleError> {
        self.refresh_within(
            integration_id,
            force,
            self.config.refresh.safety_margin_seconds,
        )
        .await
    }

    #[instrument(skip_all, fields(integration_id = %integration_id))]
    async fn refresh_within(
        &self,
        integration_id: Uuid,
        force: bool,
        margin_seconds: u64,
    ) -> Result<integration::Model, LifecycleError> {
        let _guard = self.integration_lock(integration_id).await;

        // Re-read inside the lock so a refresh that just finished is visible
        let row = self
            .repo
            .get_by_id(&integration_id)
            .await?
            .ok_or(LifecycleError::IntegrationNotFound)?;

        if row.lifecycle_status() == IntegrationStatus::Revoked {
            return Err(LifecycleError::RefreshTokenMissing);
        }

        let now = Utc::now();
        if !force && !needs_refresh(&row, now, margin_seconds) {
            debug!(integration_id = %row.id, "Credential still fresh, skipping refresh");
            return Ok(row);
        }

        let Some(ciphertext) = row.credential_ciphertext.as_deref() else {
            self.record_failure_health(&row, HealthStatus::Unauthorized, "no stored credential")
                .await;
            return Err(LifecycleError::RefreshTokenMissing);
        };

        let stored = self.vault.open(&row.tenant_id, &row.id, ciphertext)?;
        let Some(refresh_token) = stored.refresh_token.clone() else {
            self.record_failure_health(&row, HealthStatus::Unauthorized, "no refresh token")
                .await;
            return Err(LifecycleError::RefreshTokenMissing);
        };

        let adapter = self.registry.get(&row.provider_slug)?;
        let refresh_started = std::time::Instant::now();

        let mut attempt: u32 = 0;
        let outcome = loop {
            attempt += 1;
            match adapter.refresh(&refresh_token).await {
                Ok(tokens) => break Ok(tokens),
                Err(err) if err.is_permanent() => break Err(err),
                Err(err) => {
                    if attempt >= self.config.refresh.max_attempts {
                        break Err(err);
                    }
                    let backoff = self.config.refresh.backoff_base_ms * 2u64.pow(attempt - 1);
                    warn!(
                        integration_id = %row.id,
                        provider_slug = %row.provider_slug,
                        attempt = attempt,
                        backoff_ms = backoff,
                        error = %err,
                        "Transient refresh failure, backing off"
                    );
                    sleep(TokioDuration::from_millis(backoff)).await;
                }
            }
        };

        let metric_labels = vec![("provider_slug", row.provider_slug.clone())];

        match outcome {
            Ok(mut fresh) => {
                // Providers may omit the refresh token on rotation; keep the old one
                if fresh.refresh_token.is_none() {
                    fresh.refresh_token = Some(refresh_token);
                }

                let ciphertext = self.vault.seal(&row.tenant_id, &row.id, &fresh)?;
                let update = integration::ActiveModel {
                    status: Set(IntegrationStatus::Active.as_str().to_string()),
                    credential_ciphertext: Set(Some(ciphertext)),
                    token_expires_at: Set(fresh.expires_at.map(Into::into)),
                    health_status: Set(Some(HealthStatus::Healthy.as_str().to_string())),
                    health_checked_at: Set(Some(now.into())),
                    health_error: Set(None),
                    ..Default::default()
                };

                let updated = self
                    .repo
                    .update_versioned_retry(&row.id, row.version, update)
                    .await?
                    .ok_or(LifecycleError::VersionConflict)?;

                histogram!("integration_refresh_latency_ms")
                    .record(refresh_started.elapsed().as_secs_f64() * 1_000.0);
                counter!("integration_refresh_success_total", &metric_labels).increment(1);
                info!(
                    integration_id = %row.id,
                    provider_slug = %row.provider_slug,
                    attempts = attempt,
                    "Refreshed integration credential"
                );

                Ok(updated)
            }
            Err(err) if err.is_permanent() => {
                let details = err.to_string();
                error!(
                    integration_id = %row.id,
                    provider_slug = %row.provider_slug,
                    error = %details,
                    "Permanent refresh failure, revoking integration"
                );

                self.revoke_after_permanent_failure(&row, &details).await;
                counter!("integration_refresh_failure_total", &metric_labels).increment(1);
                Err(LifecycleError::RefreshFailedPermanent { details })
            }
            Err(err) => {
                let details = err.to_string();
                warn!(
                    integration_id = %row.id,
                    provider_slug = %row.provider_slug,
                    attempts = attempt,
                    error = %details,
                    "Refresh attempts exhausted"
                );

                self.record_failure_health(&row, HealthStatus::Error, &details)
                    .await;
                counter!("integration_refresh_failure_total", &metric_labels).increment(1);
                Err(LifecycleError::RefreshFailedTransient { details })
            }
        }
    }

    /// Mark the integration revoked after the provider rejected the grant
    /// outright, and leave an audit trail of the forced transition.
    async fn revoke_after_permanent_failure(&self, row: &integration::Model, details: &str) {
        let update = integration::ActiveModel {
            status: Set(IntegrationStatus::Revoked.as_str().to_string()),
            health_status: Set(Some(HealthStatus::Unauthorized.as_str().to_string())),
            health_checked_at: Set(Some(Utc::now().into())),
            health_error: Set(Some(details.to_string())),
            ..Default::default()
        };

        match self
            .repo
            .update_versioned_retry(&row.id, row.version, update)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => warn!(
                integration_id = %row.id,
                "Concurrent update while revoking integration"
            ),
            Err(err) => error!(
                integration_id = %row.id,
                error = ?err,
                "Failed to persist revoked status"
            ),
        }

        let mut event = AuditEvent::new("refresh.revoked", false);
        event.tenant_id = Some(row.tenant_id);
        event.integration_id = Some(row.id);
        event.provider = Some(row.provider_slug.clone());
        event.error_code = Some("RefreshFailedPermanent".to_string());
        self.audit.record(event);

        counter!("integration_refresh_revoked_total").increment(1);
    }

    /// Best-effort health annotation after a failed refresh. The lifecycle
    /// status is left untouched; a concurrent writer winning the version race
    /// just means fresher information is already there.
    async fn record_failure_health(
        &self,
        row: &integration::Model,
        status: HealthStatus,
        details: &str,
    ) {
        let update = integration::ActiveModel {
            health_status: Set(Some(status.as_str().to_string())),
            health_checked_at: Set(Some(Utc::now().into())),
            health_error: Set(Some(details.to_string())),
            ..Default::default()
        };

        match self.repo.update_versioned(&row.id, row.version, update).await {
            Ok(Some(_)) => {}
            Ok(None) => debug!(
                integration_id = %row.id,
                "Skipped health annotation after concurrent update"
            ),
            Err(err) => error!(
                integration_id = %row.id,
                error = ?err,
                "Failed to record refresh failure health"
            ),
        }
    }

    /// Compute jitter delay based on configuration
    fn compute_jitter(&self) -> TokioDuration {
        if self.config.refresh.jitter_factor <= 0.0 {
            return TokioDuration::ZERO;
        }

        let max_delay_ms = (self.config.refresh.lead_time_seconds as f64
            * self.config.refresh.jitter_factor
            * 1_000.0) as u64;

        let mut rng = rand::thread_rng();
        TokioDuration::from_millis(rng.gen_range(0..=max_delay_ms))
    }

    async fn integration_lock(&self, integration_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(integration_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Whether the stored credential expires within the given margin
fn needs_refresh(row: &integration::Model, now: DateTime<Utc>, margin_seconds: u64) -> bool {
    match row.token_expires_at {
        Some(expires_at) => {
            expires_at.with_timezone(&Utc) <= now + Duration::seconds(margin_seconds as i64)
        }
        // No recorded expiry means nothing says the token went stale
        None => false,
    }
}
