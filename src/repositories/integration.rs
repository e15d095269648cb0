//! Integration repository for database operations
//!
//! Encapsulates SeaORM operations for the integrations table: tenant-scoped
//! lookups, the unique tenant/provider pair lookup, the queries backing the
//! refresh and health sweeps, and the compare-and-set versioned write that
//! every lifecycle transition goes through.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::lifecycle::IntegrationStatus;
use crate::models::integration::{self, Entity as Integration};

/// Repository for integration database operations
#[derive(Debug, Clone)]
pub struct IntegrationRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl IntegrationRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Retrieves an integration by id within a tenant scope
    pub async fn find_by_id(
        &self,
        tenant_id: &Uuid,
        id: &Uuid,
    ) -> Result<Option<integration::Model>> {
        Ok(Integration::find_by_id(*id)
            .filter(integration::Column::TenantId.eq(*tenant_id))
            .one(&*self.db)
            .await?)
    }

    /// Retrieves an integration by its ID without tenant scoping
    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<integration::Model>> {
        Ok(Integration::find_by_id(*id).one(&*self.db).await?)
    }

    /// Lists all integrations for a tenant ordered by creation time then ID
    pub async fn find_by_tenant(&self, tenant_id: &Uuid) -> Result<Vec<integration::Model>> {
        Ok(Integration::find()
            .filter(integration::Column::TenantId.eq(*tenant_id))
            .order_by_asc(integration::Column::CreatedAt)
            .order_by_asc(integration::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// Finds the single integration for a tenant/provider pair.
    ///
    /// The pair is unique by schema constraint, so at most one row comes back.
    pub async fn find_by_tenant_and_provider(
        &self,
        tenant_id: &Uuid,
        provider_slug: &str,
    ) -> Result<Option<integration::Model>> {
        Ok(Integration::find()
            .filter(integration::Column::TenantId.eq(*tenant_id))
            .filter(integration::Column::ProviderSlug.eq(provider_slug))
            .one(&*self.db)
            .await?)
    }

    /// Creates a new integration record
    pub async fn create(&self, integration: integration::ActiveModel) -> Result<integration::Model> {
        let id = integration
            .id
            .clone()
            .take()
            .ok_or_else(|| anyhow!("integration id must be set"))?;

        let active = integration;
        active.insert(&*self.db).await?;

        // For SQLite, query the record directly since we already know the ID
        let fetched = Integration::find_by_id(id).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow!("integration not persisted"))
    }

    /// Compare-and-set write for lifecycle transitions.
    ///
    /// Applies `update` only if the stored version still equals
    /// `expected_version`, bumping the version and `updated_at` in the same
    /// statement. Returns `None` when the row was modified concurrently (or
    /// no longer exists at that version); callers decide whether to re-read
    /// and retry.
    pub async fn update_versioned(
        &self,
        id: &Uuid,
        expected_version: i64,
        mut update: integration::ActiveModel,
    ) -> Result<Option<integration::Model>> {
        update.id = sea_orm::ActiveValue::NotSet;
        update.version = Set(expected_version + 1);
        update.updated_at = Set(Utc::now().into());

        let result = Integration::update_many()
            .set(update)
            .filter(integration::Column::Id.eq(*id))
            .filter(integration::Column::Version.eq(expected_version))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }

        let fetched = Integration::find_by_id(*id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("integration missing after versioned update"))?;
        Ok(Some(fetched))
    }

    /// Versioned write that re-reads and retries once when a concurrent
    /// writer advanced the version. Returns `None` when the retry also loses
    /// or the row is gone.
    pub async fn update_versioned_retry(
        &self,
        id: &Uuid,
        expected_version: i64,
        update: integration::ActiveModel,
    ) -> Result<Option<integration::Model>> {
        if let Some(updated) = self
            .update_versioned(id, expected_version, update.clone())
            .await?
        {
            return Ok(Some(updated));
        }

        let Some(current) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        self.update_versioned(id, current.version, update).await
    }

    /// Integrations whose tokens expire at or before `cutoff` and that hold a
    /// refreshable credential. Feeds the background refresh sweep.
    pub async fn find_due_for_refresh(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<integration::Model>> {
        Ok(Integration::find()
            .filter(integration::Column::Status.eq(IntegrationStatus::Active.as_str()))
            .filter(integration::Column::CredentialCiphertext.is_not_null())
            .filter(integration::Column::TokenExpiresAt.is_not_null())
            .filter(integration::Column::TokenExpiresAt.lte(cutoff))
            .order_by_asc(integration::Column::TokenExpiresAt)
            .all(&*self.db)
            .await?)
    }

    /// Integrations worth probing: everything not pending and not revoked.
    pub async fn find_for_health_sweep(&self) -> Result<Vec<integration::Model>> {
        Ok(Integration::find()
            .filter(
                Condition::any()
                    .add(integration::Column::Status.eq(IntegrationStatus::Active.as_str()))
                    .add(integration::Column::Status.eq(IntegrationStatus::Expired.as_str()))
                    .add(integration::Column::Status.eq(IntegrationStatus::Error.as_str())),
            )
            .order_by_asc(integration::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }
}
