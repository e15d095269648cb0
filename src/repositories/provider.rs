//! Provider repository for database operations
//!
//! This module provides the ProviderRepository struct which encapsulates
//! SeaORM operations for the providers catalog.

use anyhow::Result;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};
use std::sync::Arc;

use crate::models::provider::{self, Entity as Provider};

/// Repository for provider database operations
#[derive(Debug, Clone)]
pub struct ProviderRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl ProviderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Finds a provider by its slug
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<provider::Model>> {
        let provider = Provider::find_by_id(slug.to_string())
            .one(&*self.db)
            .await?;
        Ok(provider)
    }

    /// Lists all providers ordered by slug
    pub async fn find_all(&self) -> Result<Vec<provider::Model>> {
        let providers = Provider::find()
            .order_by_asc(provider::Column::Slug)
            .all(&*self.db)
            .await?;
        Ok(providers)
    }

    /// Creates a new provider
    pub async fn create(&self, provider: provider::ActiveModel) -> Result<provider::Model> {
        let slug = provider
            .slug
            .clone()
            .take()
            .ok_or_else(|| anyhow::anyhow!("provider slug must be set"))?;

        Provider::insert(provider).exec(&*self.db).await?;

        let fetched = Provider::find_by_id(slug.clone()).one(&*self.db).await?;
        fetched.ok_or_else(|| anyhow::anyhow!("provider '{}' not persisted", slug))
    }
}
