//! Provider adapter registry
//!
//! In-memory lookup table mapping provider slugs to adapter instances.
//! Built once at startup from the provider catalog and shared through
//! application state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::LifecycleError;
use crate::models::provider;
use crate::providers::adapter::ProviderAdapter;
use crate::providers::google_drive::{GOOGLE_DRIVE_SLUG, GoogleDriveAdapter};
use crate::providers::standard::StandardAdapter;

/// Registry of provider adapters keyed by slug
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Build a registry from provider catalog rows.
    ///
    /// Providers with protocol quirks get their dedicated adapter; everything
    /// else runs through the catalog-driven standard adapter.
    pub fn from_catalog(providers: Vec<provider::Model>, http: reqwest::Client) -> Self {
        let mut registry = Self::new();
        for row in providers {
            let adapter: Arc<dyn ProviderAdapter> = match row.slug.as_str() {
                GOOGLE_DRIVE_SLUG => Arc::new(GoogleDriveAdapter::new(row, http.clone())),
                _ => Arc::new(StandardAdapter::new(row, http.clone())),
            };
            registry.register(adapter);
        }
        registry
    }

    /// Register an adapter under its own slug
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.slug().to_string(), adapter);
    }

    /// Get an adapter by provider slug
    pub fn get(&self, slug: &str) -> Result<Arc<dyn ProviderAdapter>, LifecycleError> {
        self.adapters
            .get(slug)
            .cloned()
            .ok_or_else(|| LifecycleError::ProviderNotFound {
                slug: slug.to_string(),
            })
    }

    /// Number of registered adapters
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared HTTP client for provider calls with a bounded request timeout
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}
