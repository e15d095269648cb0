//! Google Drive adapter
//!
//! Google only issues a refresh token when the authorize request carries
//! `access_type=offline`, and repeat grants need `prompt=consent` to force
//! re-issuance. Everything else follows the standard authorization-code flow,
//! so this adapter wraps the catalog-driven one and fixes up the authorize URL.

use async_trait::async_trait;
use url::Url;

use crate::crypto::TokenSet;
use crate::models::provider;
use crate::providers::adapter::{AdapterError, ProbeOutcome, ProviderAdapter};
use crate::providers::standard::StandardAdapter;

pub const GOOGLE_DRIVE_SLUG: &str = "google-drive";

/// Google Drive adapter layering offline-access quirks over the standard flow
pub struct GoogleDriveAdapter {
    inner: StandardAdapter,
}

impl GoogleDriveAdapter {
    pub fn new(provider: provider::Model, http: reqwest::Client) -> Self {
        Self {
            inner: StandardAdapter::new(provider, http),
        }
    }
}

#[async_trait]
impl ProviderAdapter for GoogleDriveAdapter {
    fn slug(&self) -> &str {
        self.inner.slug()
    }

    fn build_authorization_url(
        &self,
        state: &str,
        redirect_uri: &str,
    ) -> Result<Url, AdapterError> {
        let mut url = self.inner.build_authorization_url(state, redirect_uri)?;
        url.query_pairs_mut()
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, AdapterError> {
        self.inner.exchange_code(code, redirect_uri).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AdapterError> {
        self.inner.refresh(refresh_token).await
    }

    async fn probe(&self, access_token: &str) -> Result<ProbeOutcome, AdapterError> {
        self.inner.probe(access_token).await
    }
}
