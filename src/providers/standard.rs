//! Catalog-driven OAuth2 authorization-code adapter
//!
//! Drives the standard authorization-code flow directly from a provider
//! catalog row. Provider-specific behavior is limited to the extra
//! authorize-URL parameters stored in the catalog; providers that deviate
//! from the protocol itself get a dedicated adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::crypto::TokenSet;
use crate::models::provider;
use crate::providers::adapter::{AdapterError, ProbeOutcome, ProviderAdapter};

/// Provider response bodies are truncated to this many characters before
/// they enter logs or error details.
const MAX_BODY_SNIPPET_CHARS: usize = 200;

/// Generic adapter for providers that follow the plain authorization-code flow
pub struct StandardAdapter {
    provider: provider::Model,
    scopes: Vec<String>,
    extra_params: Vec<(String, String)>,
    http: reqwest::Client,
}

impl StandardAdapter {
    /// Create an adapter from a provider catalog row and a shared HTTP client
    pub fn new(provider: provider::Model, http: reqwest::Client) -> Self {
        let scopes = provider.scope_list();
        let extra_params = provider
            .extra_params
            .as_ref()
            .and_then(|v| v.as_object())
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            provider,
            scopes,
            extra_params,
            http,
        }
    }

    /// Send a token request and parse the response into a token set
    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenSet, AdapterError> {
        let request = match self.provider.token_method.as_str() {
            "get" => self.http.get(&self.provider.token_url).query(form),
            _ => self.http.post(&self.provider.token_url).form(form),
        };

        let response = request.header("Accept", "application/json").send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(token_error(status, &body));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            AdapterError::Malformed {
                details: format!("token response: {}", e),
            }
        })?;
        Ok(token.into_token_set(Utc::now()))
    }
}

#[async_trait]
impl ProviderAdapter for StandardAdapter {
    fn slug(&self) -> &str {
        &self.provider.slug
    }

    fn build_authorization_url(
        &self,
        state: &str,
        redirect_uri: &str,
    ) -> Result<Url, AdapterError> {
        let mut url = Url::parse(&self.provider.auth_url).map_err(|e| AdapterError::Config {
            details: format!(
                "invalid authorize URL for provider '{}': {}",
                self.provider.slug, e
            ),
        })?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.provider.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state);

        for (key, value) in &self.extra_params {
            url.query_pairs_mut().append_pair(key, value);
        }

        Ok(url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, AdapterError> {
        let form = [
            ("grant_type", self.provider.grant_type.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.provider.client_id.as_str()),
            ("client_secret", self.provider.client_secret.as_str()),
        ];
        self.request_token(&form).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AdapterError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.provider.client_id.as_str()),
            ("client_secret", self.provider.client_secret.as_str()),
        ];
        self.request_token(&form).await
    }

    async fn probe(&self, access_token: &str) -> Result<ProbeOutcome, AdapterError> {
        let response = self
            .http
            .get(&self.provider.probe_url)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(ProbeOutcome::Healthy)
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            Ok(ProbeOutcome::Unauthorized)
        } else {
            let body = response.text().await.unwrap_or_default();
            Ok(ProbeOutcome::Error {
                summary: format!("HTTP {}: {}", status.as_u16(), snippet(&body)),
            })
        }
    }
}

/// OAuth error payload returned by token endpoints (RFC 6749 section 5.2)
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Successful token endpoint payload
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_token_set(self, now: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self
                .expires_in
                .map(|secs| now + chrono::Duration::seconds(secs)),
            scopes: self
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }
}

/// Classify a failed token response. A 4xx carrying an OAuth error code is a
/// protocol-level denial; everything else stays an HTTP error.
fn token_error(status: u16, body: &str) -> AdapterError {
    if (400..500).contains(&status) {
        if let Ok(parsed) = serde_json::from_str::<OAuthErrorBody>(body) {
            if let Some(code) = parsed.error {
                return AdapterError::Denied { error_code: code };
            }
        }
    }
    AdapterError::Http {
        status,
        body: snippet(body),
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(MAX_BODY_SNIPPET_CHARS).collect()
}
