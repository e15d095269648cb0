//! Provider adapter trait definition
//!
//! Defines the standard interface that all OAuth provider adapters must follow.

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::crypto::TokenSet;

/// Adapter-specific error types for structured error handling
#[derive(Debug, Error)]
pub enum AdapterError {
    /// HTTP error from the provider
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// OAuth protocol error code from the provider (invalid_grant etc.)
    #[error("provider rejected the grant: {error_code}")]
    Denied { error_code: String },

    /// Network or connectivity error
    #[error("network error: {details}")]
    Network { details: String },

    /// Provider did not respond within the request timeout
    #[error("provider request timed out")]
    Timeout,

    /// Malformed response from the provider
    #[error("malformed provider response: {details}")]
    Malformed { details: String },

    /// Provider catalog row is unusable
    #[error("adapter configuration error: {details}")]
    Config { details: String },
}

impl AdapterError {
    /// Whether retrying the same request can ever succeed.
    ///
    /// HTTP 400/401/403 and explicit OAuth error codes mean the grant itself
    /// is bad; 5xx, timeouts, and transport failures are worth retrying.
    pub fn is_permanent(&self) -> bool {
        match self {
            AdapterError::Http { status, .. } => matches!(status, 400 | 401 | 403),
            AdapterError::Denied { .. } => true,
            AdapterError::Config { .. } => true,
            AdapterError::Network { .. } | AdapterError::Timeout | AdapterError::Malformed { .. } => {
                false
            }
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else {
            AdapterError::Network {
                details: err.to_string(),
            }
        }
    }
}

/// Result of probing a provider with a stored credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Provider accepted the credential
    Healthy,
    /// Provider rejected the credential (401/403)
    Unauthorized,
    /// Provider was reachable but returned an unexpected status
    Error { summary: String },
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable slug identifying the provider in the catalog.
    fn slug(&self) -> &str;

    /// Build the authorization URL the user is redirected to.
    /// The signed state and callback URI are supplied by the caller.
    fn build_authorization_url(&self, state: &str, redirect_uri: &str)
    -> Result<Url, AdapterError>;

    /// Exchange an authorization code for a token set.
    async fn exchange_code(&self, code: &str, redirect_uri: &str)
    -> Result<TokenSet, AdapterError>;

    /// Obtain a fresh token set using a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AdapterError>;

    /// Check whether an access token still works against the provider.
    async fn probe(&self, access_token: &str) -> Result<ProbeOutcome, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_permanent() {
        for status in [400, 401, 403] {
            let err = AdapterError::Http {
                status,
                body: "denied".to_string(),
            };
            assert!(err.is_permanent(), "HTTP {} should be permanent", status);
        }
    }

    #[test]
    fn test_server_errors_are_transient() {
        for status in [429, 500, 502, 503] {
            let err = AdapterError::Http {
                status,
                body: "unavailable".to_string(),
            };
            assert!(!err.is_permanent(), "HTTP {} should be transient", status);
        }
    }

    #[test]
    fn test_oauth_denials_are_permanent() {
        let err = AdapterError::Denied {
            error_code: "invalid_grant".to_string(),
        };
        assert!(err.is_permanent());
    }

    #[test]
    fn test_transport_failures_are_transient() {
        assert!(!AdapterError::Timeout.is_permanent());
        assert!(
            !AdapterError::Network {
                details: "connection refused".to_string()
            }
            .is_permanent()
        );
        assert!(
            !AdapterError::Malformed {
                details: "truncated json".to_string()
            }
            .is_permanent()
        );
    }
}
