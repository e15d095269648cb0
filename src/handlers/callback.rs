//! # OAuth Callback Handler
//!
//! This module contains the public endpoint the provider redirects back to.
//! The orchestrator does the real work; this handler only renders its
//! outcome as JSON. Failures carry one generic message per failure class so
//! nothing about the internal rejection reason leaks to the caller.

use crate::callback::{CallbackLink, CallbackRequest};
use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Terminal outcome of one callback attempt
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CallbackOutcome {
    /// Whether the integration was linked
    pub ok: bool,
    /// Tenant that owns the linked integration
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub tenant_id: Option<Uuid>,
    /// Integration that received the credential
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub integration_id: Option<Uuid>,
    /// Non-specific failure description safe to show a user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generic_message: Option<String>,
}

impl CallbackOutcome {
    fn linked(link: CallbackLink) -> Self {
        Self {
            ok: true,
            tenant_id: Some(link.tenant_id),
            integration_id: Some(link.integration_id),
            generic_message: None,
        }
    }

    fn failed(generic_message: String) -> Self {
        Self {
            ok: false,
            tenant_id: None,
            integration_id: None,
            generic_message: Some(generic_message),
        }
    }
}

/// Handle the provider redirect completing an OAuth flow
///
/// Public endpoint: the browser arrives here carrying the provider's `code`
/// and the signed `state` issued at initiation. On success the integration
/// becomes `active` and its identifiers are returned. On failure the response
/// carries only a class-level message; the specific reason goes to the audit
/// trail.
#[utoipa::path(
    get,
    path = "/oauth/callback",
    params(CallbackRequest),
    responses(
        (status = 200, description = "Integration linked", body = CallbackOutcome),
        (status = 400, description = "State missing, malformed, or expired", body = CallbackOutcome),
        (status = 404, description = "Integration or provider not found", body = CallbackOutcome),
        (status = 502, description = "Provider rejected the authorization", body = CallbackOutcome),
        (status = 503, description = "Temporary failure, retry later", body = CallbackOutcome)
    ),
    tag = "oauth"
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(request): Query<CallbackRequest>,
) -> Response {
    match state.callback.handle(request).await {
        Ok(link) => (StatusCode::OK, Json(CallbackOutcome::linked(link))).into_response(),
        Err(err) => {
            let generic_message = err.generic_message().to_string();
            let status = ApiError::from(err).status;
            (status, Json(CallbackOutcome::failed(generic_message))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::test_state;
    use axum::body::to_bytes;

    async fn outcome_of(response: Response) -> (StatusCode, CallbackOutcome) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let outcome: CallbackOutcome = serde_json::from_slice(&bytes).unwrap();
        (status, outcome)
    }

    #[tokio::test]
    async fn test_callback_without_state_is_rejected_generically() {
        let (state, audit) = test_state().await;

        let response = oauth_callback(
            State(state),
            Query(CallbackRequest {
                code: Some("code".to_string()),
                ..Default::default()
            }),
        )
        .await;

        let (status, outcome) = outcome_of(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!outcome.ok);
        let message = outcome.generic_message.unwrap();
        assert!(!message.contains("StateInvalid"));

        let event = audit.last().expect("audit event recorded");
        assert_eq!(event.event, "callback.attempt");
        assert!(!event.success);
        assert_eq!(event.error_code.as_deref(), Some("StateInvalid"));
    }

    #[tokio::test]
    async fn test_callback_provider_denial_maps_to_bad_gateway() {
        let (state, audit) = test_state().await;

        let response = oauth_callback(
            State(state),
            Query(CallbackRequest {
                error: Some("access_denied".to_string()),
                error_description: Some("User denied access".to_string()),
                ..Default::default()
            }),
        )
        .await;

        let (status, outcome) = outcome_of(response).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(!outcome.ok);
        assert!(outcome.tenant_id.is_none());

        let event = audit.last().expect("audit event recorded");
        assert_eq!(event.error_code.as_deref(), Some("ProviderDenied"));
    }

    #[tokio::test]
    async fn test_callback_forged_state_never_echoes_details() {
        let (state, _audit) = test_state().await;

        let response = oauth_callback(
            State(state),
            Query(CallbackRequest {
                code: Some("code".to_string()),
                state: Some("bm90LWEtcmVhbC1wYXlsb2Fk.deadbeef".to_string()),
                ..Default::default()
            }),
        )
        .await;

        let (status, outcome) = outcome_of(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = outcome.generic_message.unwrap();
        assert!(!message.contains("signature"));
        assert!(!message.contains("hmac"));
    }
}
