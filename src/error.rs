//! # Error Handling
//!
//! This module provides unified error handling for the Integrations API: the
//! lifecycle error taxonomy shared by the callback, refresh, and probe paths,
//! and a consistent problem+json response format with trace ID propagation.
//! Taxonomy values never cross the HTTP boundary; callers see one generic
//! message per failure class while the specific code goes to the audit trail.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::crypto::CryptoError;
use crate::state_token::StateTokenError;
use crate::telemetry;

/// Every way an integration lifecycle operation can fail.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("state token failed validation")]
    StateInvalid,
    #[error("state token expired ({age_ms}ms old)")]
    StateExpired { age_ms: i64 },
    #[error("state token already consumed by an earlier callback")]
    StateReplayed,
    #[error("integration does not belong to the requesting tenant")]
    OwnershipMismatch,
    #[error("provider denied the authorization request: {error_code}")]
    ProviderDenied { error_code: String },
    #[error("provider '{slug}' not found")]
    ProviderNotFound { slug: String },
    #[error("authorization code exchange failed: {details}")]
    CodeExchangeFailed { details: String },
    #[error("integration has no refresh credential")]
    RefreshTokenMissing,
    #[error("token refresh failed (transient): {details}")]
    RefreshFailedTransient { details: String },
    #[error("token refresh failed (permanent): {details}")]
    RefreshFailedPermanent { details: String },
    #[error("health probe failed: {details}")]
    HealthProbeFailed { details: String },
    #[error("credential sealing or opening failed")]
    EncryptionFailure(#[from] CryptoError),
    #[error("integration was modified concurrently")]
    VersionConflict,
    #[error("integration not found")]
    IntegrationNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Coarse classification used to choose the externally-visible message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Authorization,
    Transient,
    NotFound,
}

impl LifecycleError {
    /// Stable machine code for audit events and internal logs.
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::StateInvalid => "StateInvalid",
            LifecycleError::StateExpired { .. } => "StateExpired",
            LifecycleError::StateReplayed => "StateReplayed",
            LifecycleError::OwnershipMismatch => "OwnershipMismatch",
            LifecycleError::ProviderDenied { .. } => "ProviderDenied",
            LifecycleError::ProviderNotFound { .. } => "ProviderNotFound",
            LifecycleError::CodeExchangeFailed { .. } => "CodeExchangeFailed",
            LifecycleError::RefreshTokenMissing => "RefreshTokenMissing",
            LifecycleError::RefreshFailedTransient { .. } => "RefreshFailedTransient",
            LifecycleError::RefreshFailedPermanent { .. } => "RefreshFailedPermanent",
            LifecycleError::HealthProbeFailed { .. } => "HealthProbeFailed",
            LifecycleError::EncryptionFailure(_) => "EncryptionFailure",
            LifecycleError::VersionConflict => "VersionConflict",
            LifecycleError::IntegrationNotFound => "IntegrationNotFound",
            LifecycleError::Internal(_) => "InternalError",
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            LifecycleError::StateInvalid
            | LifecycleError::StateExpired { .. }
            | LifecycleError::StateReplayed
            | LifecycleError::OwnershipMismatch
            | LifecycleError::ProviderDenied { .. }
            | LifecycleError::CodeExchangeFailed { .. }
            | LifecycleError::RefreshTokenMissing
            | LifecycleError::RefreshFailedPermanent { .. }
            | LifecycleError::EncryptionFailure(_) => FailureClass::Authorization,
            LifecycleError::RefreshFailedTransient { .. }
            | LifecycleError::HealthProbeFailed { .. }
            | LifecycleError::VersionConflict
            | LifecycleError::Internal(_) => FailureClass::Transient,
            LifecycleError::ProviderNotFound { .. } | LifecycleError::IntegrationNotFound => {
                FailureClass::NotFound
            }
        }
    }

    /// The one message per failure class that may leave the service. Never
    /// includes taxonomy names, provider responses, or identifiers.
    pub fn generic_message(&self) -> &'static str {
        match self.class() {
            FailureClass::Authorization => "The authorization could not be completed.",
            FailureClass::Transient => {
                "A temporary error occurred while processing the request. Please try again."
            }
            FailureClass::NotFound => "The requested integration or provider was not found.",
        }
    }

    /// Age of the state token in milliseconds, when this error knows it.
    pub fn state_age_ms(&self) -> Option<i64> {
        match self {
            LifecycleError::StateExpired { age_ms } => Some(*age_ms),
            _ => None,
        }
    }
}

impl From<StateTokenError> for LifecycleError {
    fn from(error: StateTokenError) -> Self {
        match error {
            StateTokenError::Invalid => LifecycleError::StateInvalid,
            StateTokenError::Expired { age_ms } => LifecycleError::StateExpired { age_ms },
            StateTokenError::Encoding(details) => {
                LifecycleError::Internal(anyhow::anyhow!("state token encoding: {}", details))
            }
        }
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Extract current trace ID from the active tracing span (falls back to generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                // Fallback: generate a correlation ID for basic client-server log correlation
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

pub(crate) fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    if let Some(code) = db_error.code() {
        let code_str = code.as_ref();
        if code_str == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code_str) {
            return true;
        }
    }

    false
}

/// Standard error types with predefined status codes
#[derive(Debug, Error)]
pub enum ErrorType {
    #[error("Bad Request")]
    BadRequest,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not Found")]
    NotFound,
    #[error("Conflict")]
    Conflict,
    #[error("Internal Server Error")]
    InternalServerError,
    #[error("Bad Gateway")]
    BadGateway,
    #[error("Service Unavailable")]
    ServiceUnavailable,
}

impl ErrorType {
    /// Get the appropriate HTTP status code for this error type
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::Conflict => StatusCode::CONFLICT,
            ErrorType::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorType::BadGateway => StatusCode::BAD_GATEWAY,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the stable SCREAMING_SNAKE_CASE code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorType::BadRequest => "VALIDATION_FAILED",
            ErrorType::Unauthorized => "UNAUTHORIZED",
            ErrorType::NotFound => "NOT_FOUND",
            ErrorType::Conflict => "CONFLICT",
            ErrorType::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorType::BadGateway => "PROVIDER_ERROR",
            ErrorType::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        // Add Retry-After header if present
        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

// Error mappers for common sources

impl From<ErrorType> for ApiError {
    fn from(error_type: ErrorType) -> Self {
        Self::new(
            error_type.status_code(),
            error_type.error_code(),
            &error_type.to_string(),
        )
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        // Log the full error for debugging
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(error: LifecycleError) -> Self {
        // Full detail stays on the server side
        tracing::debug!(code = error.code(), detail = %error, "Lifecycle operation failed");

        let generic = error.generic_message();
        match &error {
            LifecycleError::IntegrationNotFound
            | LifecycleError::ProviderNotFound { .. }
            | LifecycleError::OwnershipMismatch => {
                // Ownership mismatches read as not-found to avoid confirming
                // another tenant's integration exists
                Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", generic)
            }
            LifecycleError::VersionConflict => Self::new(
                StatusCode::CONFLICT,
                "CONFLICT",
                "The integration was modified concurrently. Retry the request.",
            ),
            LifecycleError::RefreshTokenMissing => Self::new(
                StatusCode::CONFLICT,
                "CONFLICT",
                "The integration is not in a refreshable state.",
            ),
            LifecycleError::StateInvalid
            | LifecycleError::StateExpired { .. }
            | LifecycleError::StateReplayed => {
                Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", generic)
            }
            LifecycleError::ProviderDenied { .. }
            | LifecycleError::CodeExchangeFailed { .. }
            | LifecycleError::RefreshFailedPermanent { .. } => {
                Self::new(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", generic)
            }
            LifecycleError::RefreshFailedTransient { .. }
            | LifecycleError::HealthProbeFailed { .. } => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", generic)
                    .with_retry_after(5)
            }
            LifecycleError::EncryptionFailure(_) | LifecycleError::Internal(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                generic,
            ),
        }
    }
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create an unauthorized error (401) with explicit trace_id
pub fn unauthorized_with_trace_id(message: Option<&str>, trace_id: String) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    let mut error = ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg);
    error.trace_id = Some(trace_id.into_boxed_str());
    error
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}
