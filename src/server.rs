//! # Server Configuration
//!
//! This module contains the server setup and configuration for the
//! Integrations API: shared application state, the router with its public
//! and operator-authenticated route groups, and the OpenAPI document.

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::audit::AuditRecorder;
use crate::auth::auth_middleware;
use crate::callback::CallbackOrchestrator;
use crate::config::AppConfig;
use crate::crypto::TokenVault;
use crate::handlers;
use crate::health_probe::HealthProbeService;
use crate::providers::AdapterRegistry;
use crate::state_token::StateTokenCodec;
use crate::telemetry::{self, TraceContext};
use crate::token_refresh::RefreshCoordinator;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub vault: Arc<TokenVault>,
    pub state_codec: Arc<StateTokenCodec>,
    pub registry: Arc<AdapterRegistry>,
    pub audit: Arc<dyn AuditRecorder>,
    pub refresh: Arc<RefreshCoordinator>,
    pub health: Arc<HealthProbeService>,
    pub callback: Arc<CallbackOrchestrator>,
}

/// Give every request a task-local trace context so error responses and
/// audit logs carry a correlation id. The context also rides the request
/// extensions for extractors that run outside the task-local scope.
async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let context = TraceContext::new();
    request.extensions_mut().insert(context.clone());
    telemetry::with_trace_context(context, next.run(request)).await
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    // The callback route stays outside the operator layer: the browser
    // arrives with provider query parameters, not a bearer token.
    let operator_routes = Router::new()
        .route("/connect/{provider}", post(handlers::connect::start_oauth))
        .route(
            "/integrations",
            get(handlers::integrations::list_integrations),
        )
        .route(
            "/integrations/{id}",
            get(handlers::integrations::get_integration),
        )
        .route(
            "/integrations/{id}/refresh",
            post(handlers::integrations::refresh_integration),
        )
        .route(
            "/integrations/{id}/probe",
            post(handlers::integrations::probe_integration),
        )
        .route("/providers", get(handlers::providers::list_providers))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/oauth/callback", get(handlers::callback::oauth_callback))
        .merge(operator_routes)
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server and runs it until the shutdown token fires
pub async fn run_server(
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    // Resolve the configured bind address
    let addr = state
        .config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Adds the bearer token scheme referenced by the operator endpoints
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::connect::start_oauth,
        crate::handlers::callback::oauth_callback,
        crate::handlers::integrations::list_integrations,
        crate::handlers::integrations::get_integration,
        crate::handlers::integrations::refresh_integration,
        crate::handlers::integrations::probe_integration,
        crate::handlers::providers::list_providers,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthzResponse,
            crate::handlers::connect::ConnectResponse,
            crate::handlers::callback::CallbackOutcome,
            crate::handlers::integrations::IntegrationInfo,
            crate::handlers::integrations::IntegrationsResponse,
            crate::handlers::providers::ProviderInfo,
            crate::handlers::providers::ProvidersResponse,
            crate::health_probe::HealthReport,
            crate::lifecycle::HealthStatus,
            crate::error::ApiError,
        )
    ),
    info(
        title = "Integrations API",
        description = "API for managing OAuth integrations with cloud storage providers",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::test_state;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_root_route_is_public() {
        let (state, _audit) = test_state().await;
        let app = create_app(state);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_operator_routes_require_bearer_token() {
        let (state, _audit) = test_state().await;
        let app = create_app(state);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/integrations")
                    .header("X-Tenant-Id", uuid::Uuid::new_v4().to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_callback_route_is_public() {
        let (state, _audit) = test_state().await;
        let app = create_app(state);

        // No auth header at all; the flow itself rejects the empty request
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/oauth/callback?code=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_openapi_document_builds() {
        let doc = ApiDoc::openapi();
        let json = doc.to_json().expect("openapi serializes");
        assert!(json.contains("/connect/{provider}"));
        assert!(json.contains("/oauth/callback"));
        assert!(json.contains("bearer_auth"));
    }
}
