//! End-to-end smoke tests over HTTP
//!
//! Drives the full lifecycle against a spawned server and a mocked provider:
//! connect, callback, list, probe, refresh. Also covers the operator
//! authentication boundary.

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{insert_provider, setup_test_db, spawn_test_app, test_config};

#[tokio::test]
async fn test_full_lifecycle_over_http() -> Result<()> {
    let provider_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "issued_access_token",
            "refresh_token": "issued_refresh_token",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "read:files"
        })))
        .mount(&provider_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&provider_server)
        .await;

    let db = setup_test_db().await?;
    insert_provider(&db, "example", &provider_server.uri()).await?;
    let (url, _state, _audit, handle) = spawn_test_app(db, test_config()).await?;

    let tenant_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let client = reqwest::Client::new();

    // 1. Initiate the flow
    let response = client
        .post(format!("{}/connect/example", url))
        .header("Authorization", "Bearer test-token")
        .header("X-Tenant-Id", tenant_id.to_string())
        .header("X-User-Id", user_id.to_string())
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    let integration_id = body["integration_id"].as_str().context("integration_id")?;
    let authorize_url = Url::parse(body["authorize_url"].as_str().context("authorize_url")?)?;

    let state_param = authorize_url
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .context("authorize_url carries a state parameter")?;

    // 2. Provider redirects back with a code
    let response = client
        .get(format!(
            "{}/oauth/callback?code=e2e_code&state={}",
            url, state_param
        ))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["ok"], true);
    assert_eq!(body["integration_id"], integration_id);

    // 3. The linked integration shows up, without any token material
    let response = client
        .get(format!("{}/integrations", url))
        .header("Authorization", "Bearer test-token")
        .header("X-Tenant-Id", tenant_id.to_string())
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let raw = response.text().await?;
    assert!(!raw.contains("issued_access_token"));
    assert!(!raw.contains("ciphertext"));
    let body: Value = serde_json::from_str(&raw)?;
    let listed = &body["integrations"][0];
    assert_eq!(listed["id"], integration_id);
    assert_eq!(listed["provider"], "example");
    assert_eq!(listed["status"], "active");
    assert_eq!(listed["has_credential"], true);
    assert_eq!(listed["health_status"], "healthy");
    assert_eq!(listed["scopes_granted"], serde_json::json!(["read:files"]));

    // 4. On-demand probe
    let response = client
        .post(format!("{}/integrations/{}/probe", url, integration_id))
        .header("Authorization", "Bearer test-token")
        .header("X-Tenant-Id", tenant_id.to_string())
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["integration_id"], integration_id);
    assert_eq!(body["status"], "healthy");

    // 5. On-demand refresh
    let response = client
        .post(format!("{}/integrations/{}/refresh", url, integration_id))
        .header("Authorization", "Bearer test-token")
        .header("X-Tenant-Id", tenant_id.to_string())
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["status"], "active");
    assert!(body["version"].as_i64().context("version")? >= 3);

    handle.shutdown().await
}

#[tokio::test]
async fn test_operator_surface_requires_bearer_token() -> Result<()> {
    let db = setup_test_db().await?;
    let (url, _state, _audit, handle) = spawn_test_app(db, test_config()).await?;
    let client = reqwest::Client::new();

    let response = client.get(format!("{}/integrations", url)).send().await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(format!("{}/integrations", url))
        .header("Authorization", "Bearer wrong-token")
        .header("X-Tenant-Id", Uuid::new_v4().to_string())
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Liveness stays public
    let response = client.get(format!("{}/healthz", url)).send().await?;
    assert_eq!(response.status(), StatusCode::OK);

    handle.shutdown().await
}
