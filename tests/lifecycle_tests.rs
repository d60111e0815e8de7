//! End-to-end tests for the token lifecycle against a mock identity provider.

use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use mail_oauth_integration::{
    create_token_manager, ClientAssertionClaims, CredentialConfig, CredentialConfigBuilder,
    DefaultTokenLifecycleManager, ErrorCategory, InMemoryLogger, LifecycleState, TokenManager,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CERT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/client_cert.pem");
const KEY: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/client_key.pem");
const PUB: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/client_pub.pem");
const TOKEN_PATH: &str = "/contoso/oauth2/v2.0/token";

struct Setup {
    server: MockServer,
    _dir: TempDir,
    token_file: PathBuf,
}

impl Setup {
    async fn new(token: Value) -> Self {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let token_file = dir.path().join("token.json");
        std::fs::write(&token_file, token.to_string()).unwrap();
        Self {
            server,
            _dir: dir,
            token_file,
        }
    }

    fn builder(&self) -> CredentialConfigBuilder {
        CredentialConfigBuilder::new()
            .client_id("client-123")
            .tenant_id("contoso")
            .scope("https://outlook.office365.com/.default offline_access")
            .authority(self.server.uri())
            .token_file(&self.token_file)
    }

    fn secret_config(&self) -> CredentialConfig {
        self.builder().client_secret("s3cret").build().unwrap()
    }

    fn manager(&self, config: CredentialConfig) -> (DefaultTokenLifecycleManager, Arc<InMemoryLogger>) {
        let logger = Arc::new(InMemoryLogger::new());
        let manager = create_token_manager(config, logger.clone()).unwrap();
        (manager, logger)
    }

    fn saved(&self) -> Value {
        serde_json::from_str(&std::fs::read_to_string(&self.token_file).unwrap()).unwrap()
    }

    async fn request_bodies(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
            .collect()
    }
}

fn token_acquired_ago(secs: i64) -> Value {
    json!({
        "access_token": "old-access",
        "refresh_token": "old-refresh",
        "expires_in": 3600,
        "acquired_at": Utc::now().timestamp() - secs,
    })
}

fn form_value(body: &str, key: &str) -> Option<String> {
    url::form_urlencoded::parse(body.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[tokio::test]
async fn test_refresh_triggered_inside_buffer() {
    let setup = Setup::new(token_acquired_ago(3301)).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": "new-access"
        })))
        .expect(1)
        .mount(&setup.server)
        .await;

    let (manager, _) = setup.manager(setup.secret_config());
    assert!(manager.ensure_valid_token().await);
    assert_eq!(manager.access_token().await, "new-access");

    let body = &setup.request_bodies().await[0];
    assert_eq!(form_value(body, "refresh_token").as_deref(), Some("old-refresh"));
    assert_eq!(form_value(body, "client_secret").as_deref(), Some("s3cret"));
    assert_eq!(
        form_value(body, "scope").as_deref(),
        Some("https://outlook.office365.com/.default offline_access")
    );

    let saved = setup.saved();
    assert_eq!(saved["access_token"], "new-access");
    assert_eq!(saved["refresh_token"], "old-refresh");
    assert_eq!(saved["expires_in"], 3599);
}

#[tokio::test]
async fn test_no_refresh_outside_buffer() {
    let setup = Setup::new(token_acquired_ago(1800)).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&setup.server)
        .await;

    let (manager, _) = setup.manager(setup.secret_config());
    assert!(manager.ensure_valid_token().await);
    assert_eq!(manager.access_token().await, "old-access");
}

#[tokio::test]
async fn test_expired_without_refresh_token_makes_no_request() {
    let setup = Setup::new(json!({
        "access_token": "A",
        "expires_in": 3600,
        "acquired_at": Utc::now().timestamp() - 7200,
    }))
    .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&setup.server)
        .await;

    let (manager, _) = setup.manager(setup.secret_config());
    assert!(!manager.ensure_valid_token().await);
    assert_eq!(manager.state(), LifecycleState::Failed);
    assert_eq!(manager.access_token().await, "");
}

#[tokio::test]
async fn test_non_expiring_token() {
    let setup = Setup::new(json!({"access_token": "A"})).await;

    let config = CredentialConfigBuilder::new()
        .token_file(&setup.token_file)
        .authority(setup.server.uri())
        .build()
        .unwrap();
    let (manager, _) = setup.manager(config);

    assert!(manager.ensure_valid_token().await);
    assert_eq!(manager.access_token().await, "A");
    assert!(setup.request_bodies().await.is_empty());
}

#[tokio::test]
async fn test_certificate_assertion_preferred_over_secret() {
    let setup = Setup::new(token_acquired_ago(4000)).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "cert-access", "expires_in": "3600"})),
        )
        .expect(1)
        .mount(&setup.server)
        .await;

    let config = setup
        .builder()
        .client_secret("s3cret")
        .certificate(CERT, KEY)
        .build()
        .unwrap();
    let audience = config.token_endpoint();
    let (manager, _) = setup.manager(config);

    assert!(manager.ensure_valid_token().await);
    assert_eq!(manager.certificate_thumbprint(), "il6zG9cCixJE3qI_2YyQwW70cHA");

    let body = &setup.request_bodies().await[0];
    assert!(form_value(body, "client_secret").is_none());
    assert_eq!(
        form_value(body, "client_assertion_type").as_deref(),
        Some("urn:ietf:params:oauth:client-assertion-type:jwt-bearer")
    );

    let assertion = form_value(body, "client_assertion").unwrap();
    let header = decode_header(&assertion).unwrap();
    assert_eq!(header.x5t.as_deref(), Some("il6zG9cCixJE3qI_2YyQwW70cHA"));

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[audience.as_str()]);
    let key = DecodingKey::from_rsa_pem(&std::fs::read(PUB).unwrap()).unwrap();
    let claims = decode::<ClientAssertionClaims>(&assertion, &key, &validation)
        .unwrap()
        .claims;
    assert_eq!(claims.iss, "client-123");
    assert_eq!(claims.sub, "client-123");
}

#[tokio::test]
async fn test_rotated_refresh_token_is_persisted() {
    let setup = Setup::new(token_acquired_ago(4000)).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A2",
            "refresh_token": "R2",
            "expires_in": 3600
        })))
        .mount(&setup.server)
        .await;

    let (manager, _) = setup.manager(setup.secret_config());
    assert!(manager.ensure_valid_token().await);
    assert_eq!(setup.saved()["refresh_token"], "R2");
}

#[tokio::test]
async fn test_malformed_token_file() {
    let setup = Setup::new(json!({"refresh_token": "R", "expires_in": 3600})).await;

    let (manager, logger) = setup.manager(setup.secret_config());
    assert!(!manager.ensure_valid_token().await);
    assert_eq!(manager.last_error().unwrap().code, "OAUTH2_STORE_MALFORMED");
    assert!(logger.contains("Malformed token file"));
}

#[tokio::test]
async fn test_invalid_grant_is_classified_and_file_untouched() {
    let setup = Setup::new(token_acquired_ago(4000)).await;
    let before = std::fs::read_to_string(&setup.token_file).unwrap();
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "AADSTS70008: The provided authorization code or refresh token has expired.",
            "error_codes": [70008],
            "trace_id": "trace-1"
        })))
        .mount(&setup.server)
        .await;

    let (manager, logger) = setup.manager(setup.secret_config());
    assert!(!manager.ensure_valid_token().await);

    let failure = manager.last_error().unwrap();
    assert_eq!(failure.category, Some(ErrorCategory::ExpiredGrant));
    assert!(failure.needs_reauth);
    assert!(logger.contains("remediation"));
    assert_eq!(std::fs::read_to_string(&setup.token_file).unwrap(), before);
    assert_eq!(manager.access_token().await, "");
}

#[tokio::test]
async fn test_unknown_provider_error_preserves_description() {
    let setup = Setup::new(token_acquired_ago(4000)).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_description": "Something unexpected happened",
            "error": "weird_error"
        })))
        .mount(&setup.server)
        .await;

    let (manager, logger) = setup.manager(setup.secret_config());
    assert!(!manager.ensure_valid_token().await);

    assert_eq!(
        manager.last_error().unwrap().category,
        Some(ErrorCategory::UnknownProvider)
    );
    assert!(logger.contains("Error description: Something unexpected happened"));
}

#[tokio::test]
async fn test_round_trip_through_refresh_and_reload() {
    let setup = Setup::new(token_acquired_ago(4000)).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A2",
            "refresh_token": "R2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&setup.server)
        .await;

    let (first, _) = setup.manager(setup.secret_config());
    assert!(first.ensure_valid_token().await);
    let expires_at = first.token_status().await.unwrap().expires_at.unwrap();

    let (second, _) = setup.manager(setup.secret_config());
    let reloaded = second.token_status().await.unwrap();
    assert!((reloaded.expires_at.unwrap() - expires_at).num_seconds().abs() <= 1);
    assert!(second.ensure_valid_token().await);
    assert_eq!(second.access_token().await, "A2");
}

#[tokio::test]
async fn test_unrepresentable_expires_in_in_token_file() {
    let setup = Setup::new(json!({
        "access_token": "A",
        "refresh_token": "R",
        "expires_in": i64::MAX,
        "acquired_at": 1_700_000_000,
    }))
    .await;

    let (manager, _) = setup.manager(setup.secret_config());
    assert!(!manager.ensure_valid_token().await);
    assert_eq!(manager.last_error().unwrap().code, "OAUTH2_STORE_MALFORMED");
    assert!(setup.request_bodies().await.is_empty());
}

#[tokio::test]
async fn test_unrepresentable_expires_in_in_response() {
    let setup = Setup::new(token_acquired_ago(4000)).await;
    let before = std::fs::read_to_string(&setup.token_file).unwrap();
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A2",
            "refresh_token": "R2",
            "expires_in": 100_000_000_000_000u64
        })))
        .expect(1)
        .mount(&setup.server)
        .await;

    let (manager, _) = setup.manager(setup.secret_config());
    assert!(!manager.ensure_valid_token().await);
    assert_eq!(manager.state(), LifecycleState::Failed);
    assert_eq!(manager.last_error().unwrap().code, "OAUTH2_PARSE");
    assert_eq!(std::fs::read_to_string(&setup.token_file).unwrap(), before);
}

#[tokio::test]
async fn test_numeric_strings_in_token_file() {
    let setup = Setup::new(json!({
        "access_token": "A",
        "refresh_token": "R",
        "expires_in": "3600",
        "acquired_at": (Utc::now().timestamp() - 60).to_string(),
    }))
    .await;

    let (manager, _) = setup.manager(setup.secret_config());
    assert!(manager.ensure_valid_token().await);
    assert_eq!(manager.access_token().await, "A");
    assert!(setup.request_bodies().await.is_empty());
}

#[tokio::test]
async fn test_null_error_codes_keep_provider_error() {
    let setup = Setup::new(token_acquired_ago(4000)).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "expired",
            "error_codes": null
        })))
        .mount(&setup.server)
        .await;

    let (manager, logger) = setup.manager(setup.secret_config());
    assert!(!manager.ensure_valid_token().await);

    let failure = manager.last_error().unwrap();
    assert_eq!(failure.category, Some(ErrorCategory::ExpiredGrant));
    assert!(failure.needs_reauth);
    assert!(logger.contains("Error description: expired"));
}
