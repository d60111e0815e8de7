//! Credential Strategies
//!
//! Interchangeable producers of the authentication parameters for a
//! refresh-token grant.

pub mod certificate;
pub mod secret;

pub use certificate::CertificateCredential;
pub use secret::SecretCredential;

use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex};

use crate::core::AssertionSigner;
use crate::error::{ConfigurationError, OAuth2Error, OAuth2Result};
use crate::types::{CredentialConfig, TrustMechanism};

/// Form parameters whose values may never be logged.
const SENSITIVE_PARAMS: &[&str] = &["refresh_token", "client_secret", "client_assertion"];

/// Ordered form body for the token endpoint.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct FormParams {
    params: Vec<(String, String)>,
}

impl FormParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base parameters of a refresh-token grant.
    pub fn refresh_grant(client_id: &str, refresh_token: &SecretString) -> Self {
        let mut params = Self::new();
        params.push("client_id", client_id);
        params.push("grant_type", "refresh_token");
        params.push("refresh_token", refresh_token.expose_secret());
        params
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.push((key.into(), value.into()));
    }

    /// Append `scope` when one is configured.
    pub fn push_scope(&mut self, scope: Option<&str>) {
        if let Some(scope) = scope.filter(|s| !s.trim().is_empty()) {
            self.push("scope", scope);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.params.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// `application/x-www-form-urlencoded` body.
    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish()
    }
}

impl std::fmt::Debug for FormParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_map();
        for (key, value) in &self.params {
            if SENSITIVE_PARAMS.contains(&key.as_str()) {
                list.entry(key, &"[REDACTED]");
            } else {
                list.entry(key, value);
            }
        }
        list.finish()
    }
}

/// Produces refresh-grant parameters for one trust mechanism.
pub trait CredentialStrategy: Send + Sync {
    /// Strategy name for diagnostics.
    fn name(&self) -> &'static str;

    /// Build the form body for exchanging `refresh_token`.
    fn refresh_params(&self, refresh_token: &SecretString) -> OAuth2Result<FormParams>;
}

/// Pick the strategy for `config`.
///
/// The certificate strategy wins whenever both certificate paths are set.
pub fn select_strategy(
    config: &CredentialConfig,
    signer: Arc<dyn AssertionSigner>,
) -> OAuth2Result<Box<dyn CredentialStrategy>> {
    config.validate_for_refresh()?;

    match config.trust_mechanism() {
        Some(TrustMechanism::Certificate {
            certificate_path,
            private_key_path,
        }) => Ok(Box::new(CertificateCredential::new(
            config.client_id.clone(),
            config.token_endpoint(),
            certificate_path.to_path_buf(),
            private_key_path.to_path_buf(),
            config.scope.clone(),
            signer,
        ))),
        Some(TrustMechanism::ClientSecret(secret)) => Ok(Box::new(SecretCredential::new(
            config.client_id.clone(),
            secret.clone(),
            config.scope.clone(),
        ))),
        None => Err(OAuth2Error::Configuration(ConfigurationError::NoTrustMechanism)),
    }
}

/// Mock strategy for testing.
pub struct MockCredentialStrategy {
    next_error: Mutex<Option<OAuth2Error>>,
    call_count: Mutex<usize>,
}

impl MockCredentialStrategy {
    pub fn new() -> Self {
        Self {
            next_error: Mutex::new(None),
            call_count: Mutex::new(0),
        }
    }

    pub fn set_next_error(&self, error: OAuth2Error) -> &Self {
        *self.next_error.lock().unwrap() = Some(error);
        self
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

impl Default for MockCredentialStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStrategy for MockCredentialStrategy {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn refresh_params(&self, refresh_token: &SecretString) -> OAuth2Result<FormParams> {
        *self.call_count.lock().unwrap() += 1;
        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(FormParams::refresh_grant("mock-client", refresh_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::CredentialConfigBuilder;
    use crate::core::MockAssertionSigner;

    fn signer() -> Arc<dyn AssertionSigner> {
        Arc::new(MockAssertionSigner::new("header.payload.signature"))
    }

    #[test]
    fn test_form_encoding() {
        let mut params = FormParams::new();
        params.push("scope", "https://outlook.office365.com/.default offline_access");
        params.push("refresh_token", "a+b/c=");
        assert_eq!(
            params.encode(),
            "scope=https%3A%2F%2Foutlook.office365.com%2F.default+offline_access&refresh_token=a%2Bb%2Fc%3D"
        );
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let mut params = FormParams::refresh_grant("client", &SecretString::new("rt-123".into()));
        params.push("client_secret", "shh");
        let debug = format!("{:?}", params);
        assert!(!debug.contains("rt-123"));
        assert!(!debug.contains("shh"));
        assert!(debug.contains("client"));
    }

    #[test]
    fn test_select_certificate_over_secret() {
        let config = CredentialConfigBuilder::new()
            .client_id("client")
            .tenant_id("contoso")
            .token_file("token.json")
            .client_secret("secret")
            .certificate("cert.pem", "key.pem")
            .build()
            .unwrap();

        let strategy = select_strategy(&config, signer()).unwrap();
        assert_eq!(strategy.name(), "certificate");

        let params = strategy
            .refresh_params(&SecretString::new("rt".into()))
            .unwrap();
        assert!(params.contains("client_assertion"));
        assert!(!params.contains("client_secret"));
    }

    #[test]
    fn test_select_secret_fallback() {
        let mut config = CredentialConfigBuilder::new()
            .client_id("client")
            .tenant_id("contoso")
            .token_file("token.json")
            .client_secret("secret")
            .build()
            .unwrap();
        config.certificate_path = Some("cert.pem".into());

        assert_eq!(select_strategy(&config, signer()).unwrap().name(), "client_secret");
    }

    #[test]
    fn test_select_without_trust_mechanism() {
        let config = CredentialConfigBuilder::new()
            .client_id("client")
            .tenant_id("contoso")
            .token_file("token.json")
            .build()
            .unwrap();

        assert!(matches!(
            select_strategy(&config, signer()),
            Err(OAuth2Error::Configuration(ConfigurationError::NoTrustMechanism))
        ));
    }
}
