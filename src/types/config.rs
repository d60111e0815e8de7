//! Configuration Types
//!
//! Read-only credential configuration for the refresh flow.

use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigurationError;

/// Default Azure AD authority host.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Default HTTP timeout for the token endpoint.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Credential configuration.
///
/// Exactly one trust mechanism is expected; when both a certificate pair and a
/// client secret are present, the certificate wins.
#[derive(Clone)]
pub struct CredentialConfig {
    /// Application (client) ID.
    pub client_id: String,
    /// Directory (tenant) ID or domain.
    pub tenant_id: String,
    /// Space-separated scopes sent with the refresh request.
    pub scope: Option<String>,
    /// Persisted token file.
    pub token_file: PathBuf,
    /// PEM certificate registered with the app.
    pub certificate_path: Option<PathBuf>,
    /// PEM private key matching the certificate.
    pub private_key_path: Option<PathBuf>,
    /// Client secret (fallback trust mechanism).
    pub client_secret: Option<SecretString>,
    /// Authority host the tenant path is appended to.
    pub authority: String,
    /// HTTP timeout.
    pub timeout: Duration,
}

impl CredentialConfig {
    /// Token endpoint URL, also used as the assertion audience.
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// Trust mechanism used for refresh, if any is configured.
    pub fn trust_mechanism(&self) -> Option<TrustMechanism<'_>> {
        if let (Some(certificate_path), Some(private_key_path)) =
            (&self.certificate_path, &self.private_key_path)
        {
            return Some(TrustMechanism::Certificate {
                certificate_path,
                private_key_path,
            });
        }

        self.client_secret.as_ref().map(TrustMechanism::ClientSecret)
    }

    /// Check the settings a refresh request cannot do without.
    pub fn validate_for_refresh(&self) -> Result<(), ConfigurationError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigurationError::MissingRequired {
                field: "client_id".to_string(),
            });
        }
        if self.tenant_id.trim().is_empty() {
            return Err(ConfigurationError::MissingRequired {
                field: "tenant_id".to_string(),
            });
        }
        if self.trust_mechanism().is_none() {
            return Err(ConfigurationError::NoTrustMechanism);
        }
        Ok(())
    }
}

impl std::fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .field("scope", &self.scope)
            .field("token_file", &self.token_file)
            .field("certificate_path", &self.certificate_path)
            .field("private_key_path", &self.private_key_path)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("authority", &self.authority)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Configured trust mechanism.
#[derive(Clone, Copy)]
pub enum TrustMechanism<'a> {
    /// Certificate-bound signed assertion.
    Certificate {
        certificate_path: &'a Path,
        private_key_path: &'a Path,
    },
    /// Shared client secret.
    ClientSecret(&'a SecretString),
}

impl TrustMechanism<'_> {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Certificate { .. } => "certificate",
            Self::ClientSecret(_) => "client_secret",
        }
    }
}

impl std::fmt::Debug for TrustMechanism<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Certificate {
                certificate_path,
                private_key_path,
            } => f
                .debug_struct("Certificate")
                .field("certificate_path", certificate_path)
                .field("private_key_path", private_key_path)
                .finish(),
            Self::ClientSecret(_) => f.write_str("ClientSecret([REDACTED])"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> CredentialConfig {
        CredentialConfig {
            client_id: "client-123".to_string(),
            tenant_id: "contoso.onmicrosoft.com".to_string(),
            scope: None,
            token_file: PathBuf::from("token.json"),
            certificate_path: None,
            private_key_path: None,
            client_secret: None,
            authority: DEFAULT_AUTHORITY.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[test]
    fn test_token_endpoint() {
        let mut config = base_config();
        assert_eq!(
            config.token_endpoint(),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/token"
        );

        config.authority = "http://127.0.0.1:8080/".to_string();
        assert_eq!(
            config.token_endpoint(),
            "http://127.0.0.1:8080/contoso.onmicrosoft.com/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_certificate_takes_precedence() {
        let mut config = base_config();
        config.client_secret = Some(SecretString::new("secret".to_string()));
        assert_eq!(config.trust_mechanism().unwrap().as_str(), "client_secret");

        config.certificate_path = Some(PathBuf::from("cert.pem"));
        assert_eq!(config.trust_mechanism().unwrap().as_str(), "client_secret");

        config.private_key_path = Some(PathBuf::from("key.pem"));
        assert_eq!(config.trust_mechanism().unwrap().as_str(), "certificate");
    }

    #[test]
    fn test_validate_for_refresh() {
        let mut config = base_config();
        assert!(matches!(
            config.validate_for_refresh(),
            Err(ConfigurationError::NoTrustMechanism)
        ));

        config.client_secret = Some(SecretString::new("secret".to_string()));
        assert!(config.validate_for_refresh().is_ok());

        config.tenant_id = String::new();
        assert!(matches!(
            config.validate_for_refresh(),
            Err(ConfigurationError::MissingRequired { field }) if field == "tenant_id"
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let mut config = base_config();
        config.client_secret = Some(SecretString::new("super-secret".to_string()));
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
