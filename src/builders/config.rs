//! Configuration Builder
//!
//! Fluent builder for the credential configuration, with an environment
//! loader for deployments.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigurationError, OAuth2Error};
use crate::types::{CredentialConfig, DEFAULT_AUTHORITY, DEFAULT_TIMEOUT};
use secrecy::SecretString;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "PENS_OAUTH_";

/// Credential configuration builder.
#[derive(Default)]
pub struct CredentialConfigBuilder {
    client_id: Option<String>,
    tenant_id: Option<String>,
    scope: Option<String>,
    token_file: Option<PathBuf>,
    certificate_path: Option<PathBuf>,
    private_key_path: Option<PathBuf>,
    client_secret: Option<SecretString>,
    authority: Option<String>,
    timeout: Option<Duration>,
}

impl CredentialConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a builder from `PENS_OAUTH_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Seed a builder from an arbitrary variable lookup. Empty values count
    /// as absent.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |suffix: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, suffix))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            client_id: get("CLIENT_ID"),
            tenant_id: get("TENANT_ID"),
            scope: get("SCOPE"),
            token_file: get("TOKEN_FILE").map(PathBuf::from),
            certificate_path: get("CERTIFICATE_PATH").map(PathBuf::from),
            private_key_path: get("PRIVATE_KEY_PATH").map(PathBuf::from),
            client_secret: get("CLIENT_SECRET").map(SecretString::new),
            authority: get("AUTHORITY"),
            timeout: get("TIMEOUT_SECS")
                .and_then(|secs| secs.parse::<u64>().ok())
                .map(Duration::from_secs),
        }
    }

    /// Set client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set tenant ID.
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Set refresh scope.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Set token file path.
    pub fn token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    /// Set certificate and private key paths.
    pub fn certificate(
        mut self,
        certificate_path: impl Into<PathBuf>,
        private_key_path: impl Into<PathBuf>,
    ) -> Self {
        self.certificate_path = Some(certificate_path.into());
        self.private_key_path = Some(private_key_path.into());
        self
    }

    /// Set client secret.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    /// Set authority host.
    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the credential configuration.
    ///
    /// Client id, tenant and trust mechanism are checked when a refresh is
    /// actually needed, not here.
    pub fn build(self) -> Result<CredentialConfig, OAuth2Error> {
        let token_file = self.token_file.ok_or_else(|| {
            OAuth2Error::Configuration(ConfigurationError::MissingRequired {
                field: "token_file".to_string(),
            })
        })?;

        let authority = self
            .authority
            .unwrap_or_else(|| DEFAULT_AUTHORITY.to_string());
        let parsed = url::Url::parse(&authority).map_err(|_| {
            OAuth2Error::Configuration(ConfigurationError::InvalidEndpoint {
                url: authority.clone(),
            })
        })?;
        if !matches!(parsed.scheme(), "https" | "http") {
            return Err(OAuth2Error::Configuration(ConfigurationError::InvalidEndpoint {
                url: authority,
            }));
        }

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(OAuth2Error::Configuration(ConfigurationError::InvalidConfig {
                message: "timeout must be greater than zero".to_string(),
            }));
        }

        Ok(CredentialConfig {
            client_id: self.client_id.unwrap_or_default(),
            tenant_id: self.tenant_id.unwrap_or_default(),
            scope: self.scope,
            token_file,
            certificate_path: self.certificate_path,
            private_key_path: self.private_key_path,
            client_secret: self.client_secret,
            authority,
            timeout,
        })
    }
}

impl CredentialConfig {
    /// Load configuration from `PENS_OAUTH_*` environment variables.
    pub fn from_env() -> Result<Self, OAuth2Error> {
        CredentialConfigBuilder::from_env().build()
    }
}

/// Create a new credential configuration builder.
pub fn credential_config() -> CredentialConfigBuilder {
    CredentialConfigBuilder::new()
}
