//! Certificate assertion strategy.

use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;

use super::{CredentialStrategy, FormParams};
use crate::core::{AssertionSigner, JWT_BEARER_ASSERTION_TYPE};
use crate::error::{ConfigurationError, OAuth2Error, OAuth2Result};

/// Authenticates the refresh request with a freshly signed client assertion.
pub struct CertificateCredential {
    client_id: String,
    audience: String,
    certificate_path: PathBuf,
    private_key_path: PathBuf,
    scope: Option<String>,
    signer: Arc<dyn AssertionSigner>,
}

impl CertificateCredential {
    /// `audience` is the token endpoint URL.
    pub fn new(
        client_id: String,
        audience: String,
        certificate_path: PathBuf,
        private_key_path: PathBuf,
        scope: Option<String>,
        signer: Arc<dyn AssertionSigner>,
    ) -> Self {
        Self {
            client_id,
            audience,
            certificate_path,
            private_key_path,
            scope,
            signer,
        }
    }
}

impl CredentialStrategy for CertificateCredential {
    fn name(&self) -> &'static str {
        "certificate"
    }

    fn refresh_params(&self, refresh_token: &SecretString) -> OAuth2Result<FormParams> {
        let assertion = self
            .signer
            .sign(
                &self.client_id,
                &self.audience,
                &self.certificate_path,
                &self.private_key_path,
            )
            .map_err(|source| {
                OAuth2Error::Configuration(ConfigurationError::AssertionUnavailable { source })
            })?;

        let mut params = FormParams::refresh_grant(&self.client_id, refresh_token);
        params.push("client_assertion_type", JWT_BEARER_ASSERTION_TYPE);
        params.push("client_assertion", assertion);
        params.push_scope(self.scope.as_deref());
        Ok(params)
    }
}
