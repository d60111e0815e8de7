//! Client Assertion Signing
//!
//! Certificate-bound RS256 client assertions (RFC 7523) with an `x5t`
//! thumbprint header so the issuer can locate the registered public key.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::SigningError;

/// Assertion lifetime; the issuer rejects assertions valid for longer.
pub const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// `client_assertion_type` value for JWT bearer assertions.
pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Client assertion payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAssertionClaims {
    /// Token endpoint URL.
    pub aud: String,
    pub iss: String,
    pub sub: String,
    /// Unique per assertion.
    pub jti: String,
    pub nbf: i64,
    pub exp: i64,
}

impl ClientAssertionClaims {
    /// Claims for `client_id` issued at `now` (epoch seconds).
    pub fn new(client_id: &str, audience: &str, now: i64) -> Self {
        Self {
            aud: audience.to_string(),
            iss: client_id.to_string(),
            sub: client_id.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            nbf: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        }
    }
}

/// Produces signed client assertions.
pub trait AssertionSigner: Send + Sync {
    /// base64url(SHA-1(DER(certificate))).
    fn thumbprint(&self, certificate_path: &Path) -> Result<String, SigningError>;

    /// Signed compact JWT for the refresh request.
    fn sign(
        &self,
        client_id: &str,
        audience: &str,
        certificate_path: &Path,
        private_key_path: &Path,
    ) -> Result<String, SigningError>;
}

/// RSA-SHA256 signer reading PEM files from disk on each call.
#[derive(Debug, Default, Clone, Copy)]
pub struct RsaAssertionSigner;

impl RsaAssertionSigner {
    pub fn new() -> Self {
        Self
    }
}

impl AssertionSigner for RsaAssertionSigner {
    fn thumbprint(&self, certificate_path: &Path) -> Result<String, SigningError> {
        let pem = std::fs::read(certificate_path).map_err(|e| {
            SigningError::CertificateUnreadable {
                path: certificate_path.to_path_buf(),
                message: e.to_string(),
            }
        })?;
        certificate_thumbprint_from_pem(&pem).map_err(|message| {
            SigningError::CertificateInvalid {
                path: certificate_path.to_path_buf(),
                message,
            }
        })
    }

    fn sign(
        &self,
        client_id: &str,
        audience: &str,
        certificate_path: &Path,
        private_key_path: &Path,
    ) -> Result<String, SigningError> {
        let thumbprint = self.thumbprint(certificate_path)?;

        let key_pem = std::fs::read(private_key_path).map_err(|e| {
            SigningError::PrivateKeyUnreadable {
                path: private_key_path.to_path_buf(),
                message: e.to_string(),
            }
        })?;
        let key = EncodingKey::from_rsa_pem(&key_pem).map_err(|e| {
            SigningError::PrivateKeyInvalid {
                path: private_key_path.to_path_buf(),
                message: e.to_string(),
            }
        })?;

        let mut header = Header::new(Algorithm::RS256);
        header.x5t = Some(thumbprint);

        let claims = ClientAssertionClaims::new(client_id, audience, chrono::Utc::now().timestamp());

        encode(&header, &claims, &key).map_err(|e| SigningError::SigningFailed {
            message: e.to_string(),
        })
    }
}

/// Thumbprint of the first certificate in a PEM bundle.
pub fn certificate_thumbprint_from_pem(pem: &[u8]) -> Result<String, String> {
    let mut reader = pem;
    let der = rustls_pemfile::certs(&mut reader)
        .next()
        .ok_or_else(|| "no CERTIFICATE block found".to_string())?
        .map_err(|e| e.to_string())?;

    let digest = ring::digest::digest(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY, der.as_ref());
    Ok(URL_SAFE_NO_PAD.encode(digest.as_ref()))
}

/// Recorded `sign` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignCall {
    pub client_id: String,
    pub audience: String,
    pub certificate_path: PathBuf,
    pub private_key_path: PathBuf,
}

/// Mock signer for testing.
pub struct MockAssertionSigner {
    assertion: String,
    thumbprint: String,
    next_error: Mutex<Option<SigningError>>,
    sign_history: Mutex<Vec<SignCall>>,
}

impl MockAssertionSigner {
    pub fn new(assertion: impl Into<String>) -> Self {
        Self {
            assertion: assertion.into(),
            thumbprint: "mock-thumbprint".to_string(),
            next_error: Mutex::new(None),
            sign_history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_thumbprint(mut self, thumbprint: impl Into<String>) -> Self {
        self.thumbprint = thumbprint.into();
        self
    }

    /// Fail the next call with `error`.
    pub fn set_next_error(&self, error: SigningError) {
        *self.next_error.lock().unwrap() = Some(error);
    }

    pub fn get_sign_history(&self) -> Vec<SignCall> {
        self.sign_history.lock().unwrap().clone()
    }
}

impl Default for MockAssertionSigner {
    fn default() -> Self {
        Self::new("mock.client.assertion")
    }
}

impl AssertionSigner for MockAssertionSigner {
    fn thumbprint(&self, _certificate_path: &Path) -> Result<String, SigningError> {
        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.thumbprint.clone())
    }

    fn sign(
        &self,
        client_id: &str,
        audience: &str,
        certificate_path: &Path,
        private_key_path: &Path,
    ) -> Result<String, SigningError> {
        self.sign_history.lock().unwrap().push(SignCall {
            client_id: client_id.to_string(),
            audience: audience.to_string(),
            certificate_path: certificate_path.to_path_buf(),
            private_key_path: private_key_path.to_path_buf(),
        });
        if let Some(error) = self.next_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.assertion.clone())
    }
}
