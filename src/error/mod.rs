//! OAuth2 Error Types
//!
//! Error hierarchy for the refresh-token lifecycle, plus provider error
//! parsing and classification.

pub mod classification;

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub use classification::{classify, lookup_rule, Classification, ClassificationRule, ErrorCategory};

/// Root error type for the token lifecycle.
#[derive(Error, Debug)]
pub enum OAuth2Error {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Token store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),
}

impl OAuth2Error {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "OAUTH2_CONFIG",
            Self::Storage(StorageError::Malformed { .. }) => "OAUTH2_STORE_MALFORMED",
            Self::Storage(_) => "OAUTH2_STORE",
            Self::Signing(_) => "OAUTH2_SIGNING",
            Self::Endpoint(_) => "OAUTH2_ENDPOINT",
            Self::Protocol(_) => "OAUTH2_PARSE",
            Self::Network(_) => "OAUTH2_NETWORK",
            Self::Token(TokenError::ExpiredGrant) => "OAUTH2_EXPIRED_GRANT",
            Self::Token(_) => "OAUTH2_TOKEN",
        }
    }

    /// Check if error requires a fresh interactive sign-in.
    pub fn needs_reauth(&self) -> bool {
        match self {
            Self::Token(TokenError::ExpiredGrant) => true,
            Self::Token(TokenError::MissingAccessToken) => true,
            Self::Endpoint(e) => matches!(
                e.classify().category,
                ErrorCategory::ExpiredGrant | ErrorCategory::ReauthRequired
            ),
            _ => false,
        }
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid authority URL: {url}")]
    InvalidEndpoint { url: String },

    #[error("Neither a certificate/private key pair nor a client secret is configured")]
    NoTrustMechanism,

    #[error("Client assertion could not be produced: {source}")]
    AssertionUnavailable {
        #[source]
        source: SigningError,
    },
}

/// Token file error.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Token file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read token file {}: {message}", .path.display())]
    ReadFailed { path: PathBuf, message: String },

    #[error("Malformed token file {}: {message}", .path.display())]
    Malformed { path: PathBuf, message: String },

    #[error("Failed to write token file {}: {message}", .path.display())]
    WriteFailed { path: PathBuf, message: String },
}

/// Client assertion signing error.
#[derive(Error, Debug, Clone)]
pub enum SigningError {
    #[error("Cannot read certificate {}: {message}", .path.display())]
    CertificateUnreadable { path: PathBuf, message: String },

    #[error("Invalid certificate {}: {message}", .path.display())]
    CertificateInvalid { path: PathBuf, message: String },

    #[error("Cannot read private key {}: {message}", .path.display())]
    PrivateKeyUnreadable { path: PathBuf, message: String },

    #[error("Invalid private key {}: {message}", .path.display())]
    PrivateKeyInvalid { path: PathBuf, message: String },

    #[error("Signing failed: {message}")]
    SigningFailed { message: String },
}

/// Non-2xx answer from the token endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "token endpoint returned HTTP {http_status} ({})",
    .code.as_deref().unwrap_or("no error code")
)]
pub struct EndpointError {
    /// OAuth2 `error` value.
    pub code: Option<String>,
    /// OAuth2 `error_description` value.
    pub description: Option<String>,
    /// HTTP status code.
    pub http_status: u16,
    /// Azure AD numeric `error_codes` (AADSTS numbers).
    pub error_codes: Vec<u64>,
    /// Provider trace id, when supplied.
    pub trace_id: Option<String>,
    /// Raw body excerpt, kept when the body carried no description.
    pub raw_body: Option<String>,
}

impl EndpointError {
    /// Classify this error for diagnostics.
    pub fn classify(&self) -> Classification {
        classify(self)
    }
}

/// Response parsing error.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Unexpected redirect to: {location}")]
    UnexpectedRedirect { location: String },

    #[error("Response too large: {size} bytes")]
    ResponseTooLarge { size: usize },
}

/// Network/transport error.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("HTTP client could not be built: {message}")]
    ClientBuild { message: String },
}

/// Token state error.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Access token missing from token file")]
    MissingAccessToken,

    #[error("Access token expired and no refresh token is available")]
    ExpiredGrant,

    #[error("No refresh token is available to renew the access token")]
    NoRefreshToken,
}

/// Result type for token lifecycle operations.
pub type OAuth2Result<T> = Result<T, OAuth2Error>;

/// OAuth2 error response from provider.
///
/// Every field is optional and read independently, so one oddly typed
/// field never hides the others.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuth2ErrorResponse {
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub error_codes: Vec<u64>,
    pub trace_id: Option<String>,
}

const RAW_BODY_EXCERPT: usize = 512;

/// Parse error response from HTTP body.
///
/// Returns `None` unless the body is a JSON object.
pub fn parse_error_response(body: &str) -> Option<OAuth2ErrorResponse> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    let text = |key: &str| {
        object
            .get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    };

    let error_codes = match object.get("error_codes") {
        Some(serde_json::Value::Array(codes)) => codes
            .iter()
            .filter_map(|code| match code {
                serde_json::Value::Number(n) => n.as_u64(),
                serde_json::Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    Some(OAuth2ErrorResponse {
        error: text("error"),
        error_description: text("error_description"),
        error_codes,
        trace_id: text("trace_id"),
    })
}

/// Create error from a non-2xx HTTP response.
pub fn create_error_from_response(status: u16, body: &str) -> EndpointError {
    let parsed = parse_error_response(body).unwrap_or_default();
    let raw_body = if parsed.error_description.is_none() && !body.trim().is_empty() {
        Some(body.chars().take(RAW_BODY_EXCERPT).collect())
    } else {
        None
    };

    EndpointError {
        code: parsed.error,
        description: parsed.error_description,
        http_status: status,
        error_codes: parsed.error_codes,
        trace_id: parsed.trace_id,
        raw_body,
    }
}
