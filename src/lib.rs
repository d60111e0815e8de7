//! Mail OAuth2 Token Lifecycle
//!
//! Keeps a long-lived delegated mail credential usable without user
//! interaction: the persisted access token is checked before every mail
//! protocol session and renewed through the OAuth2 refresh-token grant when
//! it is about to expire.
//!
//! # Features
//!
//! - Refresh-token grant (RFC 6749 Section 6) against Azure AD v2.0 endpoints
//! - Client secret or certificate-bound JWT client assertion (RFC 7523)
//! - Crash-consistent token file persistence
//! - Provider error classification with remediation hints
//! - XOAUTH2 SASL initial responses for IMAP/SMTP
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mail_oauth_integration::{
//!     create_token_manager, credential_config, xoauth2_sasl, TokenManager, TracingLogger,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = credential_config()
//!         .client_id("00000000-0000-0000-0000-000000000000")
//!         .tenant_id("contoso.onmicrosoft.com")
//!         .scope("https://outlook.office365.com/.default offline_access")
//!         .token_file("/var/lib/pens/token.json")
//!         .certificate("/etc/pens/cert.pem", "/etc/pens/key.pem")
//!         .build()?;
//!
//!     let manager = create_token_manager(config, Arc::new(TracingLogger::new()))?;
//!
//!     if manager.ensure_valid_token().await {
//!         let token = manager.access_token().await;
//!         let initial_response = xoauth2_sasl("monitor@contoso.com", &token);
//!         // AUTHENTICATE XOAUTH2 <initial_response>
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: credential configuration and token records
//! - `error`: error hierarchy and provider error classification
//! - `core`: HTTP transport and client assertion signing
//! - `credentials`: client secret and certificate refresh strategies
//! - `token`: token store, endpoint client, lifecycle manager, poller
//! - `builders`: fluent configuration builder
//! - `telemetry`: injected diagnostics sink
//! - `xoauth2`: SASL encoding for mail clients

pub mod builders;
pub mod core;
pub mod credentials;
pub mod error;
pub mod telemetry;
pub mod token;
pub mod types;
pub mod xoauth2;

// Re-export builders
pub use builders::{credential_config, CredentialConfigBuilder};

// Re-export errors
pub use error::{
    classify, create_error_from_response, parse_error_response, Classification,
    ConfigurationError, EndpointError, ErrorCategory, NetworkError, OAuth2Error,
    OAuth2ErrorResponse, OAuth2Result, ProtocolError, SigningError, StorageError, TokenError,
};

// Re-export types
pub use types::{
    CredentialConfig, RefreshedToken, TokenFile, TokenRecord, TokenResponse, TokenStatus,
    TrustMechanism,
};

// Re-export core components
pub use crate::core::{
    // Transport
    HttpRequest, HttpResponse, HttpTransport, MockHttpTransport, ReqwestHttpTransport,
    // Assertion
    AssertionSigner, ClientAssertionClaims, MockAssertionSigner, RsaAssertionSigner,
    ASSERTION_LIFETIME_SECS, JWT_BEARER_ASSERTION_TYPE,
};

// Re-export credential strategies
pub use credentials::{
    select_strategy, CertificateCredential, CredentialStrategy, FormParams, SecretCredential,
};

// Re-export token management
pub use token::{
    // Storage
    FileTokenStore, MockTokenStore, TokenStore,
    // Endpoint
    DefaultTokenEndpointClient, MockTokenEndpointClient, TokenEndpointClient,
    // Manager
    create_token_manager, DefaultTokenLifecycleManager, LastFailure, LifecycleState,
    MockTokenManager, TokenLifecycleManager, TokenManager,
    // Poller
    PollerStats, RefreshPoller,
};

// Re-export telemetry
pub use telemetry::{
    create_tracing_logger, InMemoryLogger, LogContext, LogEntry, LogLevel, Logger, TracingLogger,
};

// Re-export XOAUTH2
pub use xoauth2::{xoauth2_initial_response, xoauth2_sasl, BearerTokenSource};
