//! Token Lifecycle Manager
//!
//! Loads the persisted token lazily, decides when it needs renewing, drives a
//! credential strategy through the token endpoint, and persists the result.
//!
//! All state mutation happens under one async mutex that is held across the
//! whole check-and-refresh, so concurrent callers never race two refreshes
//! against the same (possibly single-use) refresh token.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::core::{AssertionSigner, ReqwestHttpTransport, RsaAssertionSigner};
use crate::credentials::select_strategy;
use crate::error::{ErrorCategory, OAuth2Error, OAuth2Result, ProtocolError, TokenError};
use crate::telemetry::{LogContext, Logger};
use crate::token::{
    DefaultTokenEndpointClient, FileTokenStore, TokenEndpointClient, TokenStore,
};
use crate::types::{CredentialConfig, TokenRecord, TokenStatus};

/// Safety buffer before expiry inside which a refresh is triggered.
pub const REFRESH_BUFFER_SECS: u64 = 300;

/// Token manager interface.
#[async_trait]
pub trait TokenManager: Send + Sync {
    /// Make sure a usable access token is held, refreshing if necessary.
    async fn ensure_valid_token(&self) -> bool;

    /// Same as [`ensure_valid_token`](Self::ensure_valid_token) with the
    /// failure detail.
    async fn try_ensure_valid_token(&self) -> OAuth2Result<()>;

    /// Current access token; empty until an ensure succeeds.
    async fn access_token(&self) -> String;

    /// Refresh regardless of remaining lifetime.
    async fn force_refresh(&self) -> OAuth2Result<()>;

    /// Token status without network I/O.
    async fn token_status(&self) -> OAuth2Result<TokenStatus>;
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unloaded,
    Loaded,
    Valid,
    NeedsRefresh,
    Refreshing,
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::Valid => "valid",
            Self::NeedsRefresh => "needs_refresh",
            Self::Refreshing => "refreshing",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Most recent failure, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastFailure {
    /// Stable error code (see [`OAuth2Error::error_code`]).
    pub code: &'static str,
    pub message: String,
    /// Provider classification, for endpoint errors.
    pub category: Option<ErrorCategory>,
    pub needs_reauth: bool,
}

impl From<&OAuth2Error> for LastFailure {
    fn from(error: &OAuth2Error) -> Self {
        Self {
            code: error.error_code(),
            message: error.to_string(),
            category: match error {
                OAuth2Error::Endpoint(e) => Some(e.classify().category),
                _ => None,
            },
            needs_reauth: error.needs_reauth(),
        }
    }
}

#[derive(Default)]
struct TokenSlot {
    record: Option<TokenRecord>,
    /// Set when a refreshed record could not be written; retried before the
    /// next check.
    pending_persist: bool,
}

struct Observed {
    state: LifecycleState,
    last_failure: Option<LastFailure>,
    published: Option<SecretString>,
}

/// Default token lifecycle manager.
pub struct TokenLifecycleManager<E: TokenEndpointClient, S: TokenStore> {
    config: CredentialConfig,
    endpoint: Arc<E>,
    store: Arc<S>,
    signer: Arc<dyn AssertionSigner>,
    logger: Arc<dyn Logger>,
    context: LogContext,
    refresh_buffer: chrono::Duration,
    slot: tokio::sync::Mutex<TokenSlot>,
    observed: Mutex<Observed>,
}

impl<E: TokenEndpointClient, S: TokenStore> TokenLifecycleManager<E, S> {
    /// Create new token manager.
    pub fn new(
        config: CredentialConfig,
        endpoint: Arc<E>,
        store: Arc<S>,
        signer: Arc<dyn AssertionSigner>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let context = LogContext::new()
            .client_id(config.client_id.clone())
            .tenant_id(config.tenant_id.clone())
            .token_file(store.location());

        Self {
            config,
            endpoint,
            store,
            signer,
            logger,
            context,
            refresh_buffer: chrono::Duration::seconds(REFRESH_BUFFER_SECS as i64),
            slot: tokio::sync::Mutex::new(TokenSlot::default()),
            observed: Mutex::new(Observed {
                state: LifecycleState::Unloaded,
                last_failure: None,
                published: None,
            }),
        }
    }

    /// Override the refresh safety buffer.
    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer =
            chrono::Duration::from_std(buffer).unwrap_or(self.refresh_buffer);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.observed().state
    }

    /// Most recent failure, cleared by the next success.
    pub fn last_error(&self) -> Option<LastFailure> {
        self.observed().last_failure.clone()
    }

    /// `x5t` thumbprint of the configured certificate, or empty when no
    /// certificate is configured or it cannot be read.
    pub fn certificate_thumbprint(&self) -> String {
        let Some(path) = self.config.certificate_path.as_deref() else {
            return String::new();
        };

        match self.signer.thumbprint(path) {
            Ok(thumbprint) => thumbprint,
            Err(e) => {
                self.logger.warn(
                    &format!("Cannot compute certificate thumbprint: {}", e),
                    &self.context.clone().operation("certificate_thumbprint"),
                );
                String::new()
            }
        }
    }

    pub fn config(&self) -> &CredentialConfig {
        &self.config
    }

    fn observed(&self) -> std::sync::MutexGuard<'_, Observed> {
        self.observed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LifecycleState) {
        self.observed().state = state;
    }

    fn context(&self, operation: &str) -> LogContext {
        self.context.clone().operation(operation)
    }

    async fn run(&self, operation: &str, force: bool) -> OAuth2Result<()> {
        let mut slot = self.slot.lock().await;
        let result = self.check_and_refresh(&mut slot, operation, force).await;

        let mut observed = self.observed();
        match &result {
            Ok(()) => {
                observed.state = LifecycleState::Valid;
                observed.last_failure = None;
                observed.published = slot.record.as_ref().map(|r| r.access_token.clone());
            }
            Err(error) => {
                observed.state = LifecycleState::Failed;
                observed.last_failure = Some(LastFailure::from(error));
                observed.published = None;
            }
        }
        drop(observed);

        if let Err(error) = &result {
            self.report_failure(error, operation);
        }
        result
    }

    async fn check_and_refresh(
        &self,
        slot: &mut TokenSlot,
        operation: &str,
        force: bool,
    ) -> OAuth2Result<()> {
        self.load_if_needed(slot, operation).await?;

        if slot.pending_persist {
            self.persist(slot, operation).await?;
        }

        let record = match slot.record.as_ref() {
            Some(record) => record,
            None => return Err(OAuth2Error::Token(TokenError::MissingAccessToken)),
        };

        if !record.has_access_token() {
            return Err(OAuth2Error::Token(TokenError::MissingAccessToken));
        }

        let now = Utc::now();

        if !record.has_refresh_token() {
            if force {
                return Err(OAuth2Error::Token(TokenError::NoRefreshToken));
            }
            if record.is_expired_at(now) {
                return Err(OAuth2Error::Token(TokenError::ExpiredGrant));
            }
            if record.needs_refresh_at(now, self.refresh_buffer) {
                self.logger.warn(
                    "Access token expires soon and no refresh token is available",
                    &self.context(operation),
                );
            }
            return Ok(());
        }

        if !force && !record.needs_refresh_at(now, self.refresh_buffer) {
            self.logger.trace("Access token still valid", &self.context(operation));
            return Ok(());
        }

        self.set_state(LifecycleState::NeedsRefresh);
        let remaining = record.remaining_lifetime(now).unwrap_or(0);
        self.logger.info(
            &if force {
                "Forcing access token refresh".to_string()
            } else {
                format!("Access token expires in {}s; refreshing", remaining)
            },
            &self.context(operation),
        );

        self.refresh(slot, operation).await
    }

    async fn load_if_needed(&self, slot: &mut TokenSlot, operation: &str) -> OAuth2Result<()> {
        if slot.record.is_some() {
            return Ok(());
        }

        let record = self.store.load().await?;
        let context = self.context(operation);
        match record.remaining_lifetime(Utc::now()) {
            Some(secs) => self
                .logger
                .info(&format!("Token loaded; expires in {}s", secs), &context),
            None => self
                .logger
                .info("Token loaded; no expiry recorded, treating as non-expiring", &context),
        }

        slot.record = Some(record);
        self.set_state(LifecycleState::Loaded);
        Ok(())
    }

    async fn refresh(&self, slot: &mut TokenSlot, operation: &str) -> OAuth2Result<()> {
        self.set_state(LifecycleState::Refreshing);

        let strategy = select_strategy(&self.config, self.signer.clone())?;
        let refresh_token = slot
            .record
            .as_ref()
            .and_then(|r| r.refresh_token.clone())
            .ok_or(OAuth2Error::Token(TokenError::NoRefreshToken))?;

        let params = strategy.refresh_params(&refresh_token)?;
        self.logger.debug(
            &format!("Requesting token refresh with {} credentials", strategy.name()),
            &self
                .context(operation)
                .extra("strategy", strategy.name())
                .extra("endpoint", self.config.token_endpoint()),
        );

        let refreshed = self
            .endpoint
            .exchange(&self.config.token_endpoint(), &params)
            .await?;

        let rotated = refreshed.refresh_token.is_some();
        let expires_in = refreshed.expires_in;

        // Only mutate after a fully successful exchange.
        if let Some(record) = slot.record.as_mut() {
            record
                .apply_refresh(refreshed, Utc::now())
                .map_err(|message| ProtocolError::InvalidResponse { message })?;
        }
        slot.pending_persist = true;

        self.logger.info(
            &format!(
                "Token refreshed; expires in {}s{}",
                expires_in,
                if rotated { "; refresh token rotated" } else { "" }
            ),
            &self.context(operation).extra("strategy", strategy.name()),
        );

        self.persist(slot, operation).await
    }

    async fn persist(&self, slot: &mut TokenSlot, operation: &str) -> OAuth2Result<()> {
        if let Some(record) = slot.record.as_ref() {
            self.store.save(record).await?;
            self.logger
                .debug("Token record persisted", &self.context(operation));
        }
        slot.pending_persist = false;
        Ok(())
    }

    fn report_failure(&self, error: &OAuth2Error, operation: &str) {
        let context = self
            .context(operation)
            .extra("error_code", error.error_code());

        match error {
            OAuth2Error::Endpoint(endpoint_error) => {
                self.logger.error(
                    &format!("Token refresh failed: {}", endpoint_error),
                    &context,
                );
                endpoint_error.classify().log_to(self.logger.as_ref(), &context);
            }
            OAuth2Error::Storage(_) => {
                self.logger.error(&error.to_string(), &context);
            }
            _ => {
                self.logger
                    .error(&format!("Token refresh failed: {}", error), &context);
            }
        }

        if error.needs_reauth() {
            self.logger.error(
                "Interactive re-authorization is required to obtain a new refresh token",
                &context,
            );
        }
    }
}

#[async_trait]
impl<E: TokenEndpointClient, S: TokenStore> TokenManager for TokenLifecycleManager<E, S> {
    async fn ensure_valid_token(&self) -> bool {
        self.try_ensure_valid_token().await.is_ok()
    }

    async fn try_ensure_valid_token(&self) -> OAuth2Result<()> {
        self.run("ensure_valid_token", false).await
    }

    async fn access_token(&self) -> String {
        self.observed()
            .published
            .as_ref()
            .map(|token| token.expose_secret().clone())
            .unwrap_or_default()
    }

    async fn force_refresh(&self) -> OAuth2Result<()> {
        self.run("force_refresh", true).await
    }

    async fn token_status(&self) -> OAuth2Result<TokenStatus> {
        let mut slot = self.slot.lock().await;
        self.load_if_needed(&mut slot, "token_status").await?;

        match slot.record.as_ref() {
            Some(record) => Ok(TokenStatus::from_record(record, Utc::now())),
            None => Err(OAuth2Error::Token(TokenError::MissingAccessToken)),
        }
    }
}

/// Production token manager type.
pub type DefaultTokenLifecycleManager =
    TokenLifecycleManager<DefaultTokenEndpointClient<ReqwestHttpTransport>, FileTokenStore>;

/// Create the production token manager for `config`.
pub fn create_token_manager(
    config: CredentialConfig,
    logger: Arc<dyn Logger>,
) -> OAuth2Result<DefaultTokenLifecycleManager> {
    let transport = Arc::new(ReqwestHttpTransport::with_options(
        config.timeout,
        crate::core::MAX_RESPONSE_SIZE,
    )?);
    let endpoint = Arc::new(DefaultTokenEndpointClient::new(transport, config.timeout));
    let store = Arc::new(FileTokenStore::new(config.token_file.clone()));

    Ok(TokenLifecycleManager::new(
        config,
        endpoint,
        store,
        Arc::new(RsaAssertionSigner::new()),
        logger,
    ))
}

/// Mock token manager for testing.
pub struct MockTokenManager {
    access_token: Mutex<String>,
    next_error: Mutex<Option<OAuth2Error>>,
    ensure_count: Mutex<usize>,
}

impl MockTokenManager {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Mutex::new(access_token.into()),
            next_error: Mutex::new(None),
            ensure_count: Mutex::new(0),
        }
    }

    pub fn set_access_token(&self, token: impl Into<String>) -> &Self {
        *self.access_token.lock().unwrap() = token.into();
        self
    }

    /// Fail the next ensure or refresh with `error`.
    pub fn set_next_error(&self, error: OAuth2Error) -> &Self {
        *self.next_error.lock().unwrap() = Some(error);
        self
    }

    pub fn ensure_count(&self) -> usize {
        *self.ensure_count.lock().unwrap()
    }
}

impl Default for MockTokenManager {
    fn default() -> Self {
        Self::new("mock-access-token")
    }
}

#[async_trait]
impl TokenManager for MockTokenManager {
    async fn ensure_valid_token(&self) -> bool {
        self.try_ensure_valid_token().await.is_ok()
    }

    async fn try_ensure_valid_token(&self) -> OAuth2Result<()> {
        *self.ensure_count.lock().unwrap() += 1;
        match self.next_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn access_token(&self) -> String {
        self.access_token.lock().unwrap().clone()
    }

    async fn force_refresh(&self) -> OAuth2Result<()> {
        match self.next_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn token_status(&self) -> OAuth2Result<TokenStatus> {
        Ok(TokenStatus {
            has_access_token: !self.access_token.lock().unwrap().is_empty(),
            has_refresh_token: false,
            expires_at: None,
            remaining_secs: None,
        })
    }
}

/// Create mock token manager for testing.
pub fn create_mock_token_manager() -> MockTokenManager {
    MockTokenManager::default()
}
