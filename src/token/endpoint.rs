//! Token Endpoint Client
//!
//! Executes the refresh-token exchange and parses success and error bodies.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::{HttpRequest, HttpTransport};
use crate::credentials::FormParams;
use crate::error::{create_error_from_response, OAuth2Error, OAuth2Result, ProtocolError};
use crate::types::{expiry_after, RefreshedToken, TokenResponse, DEFAULT_EXPIRES_IN_SECS};

/// Token endpoint interface.
#[async_trait]
pub trait TokenEndpointClient: Send + Sync {
    /// POST `params` to `endpoint` and return the validated result.
    async fn exchange(&self, endpoint: &str, params: &FormParams) -> OAuth2Result<RefreshedToken>;
}

/// Default token endpoint client over an HTTP transport.
pub struct DefaultTokenEndpointClient<T: HttpTransport> {
    transport: Arc<T>,
    timeout: Duration,
}

impl<T: HttpTransport> DefaultTokenEndpointClient<T> {
    /// Create new endpoint client.
    pub fn new(transport: Arc<T>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }
}

#[async_trait]
impl<T: HttpTransport> TokenEndpointClient for DefaultTokenEndpointClient<T> {
    async fn exchange(&self, endpoint: &str, params: &FormParams) -> OAuth2Result<RefreshedToken> {
        let request = HttpRequest::form(endpoint, params.encode()).with_timeout(self.timeout);
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            return Err(OAuth2Error::Endpoint(create_error_from_response(
                response.status,
                &response.body,
            )));
        }

        parse_token_response(&response.body)
    }
}

/// Parse a 2xx token endpoint body.
pub fn parse_token_response(body: &str) -> OAuth2Result<RefreshedToken> {
    let parsed: TokenResponse = serde_json::from_str(body).map_err(|e| {
        OAuth2Error::Protocol(ProtocolError::InvalidJson {
            message: e.to_string(),
        })
    })?;

    let access_token = parsed
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            OAuth2Error::Protocol(ProtocolError::MissingField {
                field: "access_token".to_string(),
            })
        })?;

    let expires_in = parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    if expiry_after(Utc::now(), expires_in).is_none() {
        return Err(OAuth2Error::Protocol(ProtocolError::InvalidResponse {
            message: format!("expires_in out of range: {}", expires_in),
        }));
    }

    Ok(RefreshedToken::new(access_token, parsed.refresh_token, expires_in))
}

/// Recorded exchange.
#[derive(Debug, Clone)]
pub struct ExchangeCall {
    pub endpoint: String,
    pub params: FormParams,
}

/// Mock token endpoint client for testing.
#[derive(Default)]
pub struct MockTokenEndpointClient {
    results: Mutex<VecDeque<OAuth2Result<RefreshedToken>>>,
    history: Mutex<Vec<ExchangeCall>>,
}

impl MockTokenEndpointClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful exchange.
    pub fn queue_token(&self, token: RefreshedToken) -> &Self {
        self.results.lock().unwrap().push_back(Ok(token));
        self
    }

    /// Queue a failed exchange.
    pub fn queue_error(&self, error: OAuth2Error) -> &Self {
        self.results.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn get_history(&self) -> Vec<ExchangeCall> {
        self.history.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.history.lock().unwrap().len()
    }
}

#[async_trait]
impl TokenEndpointClient for MockTokenEndpointClient {
    async fn exchange(&self, endpoint: &str, params: &FormParams) -> OAuth2Result<RefreshedToken> {
        self.history.lock().unwrap().push(ExchangeCall {
            endpoint: endpoint.to_string(),
            params: params.clone(),
        });

        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RefreshedToken::new("mock-access-token", None, 3600)))
    }
}
