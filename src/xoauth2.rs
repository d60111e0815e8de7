//! XOAUTH2 SASL
//!
//! Initial client response consumed by IMAP `AUTHENTICATE XOAUTH2` and SMTP
//! `AUTH XOAUTH2`, plus the narrow token seam mail clients depend on.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{OAuth2Result, TokenError};
use crate::token::TokenManager;

/// SASL mechanism name.
pub const XOAUTH2_MECHANISM: &str = "XOAUTH2";

/// base64(`user=<user>\x01auth=Bearer <token>\x01\x01`).
pub fn xoauth2_sasl(user: &str, access_token: &str) -> String {
    let response = format!("user={}\x01auth=Bearer {}\x01\x01", user, access_token);
    BASE64.encode(response)
}

/// Source of a bearer token that is valid at the time of the call.
#[async_trait]
pub trait BearerTokenSource: Send + Sync {
    async fn bearer_token(&self) -> OAuth2Result<String>;
}

#[async_trait]
impl<M: TokenManager + ?Sized> BearerTokenSource for M {
    async fn bearer_token(&self) -> OAuth2Result<String> {
        self.try_ensure_valid_token().await?;
        let token = self.access_token().await;
        if token.is_empty() {
            return Err(TokenError::MissingAccessToken.into());
        }
        Ok(token)
    }
}

/// Ensure a valid token and build the XOAUTH2 initial response for `user`.
pub async fn xoauth2_initial_response<S: BearerTokenSource + ?Sized>(
    source: &S,
    user: &str,
) -> OAuth2Result<String> {
    let token = source.bearer_token().await?;
    Ok(xoauth2_sasl(user, &token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OAuth2Error;
    use crate::token::MockTokenManager;

    #[test]
    fn test_xoauth2_encoding() {
        let encoded = xoauth2_sasl("someuser@example.com", "ya29.vF9dft4qmTc2Nvb3RlckBhdHRhdmlzdGEuY29tCg");
        let decoded = String::from_utf8(BASE64.decode(encoded).unwrap()).unwrap();
        assert_eq!(
            decoded,
            "user=someuser@example.com\x01auth=Bearer ya29.vF9dft4qmTc2Nvb3RlckBhdHRhdmlzdGEuY29tCg\x01\x01"
        );
    }

    #[tokio::test]
    async fn test_initial_response_ensures_first() {
        let manager = MockTokenManager::new("tok");
        let response = xoauth2_initial_response(&manager, "u@example.com").await.unwrap();
        assert_eq!(response, xoauth2_sasl("u@example.com", "tok"));
        assert_eq!(manager.ensure_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_ensure_yields_no_token() {
        let manager = MockTokenManager::new("stale");
        manager.set_next_error(OAuth2Error::Token(TokenError::ExpiredGrant));
        assert!(manager.bearer_token().await.is_err());
    }

    #[tokio::test]
    async fn test_empty_token_rejected() {
        let manager = MockTokenManager::new("");
        assert!(matches!(
            manager.bearer_token().await,
            Err(OAuth2Error::Token(TokenError::MissingAccessToken))
        ));
    }
}
