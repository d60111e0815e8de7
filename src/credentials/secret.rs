//! Client secret strategy.

use secrecy::{ExposeSecret, SecretString};

use super::{CredentialStrategy, FormParams};
use crate::error::OAuth2Result;

/// Authenticates the refresh request with a shared client secret.
pub struct SecretCredential {
    client_id: String,
    client_secret: SecretString,
    scope: Option<String>,
}

impl SecretCredential {
    pub fn new(client_id: String, client_secret: SecretString, scope: Option<String>) -> Self {
        Self {
            client_id,
            client_secret,
            scope,
        }
    }
}

impl CredentialStrategy for SecretCredential {
    fn name(&self) -> &'static str {
        "client_secret"
    }

    fn refresh_params(&self, refresh_token: &SecretString) -> OAuth2Result<FormParams> {
        let mut params = FormParams::refresh_grant(&self.client_id, refresh_token);
        params.push("client_secret", self.client_secret.expose_secret());
        params.push_scope(self.scope.as_deref());
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_params() {
        let credential = SecretCredential::new(
            "client-123".to_string(),
            SecretString::new("s3cret".to_string()),
            Some("https://outlook.office365.com/.default".to_string()),
        );

        let params = credential
            .refresh_params(&SecretString::new("rt-1".to_string()))
            .unwrap();

        assert_eq!(
            params.keys(),
            vec!["client_id", "grant_type", "refresh_token", "client_secret", "scope"]
        );
        assert_eq!(params.get("grant_type"), Some("refresh_token"));
        assert_eq!(params.get("refresh_token"), Some("rt-1"));
        assert_eq!(params.get("client_secret"), Some("s3cret"));
    }

    #[test]
    fn test_scope_omitted_when_unset() {
        let credential =
            SecretCredential::new("c".to_string(), SecretString::new("s".to_string()), None);
        let params = credential
            .refresh_params(&SecretString::new("rt".to_string()))
            .unwrap();
        assert!(!params.contains("scope"));
    }
}
