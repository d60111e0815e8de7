//! Token Types
//!
//! The durable token record, its on-disk representation, and the token
//! endpoint response.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Lifetime assumed when neither the file nor the provider states one.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Epoch values above this are milliseconds.
pub const MILLISECOND_EPOCH_THRESHOLD: i64 = 1_000_000_000_000;

/// Durable token record.
///
/// `expires_at == None` marks a non-expiring token.
#[derive(Clone)]
pub struct TokenRecord {
    /// Bearer credential.
    pub access_token: SecretString,
    /// Renewal credential; `None` when the provider issued none.
    pub refresh_token: Option<SecretString>,
    /// Provider-declared lifetime in seconds.
    pub expires_in: u64,
    /// Absolute expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the current access token was acquired, if known.
    pub acquired_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    /// Create a record acquired at `acquired_at`.
    ///
    /// A lifetime too large to represent saturates at the latest
    /// representable instant.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: u64,
        acquired_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            refresh_token: non_empty_secret(refresh_token),
            expires_in,
            expires_at: Some(
                expiry_after(acquired_at, expires_in).unwrap_or(DateTime::<Utc>::MAX_UTC),
            ),
            acquired_at: Some(acquired_at),
        }
    }

    /// Create a record that never expires.
    pub fn non_expiring(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            refresh_token: non_empty_secret(refresh_token),
            expires_in: DEFAULT_EXPIRES_IN_SECS,
            expires_at: None,
            acquired_at: None,
        }
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.expose_secret().is_empty()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_ref()
            .map(|token| !token.expose_secret().is_empty())
            .unwrap_or(false)
    }

    pub fn is_non_expiring(&self) -> bool {
        self.expires_at.is_none()
    }

    /// Check if the token is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Check if `now` falls inside the safety buffer before expiry.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.expires_at
            .map(|exp| {
                exp.checked_sub_signed(buffer)
                    .map(|threshold| now >= threshold)
                    .unwrap_or(true)
            })
            .unwrap_or(false)
    }

    /// Remaining lifetime in seconds, clamped at zero.
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at
            .map(|exp| if exp > now { (exp - now).num_seconds() } else { 0 })
    }

    /// Merge a successful refresh into this record.
    ///
    /// The stored refresh token is only replaced when the provider rotated it.
    /// The record is left untouched when the new lifetime cannot be
    /// represented.
    pub fn apply_refresh(
        &mut self,
        refreshed: RefreshedToken,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        let expires_at = expiry_after(now, refreshed.expires_in)
            .ok_or_else(|| format!("expires_in out of range: {}", refreshed.expires_in))?;

        self.access_token = refreshed.access_token;
        if let Some(rotated) = refreshed.refresh_token {
            if !rotated.expose_secret().is_empty() {
                self.refresh_token = Some(rotated);
            }
        }
        self.expires_in = refreshed.expires_in;
        self.expires_at = Some(expires_at);
        self.acquired_at = Some(now);
        Ok(())
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

fn non_empty_secret(value: Option<String>) -> Option<SecretString> {
    value.filter(|v| !v.is_empty()).map(SecretString::new)
}

/// `start + expires_in` seconds, or `None` when it overflows.
pub fn expiry_after(start: DateTime<Utc>, expires_in: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(expires_in).ok()?;
    start.checked_add_signed(Duration::try_seconds(secs)?)
}

/// Normalize an epoch value that may be in seconds or milliseconds.
pub fn normalize_epoch_seconds(value: i64) -> i64 {
    if value > MILLISECOND_EPOCH_THRESHOLD {
        value / 1000
    } else {
        value
    }
}

/// On-disk token file.
///
/// Every field is optional at the serde level; `access_token` presence is
/// checked when converting to a [`TokenRecord`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_lenient_i64"
    )]
    pub expires_in: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_lenient_i64"
    )]
    pub acquired_at: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_lenient_i64"
    )]
    pub expires_at: Option<i64>,
}

impl TokenFile {
    /// Build the file contents for `record`, stamping `saved_at` as the
    /// acquisition time when the record expires.
    pub fn from_record(record: &TokenRecord, saved_at: DateTime<Utc>) -> Self {
        Self {
            access_token: Some(record.access_token.expose_secret().clone()),
            refresh_token: record
                .refresh_token
                .as_ref()
                .map(|token| token.expose_secret().clone()),
            expires_in: i64::try_from(record.expires_in).ok(),
            acquired_at: record.expires_at.map(|_| saved_at.timestamp()),
            expires_at: record.expires_at.map(|exp| exp.timestamp()),
        }
    }

    /// Convert into a record.
    ///
    /// `expires_at` wins over `acquired_at + expires_in`; with neither the
    /// token is non-expiring.
    pub fn into_record(self) -> Result<TokenRecord, String> {
        let access_token = self
            .access_token
            .ok_or_else(|| "access_token not found".to_string())?;

        let expires_in = match self.expires_in {
            Some(secs) if secs >= 0 => secs as u64,
            Some(secs) => return Err(format!("negative expires_in: {}", secs)),
            None => DEFAULT_EXPIRES_IN_SECS,
        };

        let acquired_at = self
            .acquired_at
            .map(|value| epoch_to_datetime("acquired_at", value))
            .transpose()?;

        let expires_at = match self.expires_at {
            Some(value) => Some(epoch_to_datetime("expires_at", value)?),
            None => match acquired_at {
                Some(at) => Some(
                    expiry_after(at, expires_in)
                        .ok_or_else(|| format!("expires_in out of range: {}", expires_in))?,
                ),
                None => None,
            },
        };

        Ok(TokenRecord {
            access_token: SecretString::new(access_token),
            refresh_token: non_empty_secret(self.refresh_token),
            expires_in,
            expires_at,
            acquired_at,
        })
    }
}

fn epoch_to_datetime(field: &str, value: i64) -> Result<DateTime<Utc>, String> {
    DateTime::from_timestamp(normalize_epoch_seconds(value), 0)
        .ok_or_else(|| format!("{} out of range: {}", field, value))
}

/// Token response from the token endpoint.
///
/// `access_token` is optional here so its absence surfaces as a protocol
/// error rather than a JSON error.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_seconds")]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Validated result of a successful refresh exchange.
#[derive(Clone)]
pub struct RefreshedToken {
    pub access_token: SecretString,
    /// Present only when the provider rotated the refresh token.
    pub refresh_token: Option<SecretString>,
    pub expires_in: u64,
}

impl RefreshedToken {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>, expires_in: u64) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            refresh_token: non_empty_secret(refresh_token),
            expires_in,
        }
    }
}

impl std::fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedToken")
            .field("access_token", &"[REDACTED]")
            .field("rotated_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Snapshot of the token state without secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStatus {
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining_secs: Option<i64>,
}

impl TokenStatus {
    pub fn from_record(record: &TokenRecord, now: DateTime<Utc>) -> Self {
        Self {
            has_access_token: record.has_access_token(),
            has_refresh_token: record.has_refresh_token(),
            expires_at: record.expires_at,
            remaining_secs: record.remaining_lifetime(now),
        }
    }
}

fn deserialize_lenient_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Number(secs)) => Ok(Some(secs)),
        Some(Seconds::Text(text)) => text
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn deserialize_lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Integer {
        Number(i64),
        Text(String),
    }

    match Option::<Integer>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Integer::Number(value)) => Ok(Some(value)),
        Some(Integer::Text(text)) => text
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
