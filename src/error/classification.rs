//! Provider Error Classification
//!
//! Maps token endpoint error codes to a remediation category. The result only
//! feeds diagnostics; it never changes control flow.

use std::fmt;

use crate::error::EndpointError;
use crate::telemetry::{LogContext, Logger};

/// Remediation category for a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Application, client id or tenant mismatch.
    Configuration,
    /// Invalid client secret or invalid/absent client assertion.
    Credential,
    /// A fresh interactive sign-in or consent is needed.
    ReauthRequired,
    /// Requested scope is misconfigured.
    Scope,
    /// Refresh token expired, revoked, or rejected.
    ExpiredGrant,
    /// Provider-side outage; the next poll may succeed.
    ServiceUnavailable,
    /// Code not present in the table.
    UnknownProvider,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Credential => "credential",
            Self::ReauthRequired => "reauth_required",
            Self::Scope => "scope",
            Self::ExpiredGrant => "expired_grant",
            Self::ServiceUnavailable => "service_unavailable",
            Self::UnknownProvider => "unknown_provider",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the classification table.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRule {
    pub code: &'static str,
    pub category: ErrorCategory,
    pub summary: &'static str,
    pub remediation: &'static [&'static str],
}

const EXPIRED_GRANT_REMEDIATION: &[&str] = &[
    "Refresh tokens expire after 90 days of inactivity or when revoked",
    "Certificate thumbprint or JWT signature mismatches are also reported as invalid_grant",
    "Refresh tokens obtained with a different authentication method are rejected",
    "Run the interactive token helper again to obtain a new refresh token",
    "Verify that the certificate and private key match the one registered in Azure AD",
];

const ASSERTION_REMEDIATION: &[&str] = &[
    "Verify the certificate is uploaded to the app registration",
    "Check that the certificate thumbprint matches the registered one",
    "Check that the certificate and private key paths are readable",
];

/// Known provider error codes. Specific AADSTS codes come before the generic
/// OAuth2 codes; extend by adding rows.
static RULES: &[ClassificationRule] = &[
    ClassificationRule {
        code: "AADSTS700016",
        category: ErrorCategory::Configuration,
        summary: "Application not found in tenant",
        remediation: &[
            "Verify the client id",
            "Verify the application is registered in the configured tenant",
            "Verify the tenant id matches the tenant of the app registration",
        ],
    },
    ClassificationRule {
        code: "AADSTS90002",
        category: ErrorCategory::Configuration,
        summary: "Tenant not found",
        remediation: &["Verify the tenant id in the configuration"],
    },
    ClassificationRule {
        code: "AADSTS7000215",
        category: ErrorCategory::Credential,
        summary: "Invalid client secret provided",
        remediation: &[
            "Use the secret value, not the secret id",
            "Check whether the client secret has expired",
        ],
    },
    ClassificationRule {
        code: "AADSTS7000218",
        category: ErrorCategory::Credential,
        summary: "Client assertion or client secret required but not provided",
        remediation: ASSERTION_REMEDIATION,
    },
    ClassificationRule {
        code: "AADSTS700027",
        category: ErrorCategory::Credential,
        summary: "Client assertion signature or certificate not accepted",
        remediation: ASSERTION_REMEDIATION,
    },
    ClassificationRule {
        code: "AADSTS70011",
        category: ErrorCategory::Scope,
        summary: "Invalid scope",
        remediation: &["Check the configured scope, e.g. https://outlook.office365.com/.default"],
    },
    ClassificationRule {
        code: "AADSTS50173",
        category: ErrorCategory::ReauthRequired,
        summary: "Fresh authentication required",
        remediation: &["Run the interactive token helper again"],
    },
    ClassificationRule {
        code: "AADSTS65001",
        category: ErrorCategory::ReauthRequired,
        summary: "User or administrator has not consented to the application",
        remediation: &["Grant consent for the requested scopes, then sign in again"],
    },
    ClassificationRule {
        code: "AADSTS70008",
        category: ErrorCategory::ExpiredGrant,
        summary: "Refresh token has expired",
        remediation: EXPIRED_GRANT_REMEDIATION,
    },
    ClassificationRule {
        code: "AADSTS700082",
        category: ErrorCategory::ExpiredGrant,
        summary: "Refresh token expired due to inactivity",
        remediation: EXPIRED_GRANT_REMEDIATION,
    },
    ClassificationRule {
        code: "AADSTS40016",
        category: ErrorCategory::ExpiredGrant,
        summary: "Invalid grant",
        remediation: EXPIRED_GRANT_REMEDIATION,
    },
    ClassificationRule {
        code: "invalid_grant",
        category: ErrorCategory::ExpiredGrant,
        summary: "Invalid grant: refresh token expired, revoked or rejected",
        remediation: EXPIRED_GRANT_REMEDIATION,
    },
    ClassificationRule {
        code: "invalid_client",
        category: ErrorCategory::Credential,
        summary: "Client authentication failed",
        remediation: ASSERTION_REMEDIATION,
    },
    ClassificationRule {
        code: "unauthorized_client",
        category: ErrorCategory::Configuration,
        summary: "Client is not authorized for the refresh_token grant",
        remediation: &["Check the app registration's allowed grant types"],
    },
    ClassificationRule {
        code: "invalid_scope",
        category: ErrorCategory::Scope,
        summary: "Invalid scope",
        remediation: &["Check the configured scope"],
    },
    ClassificationRule {
        code: "interaction_required",
        category: ErrorCategory::ReauthRequired,
        summary: "Interactive sign-in required",
        remediation: &["Run the interactive token helper again"],
    },
    ClassificationRule {
        code: "consent_required",
        category: ErrorCategory::ReauthRequired,
        summary: "Consent required",
        remediation: &["Grant consent for the requested scopes, then sign in again"],
    },
    ClassificationRule {
        code: "server_error",
        category: ErrorCategory::ServiceUnavailable,
        summary: "Identity provider reported an internal error",
        remediation: &["The next poll will retry"],
    },
    ClassificationRule {
        code: "temporarily_unavailable",
        category: ErrorCategory::ServiceUnavailable,
        summary: "Identity provider temporarily unavailable",
        remediation: &["The next poll will retry"],
    },
];

/// Find the table row for a code.
pub fn lookup_rule(code: &str) -> Option<&'static ClassificationRule> {
    RULES.iter().find(|rule| rule.code == code)
}

/// Outcome of classifying an endpoint error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: ErrorCategory,
    /// Code that matched the table, or the raw `error` value.
    pub code: Option<String>,
    pub summary: &'static str,
    pub remediation: &'static [&'static str],
    /// Raw provider description, preserved verbatim.
    pub description: Option<String>,
}

impl Classification {
    /// Emit the classification through a diagnostics sink.
    pub fn log_to(&self, logger: &dyn Logger, context: &LogContext) {
        let context = context
            .clone()
            .extra("error_category", self.category.as_str())
            .extra("error_code", self.code.as_deref().unwrap_or("none"));

        logger.error(self.summary, &context);
        for hint in self.remediation {
            logger.error(&format!("  remediation: {}", hint), &context);
        }
        if let Some(description) = &self.description {
            logger.error(&format!("Error description: {}", description), &context);
        }
    }
}

/// Classify an endpoint error.
///
/// Specific AADSTS codes (from `error_codes` or the description text) win over
/// the generic OAuth2 `error` value.
pub fn classify(error: &EndpointError) -> Classification {
    let specific = aadsts_codes(error);
    let candidates = specific.iter().map(String::as_str).chain(error.code.as_deref());

    for candidate in candidates {
        if let Some(rule) = lookup_rule(candidate) {
            return Classification {
                category: rule.category,
                code: Some(rule.code.to_string()),
                summary: rule.summary,
                remediation: rule.remediation,
                description: error.description.clone(),
            };
        }
    }

    Classification {
        category: ErrorCategory::UnknownProvider,
        code: error.code.clone(),
        summary: "Unrecognized provider error",
        remediation: &[],
        description: error
            .description
            .clone()
            .or_else(|| error.raw_body.clone()),
    }
}

fn aadsts_codes(error: &EndpointError) -> Vec<String> {
    let mut codes: Vec<String> = error
        .error_codes
        .iter()
        .map(|code| format!("AADSTS{}", code))
        .collect();

    if let Some(description) = &error.description {
        let mut rest = description.as_str();
        while let Some(start) = rest.find("AADSTS") {
            let after = &rest[start + "AADSTS".len()..];
            let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
            if !digits.is_empty() {
                let code = format!("AADSTS{}", digits);
                if !codes.contains(&code) {
                    codes.push(code);
                }
            }
            rest = after;
        }
    }

    codes
}
