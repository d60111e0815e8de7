//! Builders
//!
//! Fluent builder for the credential configuration.

pub mod config;

pub use config::{credential_config, CredentialConfigBuilder, ENV_PREFIX};
