//! Core Components
//!
//! HTTP transport and client assertion signing.

pub mod assertion;
pub mod transport;

pub use assertion::*;
pub use transport::*;
