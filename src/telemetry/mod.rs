//! Telemetry
//!
//! Diagnostics for token lifecycle operations. The manager logs through an
//! injected [`Logger`]; production code uses [`TracingLogger`].

pub mod logging;

pub use logging::{
    create_tracing_logger, InMemoryLogger, LogContext, LogEntry, LogLevel, Logger, TracingLogger,
};
