//! Logging
//!
//! Diagnostics sink injected into the token lifecycle manager.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    Info,
    /// Warn level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Structured context attached to every log entry.
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    /// Operation name.
    pub operation: Option<String>,
    /// Client ID.
    pub client_id: Option<String>,
    /// Tenant ID.
    pub tenant_id: Option<String>,
    /// Token file location.
    pub token_file: Option<String>,
    /// Additional context.
    pub extra: BTreeMap<String, String>,
}

impl LogContext {
    /// Create new log context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set operation.
    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Set client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set tenant ID.
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Set token file location.
    pub fn token_file(mut self, token_file: impl Into<String>) -> Self {
        self.token_file = Some(token_file.into());
        self
    }

    /// Add extra context.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    fn extra_fields(&self) -> String {
        self.extra
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Logger interface.
pub trait Logger: Send + Sync {
    /// Log at trace level.
    fn trace(&self, message: &str, context: &LogContext);

    /// Log at debug level.
    fn debug(&self, message: &str, context: &LogContext);

    /// Log at info level.
    fn info(&self, message: &str, context: &LogContext);

    /// Log at warn level.
    fn warn(&self, message: &str, context: &LogContext);

    /// Log at error level.
    fn error(&self, message: &str, context: &LogContext);
}

/// Log entry for in-memory storage.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub context: LogContext,
    pub timestamp: u64,
}

/// In-memory logger for testing.
pub struct InMemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
    min_level: LogLevel,
}

impl InMemoryLogger {
    /// Create new in-memory logger.
    pub fn new() -> Self {
        Self::with_level(LogLevel::Trace)
    }

    /// Create in-memory logger with minimum level.
    pub fn with_level(min_level: LogLevel) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            min_level,
        }
    }

    /// Get all log entries.
    pub fn get_entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Get entries by level.
    pub fn get_entries_by_level(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    /// Check whether any entry contains the given text.
    pub fn contains(&self, text: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.message.contains(text))
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    fn log(&self, level: LogLevel, message: &str, context: &LogContext) {
        if level >= self.min_level {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64;

            self.entries.lock().unwrap().push(LogEntry {
                level,
                message: message.to_string(),
                context: context.clone(),
                timestamp: now,
            });
        }
    }
}

impl Default for InMemoryLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for InMemoryLogger {
    fn trace(&self, message: &str, context: &LogContext) {
        self.log(LogLevel::Trace, message, context);
    }

    fn debug(&self, message: &str, context: &LogContext) {
        self.log(LogLevel::Debug, message, context);
    }

    fn info(&self, message: &str, context: &LogContext) {
        self.log(LogLevel::Info, message, context);
    }

    fn warn(&self, message: &str, context: &LogContext) {
        self.log(LogLevel::Warn, message, context);
    }

    fn error(&self, message: &str, context: &LogContext) {
        self.log(LogLevel::Error, message, context);
    }
}

/// Logger that forwards entries to the `tracing` facade.
///
/// Level filtering is left to the installed subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl TracingLogger {
    /// Create new tracing logger.
    pub fn new() -> Self {
        Self
    }
}

macro_rules! forward {
    ($level:ident, $message:expr, $context:expr) => {
        tracing::$level!(
            operation = $context.operation.as_deref().unwrap_or(""),
            client_id = $context.client_id.as_deref().unwrap_or(""),
            tenant_id = $context.tenant_id.as_deref().unwrap_or(""),
            token_file = $context.token_file.as_deref().unwrap_or(""),
            extra = %$context.extra_fields(),
            "{}",
            $message
        )
    };
}

impl Logger for TracingLogger {
    fn trace(&self, message: &str, context: &LogContext) {
        forward!(trace, message, context);
    }

    fn debug(&self, message: &str, context: &LogContext) {
        forward!(debug, message, context);
    }

    fn info(&self, message: &str, context: &LogContext) {
        forward!(info, message, context);
    }

    fn warn(&self, message: &str, context: &LogContext) {
        forward!(warn, message, context);
    }

    fn error(&self, message: &str, context: &LogContext) {
        forward!(error, message, context);
    }
}

/// Create the production logger.
pub fn create_tracing_logger() -> TracingLogger {
    TracingLogger::new()
}
