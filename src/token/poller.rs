//! Refresh Poller
//!
//! Drives `ensure_valid_token` on a fixed cadence. A failed cycle is logged
//! and retried on the next tick only.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::telemetry::{LogContext, Logger};
use crate::token::TokenManager;

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Counters reported when the poller stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    pub cycles: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Periodic token check.
pub struct RefreshPoller<M: TokenManager + ?Sized> {
    manager: Arc<M>,
    interval: Duration,
    logger: Arc<dyn Logger>,
}

impl<M: TokenManager + ?Sized> RefreshPoller<M> {
    pub fn new(manager: Arc<M>, interval: Duration, logger: Arc<dyn Logger>) -> Self {
        Self {
            manager,
            interval,
            logger,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run until `cancel` fires. The first check happens immediately.
    pub async fn run(&self, cancel: CancellationToken) -> PollerStats {
        let context = LogContext::new()
            .operation("refresh_poller")
            .extra("interval_secs", self.interval.as_secs().to_string());
        self.logger.info("Refresh poller started", &context);

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = PollerStats::default();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.logger.info("Refresh poller shutting down", &context);
                    return stats;
                }
                _ = interval.tick() => {
                    stats.cycles += 1;
                    if self.manager.ensure_valid_token().await {
                        stats.successes += 1;
                    } else {
                        stats.failures += 1;
                        self.logger.warn(
                            "Token check failed; retrying on next interval",
                            &context,
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OAuth2Error, TokenError};
    use crate::telemetry::InMemoryLogger;
    use crate::token::MockTokenManager;

    #[tokio::test]
    async fn test_first_check_is_immediate() {
        let manager = Arc::new(MockTokenManager::default());
        let poller = RefreshPoller::new(
            manager.clone(),
            Duration::from_secs(3600),
            Arc::new(InMemoryLogger::new()),
        );

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move { poller.run(cancel_clone).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let stats = handle.await.unwrap();
        assert_eq!(stats.cycles, 1);
        assert_eq!(manager.ensure_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_waits_for_next_tick() {
        let manager = Arc::new(MockTokenManager::default());
        manager.set_next_error(OAuth2Error::Token(TokenError::ExpiredGrant));
        let logger = Arc::new(InMemoryLogger::new());
        let poller = RefreshPoller::new(manager.clone(), Duration::from_millis(40), logger.clone());

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move { poller.run(cancel_clone).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let stats = handle.await.unwrap();
        assert_eq!(stats.failures, 1);
        assert!(stats.successes >= 1);
        // Bounded by the interval, not a tight loop.
        assert!(stats.cycles <= 4);
        assert!(logger.contains("retrying on next interval"));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let manager = Arc::new(MockTokenManager::default());
        let poller = RefreshPoller::new(manager, DEFAULT_POLL_INTERVAL, Arc::new(InMemoryLogger::new()));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = poller.run(cancel).await;
        assert!(stats.cycles <= 1);
    }
}
