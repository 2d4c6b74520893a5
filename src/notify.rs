//! Notification sender contract
//!
//! Fire-and-forget from the engine's perspective: a delivery failure is
//! logged and never blocks or unwinds a transaction's state transition.
//! The concrete sender (templated email, SMS) lives outside this crate.

use async_trait::async_trait;
use thiserror::Error;

/// Failure to hand a notification to the delivery channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Outbound notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `template` to `recipient` with the given template data
    async fn send(
        &self,
        template: &str,
        recipient: &str,
        data: serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// Notifier that drops everything; the default when no sender is wired up
#[derive(Debug, Default, Clone)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(
        &self,
        _template: &str,
        _recipient: &str,
        _data: serde_json::Value,
    ) -> Result<(), NotifyError> {
        Ok(())
    }
}
