//! Per-connection subscription set.

use std::time::Duration;

use saladbar_proto::{canonicalize, BrokerEvent};

use crate::broker::Subscriber;
use crate::error::{Result, SubscriptionError};
use crate::validator::PathValidator;

/// The channels one connection is subscribed to.
///
/// The set is read straight from the subscriber handle, which only records a
/// channel once the broker accepted it. Failed operations leave it untouched.
pub struct SubscriptionRegistry {
    subscriber: Subscriber,
}

impl SubscriptionRegistry {
    /// Create an empty registry around a subscriber handle.
    pub fn new(subscriber: Subscriber) -> Self {
        Self { subscriber }
    }

    /// Current subscriptions, sorted.
    pub fn list(&self) -> Vec<String> {
        self.subscriber.channels().map(String::from).collect()
    }

    /// Subscribe to the channel named by `raw_path`.
    ///
    /// Returns the canonical channel on success.
    pub async fn subscribe(
        &mut self,
        raw_path: &str,
        validator: &PathValidator,
    ) -> std::result::Result<String, SubscriptionError> {
        let channel = canonicalize(raw_path);
        if self.subscriber.is_subscribed(&channel) {
            return Err(SubscriptionError::AlreadySubscribed(channel));
        }

        let valid = match validator.is_valid(&channel).await {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "existence probe failed");
                false
            }
        };
        if !valid {
            return Err(SubscriptionError::InvalidPath(channel));
        }

        if let Err(e) = self.subscriber.subscribe(&channel) {
            tracing::warn!(channel = %channel, error = %e, "broker subscribe failed");
            return Err(SubscriptionError::Broker(channel));
        }
        Ok(channel)
    }

    /// Unsubscribe from the channel named by `raw_path`.
    ///
    /// Returns the canonical channel on success.
    pub fn unsubscribe(&mut self, raw_path: &str) -> std::result::Result<String, SubscriptionError> {
        let channel = canonicalize(raw_path);
        if !self.subscriber.is_subscribed(&channel) {
            return Err(SubscriptionError::NotSubscribed(channel));
        }

        if let Err(e) = self.subscriber.unsubscribe(&channel) {
            tracing::warn!(channel = %channel, error = %e, "broker unsubscribe failed");
            return Err(SubscriptionError::Broker(channel));
        }
        Ok(channel)
    }

    /// Wait for the next broker event.
    ///
    /// Cancel-safe: dropping the future before it resolves loses no event.
    pub async fn next_event(&mut self, poll_interval: Duration) -> Result<BrokerEvent> {
        self.subscriber.next_message(poll_interval).await
    }

    /// Drop every subscription. Returns how many were released.
    pub fn clear(&mut self) -> usize {
        self.subscriber.unsubscribe_all()
    }
}
