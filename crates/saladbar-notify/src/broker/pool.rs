//! Shared broker pool.
//!
//! One pool is built at startup and shared by every connection. It owns the
//! publisher socket and hands out a bounded number of subscriber handles.

use std::sync::Arc;
use std::time::Duration;

use nng::options::{Options, SendTimeout};
use nng::{Protocol, Socket};
use tokio::sync::Semaphore;

use saladbar_proto::framing;
use saladbar_proto::ChangePayload;

use crate::broker::Subscriber;
use crate::config::{self, NotifyConfig};
use crate::error::{Error, Result};

/// How long a publish may wait for the ingress to accept a frame.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for the broker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// URL publishers push to.
    pub ingress_url: String,
    /// URL subscriber handles dial.
    pub egress_url: String,
    /// Maximum number of live subscriber handles.
    pub max_subscribers: usize,
    /// Timeout for acquiring a subscriber handle.
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    /// Create a new pool configuration.
    pub fn new(ingress_url: impl Into<String>, egress_url: impl Into<String>) -> Self {
        Self {
            ingress_url: ingress_url.into(),
            egress_url: egress_url.into(),
            max_subscribers: config::DEFAULT_MAX_SUBSCRIBERS,
            acquire_timeout: Duration::from_millis(config::DEFAULT_ACQUIRE_TIMEOUT_MS),
        }
    }

    /// Set the maximum number of subscriber handles.
    pub fn with_max_subscribers(mut self, max: usize) -> Self {
        self.max_subscribers = max.max(1);
        self
    }

    /// Set the acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

impl From<&NotifyConfig> for PoolConfig {
    fn from(config: &NotifyConfig) -> Self {
        Self::new(&config.broker_ingress, &config.broker_egress)
            .with_max_subscribers(config.max_subscribers)
            .with_acquire_timeout(config.acquire_timeout)
    }
}

/// Subscriber handle usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Handles currently checked out.
    pub active: usize,
    /// Maximum handles.
    pub max: usize,
}

/// Process-wide broker pool.
pub struct BrokerPool {
    config: PoolConfig,
    publisher: Socket,
    permits: Arc<Semaphore>,
}

/// Broker pool shared across connections.
pub type SharedBrokerPool = Arc<BrokerPool>;

impl BrokerPool {
    /// Connect to the broker.
    ///
    /// Both sides are dialled synchronously, so an unreachable broker fails
    /// here rather than on the first connection.
    pub fn connect(config: PoolConfig) -> Result<Self> {
        let unreachable = |url: &str, reason: String| Error::BrokerUnreachable {
            url: url.to_string(),
            reason,
        };
        let ingress = config.ingress_url.as_str();
        let egress = config.egress_url.as_str();

        let publisher =
            Socket::new(Protocol::Push0).map_err(|e| unreachable(ingress, e.to_string()))?;
        publisher
            .set_opt::<SendTimeout>(Some(PUBLISH_TIMEOUT))
            .map_err(|e| unreachable(ingress, e.to_string()))?;
        publisher
            .dial(ingress)
            .map_err(|e| unreachable(ingress, e.to_string()))?;

        // Subscriber handles dial in the background and would never notice a
        // missing egress, so check it once here.
        let check = Socket::new(Protocol::Sub0).map_err(|e| unreachable(egress, e.to_string()))?;
        let dialled = check.dial(egress);
        check.close();
        if let Err(e) = dialled {
            publisher.close();
            return Err(unreachable(egress, e.to_string()));
        }

        tracing::info!(
            ingress = %config.ingress_url,
            egress = %config.egress_url,
            max_subscribers = config.max_subscribers,
            "connected to broker"
        );

        let permits = Arc::new(Semaphore::new(config.max_subscribers));
        Ok(Self {
            config,
            publisher,
            permits,
        })
    }

    /// Publish a change on a channel.
    pub fn publish(&self, channel: &str, payload: &ChangePayload) -> Result<()> {
        let frame = framing::encode_change(channel, payload)?;
        self.publisher
            .send(nng::Message::from(frame.as_slice()))
            .map_err(|(_, e)| Error::Broker(format!("failed to publish on {}: {}", channel, e)))?;

        tracing::debug!(channel = %channel, change_type = %payload.change_type, "change published");
        Ok(())
    }

    /// Check out a subscriber handle.
    ///
    /// Waits up to the configured acquire timeout for a free slot. The slot
    /// is returned when the handle is dropped.
    pub async fn acquire_subscriber(&self) -> Result<Subscriber> {
        let permit = tokio::time::timeout(
            self.config.acquire_timeout,
            self.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| Error::PoolExhausted(self.config.max_subscribers))?
        .map_err(|_| Error::Broker("subscriber pool is closed".to_string()))?;

        Ok(Subscriber::connect(&self.config.egress_url)?.with_permit(permit))
    }

    /// Current subscriber handle usage.
    pub fn stats(&self) -> PoolStats {
        let max = self.config.max_subscribers;
        PoolStats {
            active: max.saturating_sub(self.permits.available_permits()),
            max,
        }
    }
}

impl Drop for BrokerPool {
    fn drop(&mut self) {
        self.permits.close();
        self.publisher.close();
    }
}
