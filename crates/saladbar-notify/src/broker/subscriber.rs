//! Per-connection subscriber handle.

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use nng::options::protocol::pubsub::{Subscribe, Unsubscribe};
use nng::options::Options;
use nng::{Protocol, Socket};
use tokio::sync::OwnedSemaphorePermit;

use saladbar_proto::framing;
use saladbar_proto::BrokerEvent;

use crate::error::{Error, Result};

/// A subscriber handle bound to the broker egress.
///
/// Registration acknowledgements are queued locally and handed out by
/// [`Subscriber::try_next_message`] before any socket traffic.
pub struct Subscriber {
    socket: Socket,
    channels: BTreeSet<String>,
    pending: VecDeque<BrokerEvent>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Subscriber {
    /// Open a SUB socket and dial the egress URL in the background.
    pub fn connect(egress_url: &str) -> Result<Self> {
        let socket = Socket::new(Protocol::Sub0)
            .map_err(|e| Error::Broker(format!("failed to create subscriber socket: {}", e)))?;
        socket
            .dial_async(egress_url)
            .map_err(|e| Error::Broker(format!("failed to dial {}: {}", egress_url, e)))?;

        Ok(Self {
            socket,
            channels: BTreeSet::new(),
            pending: VecDeque::new(),
            permit: None,
        })
    }

    /// Attach the pool permit released when this handle drops.
    pub(crate) fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self.permit = Some(permit);
        self
    }

    /// Register interest in a channel.
    pub fn subscribe(&mut self, channel: &str) -> Result<()> {
        self.socket
            .set_opt::<Subscribe>(framing::topic(channel))
            .map_err(|e| Error::Broker(format!("failed to subscribe to {}: {}", channel, e)))?;

        self.channels.insert(channel.to_string());
        self.pending.push_back(BrokerEvent::subscribed(channel));
        tracing::debug!(channel = %channel, "broker subscription added");
        Ok(())
    }

    /// Drop interest in a channel.
    pub fn unsubscribe(&mut self, channel: &str) -> Result<()> {
        self.socket
            .set_opt::<Unsubscribe>(framing::topic(channel))
            .map_err(|e| Error::Broker(format!("failed to unsubscribe from {}: {}", channel, e)))?;

        self.channels.remove(channel);
        self.pending.push_back(BrokerEvent::unsubscribed(channel));
        tracing::debug!(channel = %channel, "broker subscription removed");
        Ok(())
    }

    /// Drop every channel without queueing acknowledgements.
    ///
    /// Returns the number of channels released.
    pub fn unsubscribe_all(&mut self) -> usize {
        let channels = std::mem::take(&mut self.channels);
        for channel in &channels {
            if let Err(e) = self.socket.set_opt::<Unsubscribe>(framing::topic(channel)) {
                tracing::warn!(channel = %channel, error = %e, "failed to release subscription");
            }
        }
        self.pending.clear();
        channels.len()
    }

    /// Channels currently registered, in sorted order.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(String::as_str)
    }

    /// Whether a channel is registered.
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    /// Return the next pending event without blocking.
    pub fn try_next_message(&mut self) -> Result<Option<BrokerEvent>> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        loop {
            let msg = match self.socket.try_recv() {
                Ok(msg) => msg,
                Err(nng::Error::TryAgain) => return Ok(None),
                Err(e) => return Err(Error::Broker(format!("receive failed: {}", e))),
            };

            tracing::trace!(bytes = msg.len(), "broker frame received");

            match framing::decode_change(msg.as_slice()) {
                Ok(event) if self.channels.contains(&event.channel) => return Ok(Some(event)),
                Ok(event) => {
                    // Topic filtering already happened; this is a frame that
                    // raced an unsubscribe.
                    tracing::trace!(channel = %event.channel, "dropping frame for released channel");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed broker frame");
                }
            }
        }
    }

    /// Wait for the next event, polling every `poll_interval`.
    ///
    /// Dropping the returned future loses nothing: events stay queued in the
    /// socket until a later poll picks them up.
    pub async fn next_message(&mut self, poll_interval: Duration) -> Result<BrokerEvent> {
        loop {
            if let Some(event) = self.try_next_message()? {
                return Ok(event);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        let released = self.unsubscribe_all();
        self.socket.close();
        self.permit.take();
        tracing::debug!(released, "subscriber handle closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Relay;
    use saladbar_proto::{ChangePayload, EventKind};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_URL: AtomicUsize = AtomicUsize::new(0);

    fn relay() -> Relay {
        let n = NEXT_URL.fetch_add(1, Ordering::Relaxed);
        Relay::bind(
            &format!("inproc://subscriber-test-in-{}", n),
            &format!("inproc://subscriber-test-out-{}", n),
        )
        .unwrap()
    }

    fn publisher(relay: &Relay) -> Socket {
        let push = Socket::new(Protocol::Push0).unwrap();
        push.dial(relay.ingress_url()).unwrap();
        push
    }

    /// Push `frame` until the subscriber sees a message event.
    async fn publish_until_received(push: &Socket, sub: &mut Subscriber, frame: &[u8]) -> BrokerEvent {
        for _ in 0..100 {
            assert!(push.send(nng::Message::from(frame)).is_ok());
            tokio::time::sleep(Duration::from_millis(20)).await;
            while let Some(event) = sub.try_next_message().unwrap() {
                if event.kind == EventKind::Message {
                    return event;
                }
            }
        }
        panic!("subscriber never received a frame");
    }

    #[test]
    fn test_subscribe_queues_ack() {
        let relay = relay();
        let mut sub = Subscriber::connect(relay.egress_url()).unwrap();

        sub.subscribe("/api/salads").unwrap();
        assert!(sub.is_subscribed("/api/salads"));

        let event = sub.try_next_message().unwrap().unwrap();
        assert_eq!(event, BrokerEvent::subscribed("/api/salads"));
        assert!(sub.try_next_message().unwrap().is_none());

        sub.unsubscribe("/api/salads").unwrap();
        assert!(!sub.is_subscribed("/api/salads"));
        let event = sub.try_next_message().unwrap().unwrap();
        assert_eq!(event, BrokerEvent::unsubscribed("/api/salads"));
    }

    #[test]
    fn test_unsubscribe_all() {
        let relay = relay();
        let mut sub = Subscriber::connect(relay.egress_url()).unwrap();

        sub.subscribe("/api/b").unwrap();
        sub.subscribe("/api/a").unwrap();
        assert_eq!(sub.channels().collect::<Vec<_>>(), vec!["/api/a", "/api/b"]);

        assert_eq!(sub.unsubscribe_all(), 2);
        assert_eq!(sub.channels().count(), 0);
        assert!(sub.try_next_message().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_receives_exact_channel_only() {
        let relay = relay();
        let push = publisher(&relay);
        let mut sub = Subscriber::connect(relay.egress_url()).unwrap();
        sub.subscribe("/api/salads/1").unwrap();

        let payload = ChangePayload::created(json!({"name": "tomato"}));
        let other = framing::encode_change("/api/salads/12", &payload).unwrap();
        assert!(push.send(nng::Message::from(other.as_slice())).is_ok());

        let frame = framing::encode_change("/api/salads/1", &payload).unwrap();
        let event = publish_until_received(&push, &mut sub, &frame).await;

        assert_eq!(event, BrokerEvent::message("/api/salads/1", payload));
    }

    #[tokio::test]
    async fn test_malformed_frame_dropped() {
        let relay = relay();
        let push = publisher(&relay);
        let mut sub = Subscriber::connect(relay.egress_url()).unwrap();
        sub.subscribe("/api/a").unwrap();

        let garbage = framing::encode_frame("/api/a", b"not json").unwrap();
        for _ in 0..5 {
            assert!(push.send(nng::Message::from(garbage.as_slice())).is_ok());
        }

        let payload = ChangePayload::created(json!({"id": 1}));
        let frame = framing::encode_change("/api/a", &payload).unwrap();
        let event = publish_until_received(&push, &mut sub, &frame).await;
        assert_eq!(event.payload, Some(payload));
    }

    #[tokio::test]
    async fn test_next_message_returns_pending_ack() {
        let relay = relay();
        let mut sub = Subscriber::connect(relay.egress_url()).unwrap();
        sub.subscribe("/api/a").unwrap();

        let event = tokio::time::timeout(
            Duration::from_secs(1),
            sub.next_message(Duration::from_millis(10)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(event.kind, EventKind::Subscribe);
    }
}
