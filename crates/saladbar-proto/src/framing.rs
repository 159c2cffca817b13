//! Channel-tagged framing for broker messages.
//!
//! A broker frame is `[channel bytes][0x00][payload]`. The channel comes first
//! so that subscribers can use the broker's prefix matching: the topic for a
//! channel is the channel followed by the delimiter, which matches exactly that
//! channel and none that merely start with it.

use crate::event::{BrokerEvent, ChangePayload};
use crate::Error;

/// Maximum frame size (4 MB).
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Byte separating the channel from the payload.
pub const CHANNEL_DELIMITER: u8 = 0;

/// Subscription topic for `channel`.
pub fn topic(channel: &str) -> Vec<u8> {
    let mut topic = Vec::with_capacity(channel.len() + 1);
    topic.extend_from_slice(channel.as_bytes());
    topic.push(CHANNEL_DELIMITER);
    topic
}

/// Encode a payload for `channel`.
pub fn encode_frame(channel: &str, payload: &[u8]) -> Result<Vec<u8>, Error> {
    if channel.is_empty() {
        return Err(Error::InvalidFrame("channel must not be empty".to_string()));
    }
    if channel.as_bytes().contains(&CHANNEL_DELIMITER) {
        return Err(Error::InvalidFrame(
            "channel must not contain a NUL byte".to_string(),
        ));
    }

    let total = channel.len() + 1 + payload.len();
    if total > MAX_FRAME_SIZE {
        return Err(Error::InvalidFrame(format!(
            "frame size {} exceeds maximum {}",
            total, MAX_FRAME_SIZE
        )));
    }

    let mut frame = topic(channel);
    frame.reserve(payload.len());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Split a frame into its channel and payload.
pub fn decode_frame(frame: &[u8]) -> Result<(&str, &[u8]), Error> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(Error::InvalidFrame(format!(
            "frame size {} exceeds maximum {}",
            frame.len(),
            MAX_FRAME_SIZE
        )));
    }

    let split = frame
        .iter()
        .position(|&b| b == CHANNEL_DELIMITER)
        .ok_or_else(|| Error::InvalidFrame("missing channel delimiter".to_string()))?;
    if split == 0 {
        return Err(Error::InvalidFrame("empty channel".to_string()));
    }

    let channel = std::str::from_utf8(&frame[..split])
        .map_err(|e| Error::InvalidFrame(format!("channel is not utf-8: {}", e)))?;
    Ok((channel, &frame[split + 1..]))
}

/// Encode a change published on `channel`.
pub fn encode_change(channel: &str, payload: &ChangePayload) -> Result<Vec<u8>, Error> {
    encode_frame(channel, &payload.to_bytes()?)
}

/// Decode a frame into a `message` event.
pub fn decode_change(frame: &[u8]) -> Result<BrokerEvent, Error> {
    let (channel, payload) = decode_frame(frame)?;
    let payload = ChangePayload::from_slice(payload)?;
    Ok(BrokerEvent::message(channel, payload))
}
