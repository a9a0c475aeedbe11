//! Event - Envelope delivered to channel listeners

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;

/// A named event as seen by a listener
#[derive(Debug, Clone)]
pub struct Event {
    /// Monotonic id assigned by the dispatching bus
    pub id: u32,
    /// Channel the event was emitted on
    pub channel: Arc<str>,
    /// JSON payload, shape defined by the channel
    pub payload: Value,
}

impl Event {
    pub fn new(id: u32, channel: impl Into<Arc<str>>, payload: Value) -> Self {
        Self {
            id,
            channel: channel.into(),
            payload,
        }
    }

    /// Deserialize the payload into the channel's typed form
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.payload)?)
    }
}
