//! Connection - Connection Lifecycle Types
//!
//! The state enum and the event envelope the shell publishes on the
//! `connection_state` channel.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Lifecycle phase of the device connection
///
/// Serialized as the bare variant name (`"Connecting"`), which is also the
/// wire form on the event channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No session, nothing in flight
    #[default]
    Disconnected,
    /// TCP connect in progress
    Connecting,
    /// Session established
    Connected,
    /// Local teardown in progress
    Disconnecting,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; 4] = [
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::Connected,
        ConnectionState::Disconnecting,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnecting => "Disconnecting",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// A transition is in flight
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// Whether the shell may move from `self` to `next`.
    ///
    /// Besides the main cycle, a failed connect and a lost peer both drop
    /// straight to `Disconnected`.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnecting)
                | (Connected, Disconnected)
                | (Disconnecting, Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ConnectionState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.label() == s)
            .ok_or_else(|| Error::Invalid {
                message: format!("unknown connection state '{s}'"),
            })
    }
}

/// Payload of a `connection_state` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStateEvent {
    /// State the shell just entered
    pub state: ConnectionState,
    /// Why the transition happened, when it was caused by a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionStateEvent {
    pub fn new(state: ConnectionState) -> Self {
        Self { state, error: None }
    }

    pub fn with_error(state: ConnectionState, error: impl Into<String>) -> Self {
        Self {
            state,
            error: Some(error.into()),
        }
    }
}
