//! State Supervisor
//!
//! Owns the shell-side connection state and publishes every transition on
//! the `connection_state` channel.

use crate::constants::CONNECTION_STATE_CHANNEL;
use crate::domain::connection::{ConnectionState, ConnectionStateEvent};
use crate::eventing::EventEmitter;
use std::sync::atomic::{AtomicU8, Ordering};

/// Tracks the current connection state and emits transitions
pub struct StateSupervisor {
    /// Event sender for state notifications
    emitter: EventEmitter,
    /// Current connection state
    state: AtomicU8,
}

fn encode(state: ConnectionState) -> u8 {
    match state {
        ConnectionState::Disconnected => 0,
        ConnectionState::Connecting => 1,
        ConnectionState::Connected => 2,
        ConnectionState::Disconnecting => 3,
    }
}

fn decode(raw: u8) -> ConnectionState {
    match raw {
        0 => ConnectionState::Disconnected,
        1 => ConnectionState::Connecting,
        2 => ConnectionState::Connected,
        _ => ConnectionState::Disconnecting,
    }
}

impl StateSupervisor {
    pub fn new(emitter: EventEmitter) -> Self {
        Self {
            emitter,
            state: AtomicU8::new(encode(ConnectionState::Disconnected)),
        }
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        decode(self.state.load(Ordering::SeqCst))
    }

    /// Move to `next` and notify listeners.
    ///
    /// Illegal transitions are logged but still applied.
    pub fn transition(&self, next: ConnectionState, error: Option<String>) {
        let previous = decode(self.state.swap(encode(next), Ordering::SeqCst));
        if !previous.can_transition_to(next) {
            tracing::warn!("Illegal connection transition {} -> {}", previous, next);
        }

        match &error {
            Some(error) => tracing::warn!("{} -> {}: {}", previous, next, error),
            None => tracing::info!("{} -> {}", previous, next),
        }

        let event = match error {
            Some(error) => ConnectionStateEvent::with_error(next, error),
            None => ConnectionStateEvent::new(next),
        };
        if let Err(err) = self.emitter.emit(CONNECTION_STATE_CHANNEL, &event) {
            tracing::debug!("Connection state not delivered: {}", err);
        }
    }
}

impl std::fmt::Debug for StateSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSupervisor")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventing::{Event, EventBus, EventSource, Unlisten};
    use futures::executor::block_on;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn capture(bus: &EventBus) -> (Rc<RefCell<Vec<ConnectionStateEvent>>>, Unlisten) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let unlisten = block_on(bus.listen(
            CONNECTION_STATE_CHANNEL,
            Box::new(move |ev: &Event| {
                sink.borrow_mut()
                    .push(ev.payload_as().expect("well-formed payload"))
            }),
        ))
        .expect("listen");
        (seen, unlisten)
    }

    #[test]
    fn encoding_round_trips() {
        for state in ConnectionState::ALL {
            assert_eq!(decode(encode(state)), state);
        }
    }

    #[test]
    fn transitions_are_emitted_in_order() {
        let bus = EventBus::new();
        let (seen, _unlisten) = capture(&bus);
        let supervisor = StateSupervisor::new(bus.emitter());

        supervisor.transition(ConnectionState::Connecting, None);
        supervisor.transition(
            ConnectionState::Disconnected,
            Some("connection refused".to_string()),
        );
        bus.dispatch_pending();

        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert_eq!(
            *seen.borrow(),
            vec![
                ConnectionStateEvent::new(ConnectionState::Connecting),
                ConnectionStateEvent::with_error(ConnectionState::Disconnected, "connection refused"),
            ]
        );
    }

    #[test]
    fn illegal_transition_is_still_applied() {
        let bus = EventBus::new();
        let supervisor = StateSupervisor::new(bus.emitter());
        supervisor.transition(ConnectionState::Connected, None);
        assert_eq!(supervisor.state(), ConnectionState::Connected);
    }

    #[test]
    fn emitting_without_bus_does_not_panic() {
        let bus = EventBus::new();
        let supervisor = StateSupervisor::new(bus.emitter());
        drop(bus);
        supervisor.transition(ConnectionState::Connecting, None);
        assert_eq!(supervisor.state(), ConnectionState::Connecting);
    }
}
