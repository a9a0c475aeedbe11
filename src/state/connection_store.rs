//! ConnectionStore - Shell connection state mirrored into a readable store
//!
//! The store listens on the `connection_state` channel while at least one
//! view is subscribed. Exactly one listener is registered with the event
//! source per active period, whatever the number of views.
//!
//! Registration is asynchronous, so the listen handle can resolve after the
//! last view already detached. Each start owns a [`ListenSlot`]:
//!
//! ```text
//! Pending ──resolve──▶ Active(unlisten) ──stop──▶ Released   (unlisten called by stop)
//! Pending ──stop─────▶ Released ──resolve──▶ Released         (unlisten called on resolve)
//! ```

use chrono::{DateTime, Local};
use smol::LocalExecutor;
use std::cell::RefCell;
use std::rc::Rc;

use crate::constants::{CONNECTION_STATE_CHANNEL, STATE_HISTORY_CAPACITY};
use crate::domain::connection::{ConnectionState, ConnectionStateEvent};
use crate::eventing::{Event, EventHandler, EventSource, Unlisten};
use crate::helpers::BoundedDeque;
use crate::state::readable::{Readable, Setter, StopNotifier, Subscription};

/// A state the store published, with the local time it arrived
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub state: ConnectionState,
    pub at: DateTime<Local>,
}

enum ListenSlot {
    Pending,
    Active(Unlisten),
    Released,
}

impl ListenSlot {
    fn is_released(&self) -> bool {
        matches!(self, ListenSlot::Released)
    }
}

struct Journal {
    history: BoundedDeque<StateChange>,
    last_error: Option<String>,
}

/// Read-only view of the shell's connection state
#[derive(Clone)]
pub struct ConnectionStore {
    readable: Readable<ConnectionState>,
    journal: Rc<RefCell<Journal>>,
}

impl ConnectionStore {
    /// Create the store. Nothing is registered with `source` until the first subscribe.
    ///
    /// `executor` drives the asynchronous listen call and must be ticked by
    /// the UI loop.
    pub fn new(source: Rc<dyn EventSource>, executor: Rc<LocalExecutor<'static>>) -> Self {
        let journal = Rc::new(RefCell::new(Journal {
            history: BoundedDeque::new(STATE_HISTORY_CAPACITY),
            last_error: None,
        }));

        let start_journal = journal.clone();
        let readable = Readable::new(ConnectionState::default(), move |setter| {
            start_listening(&source, &executor, setter, start_journal.clone())
        });

        Self { readable, journal }
    }

    /// Attach a view. `callback` runs now and after every state change.
    pub fn subscribe(
        &self,
        mut callback: impl FnMut(ConnectionState) + 'static,
    ) -> Subscription<ConnectionState> {
        self.readable.subscribe(move |state| callback(*state))
    }

    pub fn get(&self) -> ConnectionState {
        self.readable.get()
    }

    pub fn subscriber_count(&self) -> usize {
        self.readable.subscriber_count()
    }

    /// Published states, oldest first
    pub fn history(&self) -> Vec<StateChange> {
        self.journal.borrow().history.iter().cloned().collect()
    }

    /// Error attached to the most recent state change, if any
    pub fn last_error(&self) -> Option<String> {
        self.journal.borrow().last_error.clone()
    }
}

fn start_listening(
    source: &Rc<dyn EventSource>,
    executor: &Rc<LocalExecutor<'static>>,
    setter: Setter<ConnectionState>,
    journal: Rc<RefCell<Journal>>,
) -> StopNotifier {
    let slot = Rc::new(RefCell::new(ListenSlot::Pending));
    let pending = source.listen(
        CONNECTION_STATE_CHANNEL,
        state_handler(setter, slot.clone(), journal),
    );
    tracing::debug!("Listening on {}", CONNECTION_STATE_CHANNEL);

    let resolved_slot = slot.clone();
    executor
        .spawn(async move {
            match pending.await {
                Ok(unlisten) => {
                    let released = resolved_slot.borrow().is_released();
                    if released {
                        tracing::debug!("Store detached before listen resolved, releasing");
                        unlisten.call();
                    } else {
                        *resolved_slot.borrow_mut() = ListenSlot::Active(unlisten);
                    }
                }
                Err(err) => {
                    tracing::warn!("Connection state listener unavailable: {}", err);
                }
            }
        })
        .detach();

    Box::new(move || {
        let previous = std::mem::replace(&mut *slot.borrow_mut(), ListenSlot::Released);
        if let ListenSlot::Active(unlisten) = previous {
            unlisten.call();
            tracing::debug!("Released {} listener", CONNECTION_STATE_CHANNEL);
        }
    })
}

fn state_handler(
    setter: Setter<ConnectionState>,
    slot: Rc<RefCell<ListenSlot>>,
    journal: Rc<RefCell<Journal>>,
) -> EventHandler {
    Box::new(move |event: &Event| {
        if slot.borrow().is_released() {
            tracing::trace!(id = event.id, "Dropping event delivered after teardown");
            return;
        }

        let payload: ConnectionStateEvent = match event.payload_as() {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(id = event.id, "Ignoring malformed connection state payload: {}", err);
                return;
            }
        };

        if setter.get() == Some(payload.state) {
            tracing::trace!(state = %payload.state, "Duplicate connection state");
            return;
        }

        if let Some(error) = &payload.error {
            tracing::warn!(state = %payload.state, "Connection state changed: {}", error);
        } else {
            tracing::info!(state = %payload.state, "Connection state changed");
        }

        {
            let mut journal = journal.borrow_mut();
            journal.history.push(StateChange {
                state: payload.state,
                at: Local::now(),
            });
            journal.last_error = payload.error;
        }

        setter.set(payload.state);
    })
}

impl std::fmt::Debug for ConnectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStore")
            .field("state", &self.get())
            .field("subscribers", &self.subscriber_count())
            .field("history", &self.journal.borrow().history.len())
            .finish()
    }
}
