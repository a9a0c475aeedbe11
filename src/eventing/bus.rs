//! Event Bus - In-process implementation of [`EventSource`]
//!
//! ```text
//! shell thread(s)                         UI thread
//! EventEmitter::emit ──crossbeam──▶ EventBus::pump ──▶ handlers (by channel)
//! ```
//!
//! Handlers are plain `FnMut` closures owned by the UI thread, so the bus
//! itself is `!Send`. Only the emitter crosses threads.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::eventing::{Event, EventHandler, EventSource, ListenFuture, Unlisten};

/// Event as it travels from an emitter to the bus, before an id is assigned
#[derive(Debug)]
struct Emitted {
    channel: Arc<str>,
    payload: Value,
}

/// Thread-safe handle for publishing events to an [`EventBus`]
#[derive(Clone, Debug)]
pub struct EventEmitter {
    tx: Sender<Emitted>,
}

impl EventEmitter {
    /// Serialize `payload` and queue it on `channel`
    pub fn emit<T: Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        let payload = serde_json::to_value(payload)?;
        self.tx
            .send(Emitted {
                channel: channel.into(),
                payload,
            })
            .map_err(|_| Error::ChannelSend {
                message: format!("event bus dropped, '{channel}' event lost"),
            })
    }
}

struct Listener {
    id: u64,
    channel: Arc<str>,
    handler: Rc<RefCell<EventHandler>>,
}

#[derive(Default)]
struct Registry {
    listeners: Vec<Listener>,
    next_listener_id: u64,
    next_event_id: u32,
}

impl Registry {
    fn is_registered(&self, id: u64) -> bool {
        self.listeners.iter().any(|l| l.id == id)
    }
}

/// Single-threaded event dispatcher
pub struct EventBus {
    registry: Rc<RefCell<Registry>>,
    tx: Sender<Emitted>,
    rx: Receiver<Emitted>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            registry: Rc::new(RefCell::new(Registry::default())),
            tx,
            rx,
        }
    }

    /// Create an emitter feeding this bus
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            tx: self.tx.clone(),
        }
    }

    /// Number of live listeners on `channel`
    pub fn listener_count(&self, channel: &str) -> usize {
        self.registry
            .borrow()
            .listeners
            .iter()
            .filter(|l| &*l.channel == channel)
            .count()
    }

    /// Deliver an event to every listener on `channel`. Returns the event id.
    ///
    /// Listeners removed by an earlier handler in the same dispatch are skipped.
    pub fn dispatch(&self, channel: &str, payload: Value) -> u32 {
        let (event, targets) = {
            let mut registry = self.registry.borrow_mut();
            registry.next_event_id = registry.next_event_id.wrapping_add(1);
            let event = Event::new(registry.next_event_id, channel, payload);
            let targets: Vec<(u64, Rc<RefCell<EventHandler>>)> = registry
                .listeners
                .iter()
                .filter(|l| &*l.channel == channel)
                .map(|l| (l.id, l.handler.clone()))
                .collect();
            (event, targets)
        };

        tracing::trace!(
            channel,
            id = event.id,
            listeners = targets.len(),
            "Dispatching event"
        );

        for (id, handler) in targets {
            if !self.registry.borrow().is_registered(id) {
                continue;
            }
            match handler.try_borrow_mut() {
                Ok(mut handler) => (*handler)(&event),
                Err(_) => tracing::warn!(channel, "Listener re-entered during dispatch, skipped"),
            }
        }

        event.id
    }

    /// Dispatch everything already queued by emitters without blocking
    pub fn dispatch_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(emitted) = self.rx.try_recv() {
            self.dispatch(&emitted.channel, emitted.payload);
            count += 1;
        }
        count
    }

    /// Wait up to `timeout` for the first queued event, then drain the queue.
    ///
    /// Returns the number of events dispatched.
    pub fn pump(&self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(emitted) => {
                self.dispatch(&emitted.channel, emitted.payload);
                1 + self.dispatch_pending()
            }
            Err(RecvTimeoutError::Timeout) => 0,
            // The bus holds a sender itself, so this is unreachable in practice
            Err(RecvTimeoutError::Disconnected) => 0,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn register(registry: &Weak<RefCell<Registry>>, channel: &str, handler: EventHandler) -> Result<Unlisten> {
    let Some(strong) = registry.upgrade() else {
        return Err(Error::Listen {
            channel: channel.to_string(),
            message: "event bus dropped".to_string(),
        });
    };

    let id = {
        let mut registry = strong.borrow_mut();
        registry.next_listener_id += 1;
        let id = registry.next_listener_id;
        registry.listeners.push(Listener {
            id,
            channel: channel.into(),
            handler: Rc::new(RefCell::new(handler)),
        });
        id
    };
    tracing::debug!(channel, id, "Listener registered");

    let registry = registry.clone();
    let channel = channel.to_string();
    Ok(Unlisten::new(move || {
        if let Some(registry) = registry.upgrade() {
            registry.borrow_mut().listeners.retain(|l| l.id != id);
            tracing::debug!(channel = %channel, id, "Listener released");
        }
    }))
}

impl EventSource for EventBus {
    fn listen(&self, channel: &str, handler: EventHandler) -> ListenFuture {
        let registry = Rc::downgrade(&self.registry);
        let channel = channel.to_string();
        async move { register(&registry, &channel, handler) }.boxed_local()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.registry.borrow().listeners.len())
            .field("queued", &self.rx.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;
    use std::cell::Cell;

    fn recorder() -> (Rc<RefCell<Vec<Event>>>, EventHandler) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, Box::new(move |ev: &Event| sink.borrow_mut().push(ev.clone())))
    }

    #[test]
    fn registration_happens_when_polled() {
        let bus = EventBus::new();
        let (seen, handler) = recorder();

        let pending = bus.listen("a", handler);
        bus.dispatch("a", json!(1));
        assert_eq!(bus.listener_count("a"), 0);

        let _unlisten = block_on(pending).expect("listen");
        bus.dispatch("a", json!(2));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].payload, json!(2));
    }

    #[test]
    fn delivers_only_to_matching_channel() {
        let bus = EventBus::new();
        let (a_seen, a) = recorder();
        let (b_seen, b) = recorder();
        let _ua = block_on(bus.listen("a", a)).expect("listen a");
        let _ub = block_on(bus.listen("b", b)).expect("listen b");

        bus.dispatch("a", json!("x"));

        assert_eq!(a_seen.borrow().len(), 1);
        assert_eq!(&*a_seen.borrow()[0].channel, "a");
        assert!(b_seen.borrow().is_empty());
    }

    #[test]
    fn unlisten_stops_delivery() {
        let bus = EventBus::new();
        let (seen, handler) = recorder();
        let unlisten = block_on(bus.listen("a", handler)).expect("listen");

        bus.dispatch("a", json!(1));
        unlisten.call();
        bus.dispatch("a", json!(2));

        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(bus.listener_count("a"), 0);
    }

    #[test]
    fn listener_removed_mid_dispatch_is_skipped() {
        let bus = EventBus::new();
        let slot: Rc<RefCell<Option<Unlisten>>> = Rc::new(RefCell::new(None));
        let second_calls = Rc::new(Cell::new(0));

        let slot_in_first = slot.clone();
        let _first = block_on(bus.listen(
            "a",
            Box::new(move |_: &Event| {
                if let Some(unlisten) = slot_in_first.borrow_mut().take() {
                    unlisten.call();
                }
            }),
        ))
        .expect("listen first");

        let calls = second_calls.clone();
        let second = block_on(bus.listen("a", Box::new(move |_: &Event| calls.set(calls.get() + 1))))
            .expect("listen second");
        *slot.borrow_mut() = Some(second);

        bus.dispatch("a", json!(null));
        assert_eq!(second_calls.get(), 0);
    }

    #[test]
    fn event_ids_increase() {
        let bus = EventBus::new();
        let first = bus.dispatch("a", json!(null));
        let second = bus.dispatch("b", json!(null));
        assert!(second > first);
    }

    #[test]
    fn pump_drains_emitters_from_other_threads() {
        let bus = EventBus::new();
        let (seen, handler) = recorder();
        let _unlisten = block_on(bus.listen("ch", handler)).expect("listen");

        let emitter = bus.emitter();
        std::thread::spawn(move || {
            for i in 0..3 {
                emitter.emit("ch", &i).expect("emit");
            }
        })
        .join()
        .expect("emitter thread");

        assert_eq!(bus.pump(Duration::from_millis(500)), 3);
        let payloads: Vec<Value> = seen.borrow().iter().map(|e| e.payload.clone()).collect();
        assert_eq!(payloads, vec![json!(0), json!(1), json!(2)]);
    }

    #[test]
    fn pump_times_out_when_idle() {
        let bus = EventBus::new();
        assert_eq!(bus.pump(Duration::from_millis(10)), 0);
    }

    #[test]
    fn emit_after_bus_dropped_fails() {
        let bus = EventBus::new();
        let emitter = bus.emitter();
        drop(bus);
        assert!(matches!(
            emitter.emit("ch", &1),
            Err(Error::ChannelSend { .. })
        ));
    }

    #[test]
    fn listen_after_bus_dropped_fails() {
        let bus = EventBus::new();
        let pending = bus.listen("ch", Box::new(|_: &Event| {}));
        drop(bus);
        assert!(matches!(block_on(pending), Err(Error::Listen { .. })));
    }
}
