//! Readable - Lazily started observable value
//!
//! A `Readable<T>` holds one value and a list of subscriber callbacks. The
//! producer passed to [`Readable::new`] is started when the first subscriber
//! attaches and stopped when the last one detaches:
//!
//! ```text
//! subscribers: 0 ──subscribe──▶ 1      start(setter) -> stop
//! subscribers: 1 ──detach────▶ 0      stop()
//! ```
//!
//! Notifications are queued per store, so a callback that sets the value
//! again cannot reorder what the remaining subscribers observe.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

/// Returned by a producer's start function, run on last detach
pub type StopNotifier = Box<dyn FnOnce()>;

type StartNotifier<T> = Box<dyn FnMut(Setter<T>) -> StopNotifier>;
type Callback<T> = Rc<RefCell<Box<dyn FnMut(&T)>>>;

struct Inner<T> {
    value: T,
    subscribers: Vec<(u64, Callback<T>)>,
    next_id: u64,
    start: Option<StartNotifier<T>>,
    stop: Option<StopNotifier>,
    queue: VecDeque<(u64, Callback<T>, T)>,
    notifying: bool,
}

impl<T> Inner<T> {
    fn is_subscribed(&self, id: u64) -> bool {
        self.subscribers.iter().any(|(sid, _)| *sid == id)
    }
}

/// Observable value with lazy producer start/stop
pub struct Readable<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Readable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Readable<T> {
    pub fn new(initial: T, start: impl FnMut(Setter<T>) -> StopNotifier + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                value: initial,
                subscribers: Vec::new(),
                next_id: 0,
                start: Some(Box::new(start)),
                stop: None,
                queue: VecDeque::new(),
                notifying: false,
            })),
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Attach `callback`. It runs now with the current value and again on every change.
    pub fn subscribe(&self, callback: impl FnMut(&T) + 'static) -> Subscription<T> {
        let first = self.inner.borrow().subscribers.is_empty();
        if first {
            self.run_start();
        }

        let callback: Callback<T> = Rc::new(RefCell::new(Box::new(callback)));
        let (id, current) = {
            let mut inner = self.inner.borrow_mut();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.subscribers.push((id, callback.clone()));
            (id, inner.value.clone())
        };

        if let Ok(mut callback) = callback.try_borrow_mut() {
            (*callback)(&current);
        }

        Subscription {
            inner: Some(self.inner.clone()),
            id,
        }
    }

    fn run_start(&self) {
        let start = self.inner.borrow_mut().start.take();
        let Some(mut start) = start else {
            return;
        };
        let setter = Setter {
            inner: Rc::downgrade(&self.inner),
        };
        let stop = start(setter);

        let mut inner = self.inner.borrow_mut();
        inner.start = Some(start);
        inner.stop = Some(stop);
    }
}

fn unsubscribe<T>(inner: &Rc<RefCell<Inner<T>>>, id: u64) {
    let stop = {
        let mut inner = inner.borrow_mut();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        if inner.subscribers.len() < before && inner.subscribers.is_empty() {
            inner.stop.take()
        } else {
            None
        }
    };

    if let Some(stop) = stop {
        stop();
    }
}

/// Write access handed to the producer
pub struct Setter<T> {
    inner: Weak<RefCell<Inner<T>>>,
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Setter<T> {
    /// Current value, `None` once the store is gone
    pub fn get(&self) -> Option<T> {
        self.inner.upgrade().map(|inner| inner.borrow().value.clone())
    }

    /// Replace the value and notify subscribers.
    ///
    /// Returns `false` when the value is unchanged or the store is gone.
    pub fn set(&self, value: T) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };

        let drain = {
            let mut guard = inner.borrow_mut();
            if guard.value == value {
                return false;
            }
            guard.value = value.clone();
            let pending: Vec<(u64, Callback<T>, T)> = guard
                .subscribers
                .iter()
                .map(|(id, cb)| (*id, cb.clone(), value.clone()))
                .collect();
            guard.queue.extend(pending);
            let drain = !guard.notifying;
            guard.notifying = true;
            drain
        };

        if drain {
            loop {
                let next = {
                    let mut guard = inner.borrow_mut();
                    match guard.queue.pop_front() {
                        Some((id, cb, value)) if guard.is_subscribed(id) => Some((cb, value)),
                        Some(_) => continue,
                        None => {
                            guard.notifying = false;
                            None
                        }
                    }
                };
                let Some((callback, value)) = next else {
                    break;
                };
                if let Ok(mut callback) = callback.try_borrow_mut() {
                    (*callback)(&value);
                }
            }
        }

        true
    }
}

/// Attachment handle. Dropping it detaches the callback.
#[must_use = "dropping a Subscription detaches it immediately"]
pub struct Subscription<T> {
    inner: Option<Rc<RefCell<Inner<T>>>>,
    id: u64,
}

impl<T> Subscription<T> {
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(inner) = self.inner.take() {
            unsubscribe(&inner, self.id);
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Probe {
        starts: Rc<Cell<usize>>,
        stops: Rc<Cell<usize>>,
        setter: Rc<RefCell<Option<Setter<i32>>>>,
    }

    fn probed(initial: i32) -> (Readable<i32>, Probe) {
        let probe = Probe {
            starts: Rc::new(Cell::new(0)),
            stops: Rc::new(Cell::new(0)),
            setter: Rc::new(RefCell::new(None)),
        };
        let (starts, stops, slot) = (
            probe.starts.clone(),
            probe.stops.clone(),
            probe.setter.clone(),
        );
        let store = Readable::new(initial, move |setter| {
            starts.set(starts.get() + 1);
            *slot.borrow_mut() = Some(setter);
            let stops = stops.clone();
            Box::new(move || stops.set(stops.get() + 1))
        });
        (store, probe)
    }

    fn set(probe: &Probe, value: i32) -> bool {
        probe
            .setter
            .borrow()
            .as_ref()
            .expect("store started")
            .set(value)
    }

    fn collect(store: &Readable<i32>) -> (Rc<RefCell<Vec<i32>>>, Subscription<i32>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let sub = store.subscribe(move |v| sink.borrow_mut().push(*v));
        (seen, sub)
    }

    #[test]
    fn start_is_lazy_and_shared() {
        let (store, probe) = probed(0);
        assert_eq!(probe.starts.get(), 0);

        let (_a, _sa) = collect(&store);
        let (_b, _sb) = collect(&store);
        assert_eq!(probe.starts.get(), 1);
        assert_eq!(store.subscriber_count(), 2);
    }

    #[test]
    fn subscriber_gets_current_value_immediately() {
        let (store, probe) = probed(7);
        let (seen, _sub) = collect(&store);
        assert_eq!(*seen.borrow(), vec![7]);

        assert!(set(&probe, 8));
        let (late, _late_sub) = collect(&store);
        assert_eq!(*late.borrow(), vec![8]);
    }

    #[test]
    fn stop_runs_once_on_last_detach() {
        let (store, probe) = probed(0);
        let (_a, sa) = collect(&store);
        let (_b, sb) = collect(&store);

        drop(sa);
        assert_eq!(probe.stops.get(), 0);
        sb.unsubscribe();
        assert_eq!(probe.stops.get(), 1);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn restart_after_full_detach() {
        let (store, probe) = probed(0);
        drop(collect(&store));
        let (_seen, _sub) = collect(&store);
        assert_eq!(probe.starts.get(), 2);
        assert_eq!(probe.stops.get(), 1);
    }

    #[test]
    fn equal_value_does_not_notify() {
        let (store, probe) = probed(1);
        let (seen, _sub) = collect(&store);
        assert!(!set(&probe, 1));
        assert!(set(&probe, 2));
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn nested_set_keeps_order_for_everyone() {
        let (store, probe) = probed(0);
        let setter = probe.setter.clone();

        let first_seen = Rc::new(RefCell::new(Vec::new()));
        let sink = first_seen.clone();
        let _first = store.subscribe(move |v| {
            sink.borrow_mut().push(*v);
            if *v == 1 {
                if let Some(setter) = setter.borrow().as_ref() {
                    setter.set(2);
                }
            }
        });
        let (second_seen, _second) = collect(&store);

        set(&probe, 1);
        assert_eq!(*first_seen.borrow(), vec![0, 1, 2]);
        assert_eq!(*second_seen.borrow(), vec![0, 1, 2]);
        assert_eq!(store.get(), 2);
    }

    #[test]
    fn setter_is_inert_after_store_dropped() {
        let (store, probe) = probed(0);
        let sub = store.subscribe(|_| {});
        let setter = probe.setter.borrow().clone().expect("started");
        drop(sub);
        drop(store);
        assert!(!setter.set(5));
        assert_eq!(setter.get(), None);
    }

    #[test]
    fn subscription_keeps_store_alive() {
        let (store, probe) = probed(0);
        let (seen, sub) = collect(&store);
        drop(store);
        assert!(set(&probe, 3));
        assert_eq!(*seen.borrow(), vec![0, 3]);
        drop(sub);
        assert_eq!(probe.stops.get(), 1);
    }
}
