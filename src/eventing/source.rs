//! Event Source - Listen capability injected into stores
//!
//! Stores never talk to a concrete event transport. They receive an
//! `Rc<dyn EventSource>` and register handlers through it, which keeps the
//! shell's process-wide channel out of the store and lets tests substitute
//! a fake.

use futures::future::LocalBoxFuture;
use std::fmt;

use crate::error::Result;
use crate::eventing::Event;

/// Callback invoked for each event delivered on a channel
pub type EventHandler = Box<dyn FnMut(&Event)>;

/// Pending registration. Resolves once the listener is live.
pub type ListenFuture = LocalBoxFuture<'static, Result<Unlisten>>;

/// Something that delivers named events to registered handlers
pub trait EventSource {
    /// Register `handler` on `channel`.
    ///
    /// Registration is asynchronous: events are only guaranteed to reach the
    /// handler after the returned future has resolved.
    fn listen(&self, channel: &str, handler: EventHandler) -> ListenFuture;
}

/// One-shot release handle for a registered listener
///
/// Dropping it without calling [`Unlisten::call`] leaves the listener registered.
#[must_use = "dropping an Unlisten keeps the listener registered"]
pub struct Unlisten(Box<dyn FnOnce()>);

impl Unlisten {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self(Box::new(release))
    }

    /// Release the listener
    pub fn call(self) {
        (self.0)()
    }
}

impl fmt::Debug for Unlisten {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unlisten")
    }
}
