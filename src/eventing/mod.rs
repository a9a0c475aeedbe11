//! Eventing - Named event channels between the shell and UI stores

mod bus;
mod event;
mod source;

pub use bus::*;
pub use event::*;
pub use source::*;
