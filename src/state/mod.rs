//! State - Reactive stores read by views
//!
//! Stores are single-threaded and live on the UI thread. Views subscribe and
//! get called back on every change:
//!
//! ```text
//! EventSource ──event──▶ store Setter ──notify──▶ view callbacks
//! ```

mod connection_store;
mod readable;

pub use connection_store::*;
pub use readable::*;
