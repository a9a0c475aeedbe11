//! Domain - Pure Data Structures and Wire Types
//!
//! These types have no dependency on the event loop or the runtime.

pub mod config;
pub mod connection;
