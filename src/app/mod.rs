//! Application Layer
//!
//! Wires the connection shell, the event bus and the UI stores together.

pub mod application;
