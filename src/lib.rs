//! VitaPad GUI Library
//!
//! Presentation-side plumbing of the VitaPad desktop client: the shell that
//! owns the control connection to the Vita, the event bus carrying its
//! notifications, and the reactive stores views read from.

pub mod app;
pub mod constants;
pub mod domain;
pub mod error;
pub mod eventing;
pub mod helpers;
pub mod services;
pub mod state;
