//! Service Layer
//!
//! The shell side of the application: owns the device connection and
//! publishes its state as events.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               ConnectionShell                 │
//! │  ┌──────────────┐     ┌───────────────────┐  │
//! │  │  TcpStream   │     │  StateSupervisor  │  │
//! │  │  (session)   │     │  (state + emit)   │  │
//! │  └──────────────┘     └───────────────────┘  │
//! └──────────────────────────────────────────────┘
//!                        │
//!                        ▼ "connection_state"
//! ┌──────────────────────────────────────────────┐
//! │          EventBus → ConnectionStore           │
//! └──────────────────────────────────────────────┘
//! ```

mod runtime;
mod shell;
mod supervisor;

pub use runtime::*;
pub use shell::*;
pub use supervisor::*;
