//! Constants
//!
//! Channel names, network defaults and buffer sizes shared across layers.

/// Event channel the shell publishes connection state on
pub const CONNECTION_STATE_CHANNEL: &str = "connection_state";

/// Default control port of the Vita server
pub const DEFAULT_PORT: u16 = 5000;

/// TCP connect timeout
pub const CONNECT_TIMEOUT_SECS: u64 = 25;

/// Read buffer for the session watcher
pub const SESSION_READ_BUFFER: usize = 2048;

/// Number of state changes kept by the connection store
pub const STATE_HISTORY_CAPACITY: usize = 64;

/// How long the UI loop blocks waiting for shell events
pub const EVENT_PUMP_INTERVAL_MS: u64 = 50;

/// Prefix of environment variables overriding config keys
pub const ENV_PREFIX: &str = "VITAPAD_";

/// Config file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Prefix of the rotated log files
pub const LOG_FILE_PREFIX: &str = "vitapad-gui.log";
