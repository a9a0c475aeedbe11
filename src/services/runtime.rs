//! Tokio Runtime
//!
//! The UI loop is a single-threaded smol executor; the shell's sockets need
//! tokio. This module owns the process-wide tokio runtime the shell runs on.
//!
//! ```text
//! UI thread (smol LocalExecutor)        tokio runtime
//!   ShellHandle::connect ──mpsc──▶ ConnectionShell task
//!   EventBus::pump      ◀──crossbeam── StateSupervisor
//! ```

use std::future::Future;
use std::sync::OnceLock;
use tokio::runtime::Runtime;

use crate::error::Result;

/// Global tokio runtime instance
static TOKIO_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Get or initialize the global tokio runtime
fn get_runtime() -> Result<&'static Runtime> {
    if let Some(runtime) = TOKIO_RUNTIME.get() {
        return Ok(runtime);
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("vitapad-shell")
        .enable_all()
        .build()?;
    Ok(TOKIO_RUNTIME.get_or_init(|| runtime))
}

/// Get a handle to the tokio runtime
pub fn runtime_handle() -> Result<tokio::runtime::Handle> {
    Ok(get_runtime()?.handle().clone())
}

/// Block on a future synchronously
///
/// **Warning**: This blocks the current thread. Use only at startup or
/// shutdown, never from inside the UI loop.
pub fn block_on<F, T>(future: F) -> Result<T>
where
    F: Future<Output = T>,
{
    Ok(get_runtime()?.block_on(future))
}
