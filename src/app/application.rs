//! Application - Wiring the shell, the event bus and the connection store
//!
//! ```text
//! tokio runtime                         UI thread
//! ConnectionShell ──EventEmitter──▶ EventBus ──▶ ConnectionStore ──▶ views
//! ```
//!
//! The UI thread is driven by [`Monitor::tick`]: tick the smol executor
//! (pending listen calls), pump shell events, tick again.

use chrono::Local;
use smol::LocalExecutor;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::constants::EVENT_PUMP_INTERVAL_MS;
use crate::domain::config::ConnectionConfig;
use crate::error::Result;
use crate::eventing::EventBus;
use crate::services::{ConnectionShell, ShellHandle, block_on, runtime_handle};
use crate::state::ConnectionStore;

/// UI-thread side of the application
pub struct Monitor {
    bus: Rc<EventBus>,
    executor: Rc<LocalExecutor<'static>>,
    store: ConnectionStore,
    shell: ShellHandle,
    shell_task: JoinHandle<()>,
}

impl Monitor {
    /// Spawn the shell on `runtime` and build the store on the current thread
    pub fn new(runtime: &Handle, connect_timeout: Duration) -> Self {
        let bus = Rc::new(EventBus::new());
        let executor = Rc::new(LocalExecutor::new());
        let (shell, shell_task) = ConnectionShell::spawn(runtime, bus.emitter(), connect_timeout);
        let store = ConnectionStore::new(bus.clone(), executor.clone());

        Self {
            bus,
            executor,
            store,
            shell,
            shell_task,
        }
    }

    pub fn store(&self) -> &ConnectionStore {
        &self.store
    }

    pub fn shell(&self) -> &ShellHandle {
        &self.shell
    }

    /// Run one UI loop iteration, waiting up to `timeout` for shell events.
    ///
    /// Returns the number of events dispatched.
    pub fn tick(&self, timeout: Duration) -> usize {
        while self.executor.try_tick() {}
        let dispatched = self.bus.pump(timeout);
        while self.executor.try_tick() {}
        dispatched
    }

    /// Stop the shell and hand back its task for joining
    pub fn shutdown(self) -> JoinHandle<()> {
        if let Err(err) = self.shell.shutdown() {
            tracing::debug!("Shell already stopped: {}", err);
        }
        self.shell_task
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Disconnect,
    Exit,
}

/// The first Ctrl+C disconnects, any further one exits
fn on_interrupt(shell: &ShellHandle, count: u32) -> Interrupt {
    if count > 1 {
        return Interrupt::Exit;
    }

    tracing::info!("Interrupted, disconnecting");
    if let Err(err) = shell.disconnect() {
        tracing::debug!("Shell already stopped: {}", err);
    }
    Interrupt::Disconnect
}

/// Connect to `ip:port`, print every state the store publishes and return
/// once the connection is back to `Disconnected`.
///
/// Returns the error attached to the final state, if any.
pub fn run_app(ip: &str, port: u16, config: &ConnectionConfig) -> Result<Option<String>> {
    let runtime = runtime_handle()?;
    let monitor = Monitor::new(&runtime, config.connect_timeout());

    let session_seen = Rc::new(Cell::new(false));
    let finished = Rc::new(Cell::new(false));
    let (seen, done) = (session_seen.clone(), finished.clone());
    let subscription = monitor.store().subscribe(move |state| {
        let suffix = if state.is_busy() { "..." } else { "" };
        println!("[{}] {}{}", Local::now().format("%H:%M:%S"), state, suffix);
        if state.is_connected() {
            println!("Press Ctrl+C to disconnect");
        }
        if state.is_active() {
            seen.set(true);
        } else if seen.get() {
            done.set(true);
        }
    });

    let interrupt = monitor.shell().clone();
    runtime.spawn(async move {
        let mut count = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            count += 1;
            if on_interrupt(&interrupt, count) == Interrupt::Exit {
                tracing::warn!("Interrupted again, exiting");
                std::process::exit(130);
            }
        }
    });

    // Let the listener register before the first state is emitted
    monitor.tick(Duration::ZERO);
    monitor.shell().connect(ip, port)?;
    println!("Connecting to {}:{}", ip, port);

    let interval = Duration::from_millis(EVENT_PUMP_INTERVAL_MS);
    while !finished.get() {
        monitor.tick(interval);
    }

    let last_error = monitor.store().last_error();
    subscription.unsubscribe();
    let task = monitor.shutdown();
    if let Err(err) = block_on(task)? {
        tracing::warn!("Shell task ended abnormally: {}", err);
    }

    Ok(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CONNECTION_STATE_CHANNEL;
    use crate::domain::connection::ConnectionState::{self, *};
    use std::cell::RefCell;
    use std::time::Instant;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn tick_until(monitor: &Monitor, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() && Instant::now() < deadline {
            monitor.tick(Duration::from_millis(20));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn store_mirrors_shell_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 16];
            let _ = socket.read(&mut buf).await;
        });

        let monitor = Monitor::new(&Handle::current(), Duration::from_secs(2));
        let seen: Rc<RefCell<Vec<ConnectionState>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = monitor.store().subscribe(move |state| sink.borrow_mut().push(state));
        monitor.tick(Duration::ZERO);
        assert_eq!(monitor.bus.listener_count(CONNECTION_STATE_CHANNEL), 1);

        monitor.shell().connect("127.0.0.1", port).expect("connect");
        tick_until(&monitor, || monitor.store().get() == Connected);

        monitor.shell().disconnect().expect("disconnect");
        tick_until(&monitor, || seen.borrow().len() >= 5);

        assert_eq!(
            *seen.borrow(),
            vec![Disconnected, Connecting, Connected, Disconnecting, Disconnected]
        );
        assert_eq!(monitor.store().last_error(), None);

        monitor.shutdown().await.expect("shell task");
        server.await.expect("server");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn listener_released_when_views_detach() {
        let monitor = Monitor::new(&Handle::current(), Duration::from_secs(1));

        let a = monitor.store().subscribe(|_| {});
        let b = monitor.store().subscribe(|_| {});
        monitor.tick(Duration::ZERO);
        assert_eq!(monitor.bus.listener_count(CONNECTION_STATE_CHANNEL), 1);

        drop(a);
        assert_eq!(monitor.bus.listener_count(CONNECTION_STATE_CHANNEL), 1);
        drop(b);
        assert_eq!(monitor.bus.listener_count(CONNECTION_STATE_CHANNEL), 0);

        monitor.shutdown().await.expect("shell task");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn first_interrupt_disconnects_second_exits() {
        let monitor = Monitor::new(&Handle::current(), Duration::from_secs(1));
        let shell = monitor.shell().clone();

        assert_eq!(on_interrupt(&shell, 1), Interrupt::Disconnect);
        assert_eq!(on_interrupt(&shell, 2), Interrupt::Exit);

        monitor.shutdown().await.expect("shell task");
        // shell is gone, the failed disconnect is only logged
        assert_eq!(on_interrupt(&shell, 1), Interrupt::Disconnect);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn refused_connect_surfaces_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let monitor = Monitor::new(&Handle::current(), Duration::from_secs(2));
        let _sub = monitor.store().subscribe(|_| {});
        monitor.tick(Duration::ZERO);

        monitor.shell().connect("127.0.0.1", port).expect("connect");
        tick_until(&monitor, || monitor.store().history().len() >= 2);

        let states: Vec<_> = monitor.store().history().into_iter().map(|c| c.state).collect();
        assert_eq!(states, vec![Connecting, Disconnected]);
        assert!(monitor.store().last_error().is_some());

        monitor.shutdown().await.expect("shell task");
    }
}
