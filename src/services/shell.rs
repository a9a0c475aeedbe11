//! Connection Shell
//!
//! Owns the real TCP control connection to the Vita and drives the
//! connection state machine. Every transition is published through the
//! [`StateSupervisor`]; UI stores only ever see the resulting events.
//!
//! ```text
//! ShellHandle ──ShellCommand──▶ ConnectionShell ──transition──▶ StateSupervisor ──▶ EventEmitter
//!                                   ▲
//!               session watcher ────┘ PeerClosed
//! ```

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::task::JoinHandle;

use crate::constants::SESSION_READ_BUFFER;
use crate::domain::connection::ConnectionState;
use crate::error::{Error, Result};
use crate::eventing::EventEmitter;
use crate::services::supervisor::StateSupervisor;

/// Commands processed by the shell task
#[derive(Debug)]
enum ShellCommand {
    Connect { ip: String, port: u16 },
    Disconnect,
    Shutdown,
    /// Sent by a session watcher when its socket ends
    PeerClosed { session: u64, reason: String },
}

/// Cloneable control handle for a running [`ConnectionShell`]
#[derive(Clone, Debug)]
pub struct ShellHandle {
    tx: UnboundedSender<ShellCommand>,
}

impl ShellHandle {
    fn send(&self, cmd: ShellCommand) -> Result<()> {
        self.tx.send(cmd).map_err(|e| Error::ChannelSend {
            message: format!("connection shell stopped, {:?} dropped", e.0),
        })
    }

    /// Open a control connection to `ip:port`
    pub fn connect(&self, ip: impl Into<String>, port: u16) -> Result<()> {
        self.send(ShellCommand::Connect {
            ip: ip.into(),
            port,
        })
    }

    /// Close the current connection, if any
    pub fn disconnect(&self) -> Result<()> {
        self.send(ShellCommand::Disconnect)
    }

    /// Close the current connection and stop the shell task
    pub fn shutdown(&self) -> Result<()> {
        self.send(ShellCommand::Shutdown)
    }
}

struct Session {
    id: u64,
    writer: OwnedWriteHalf,
    watcher: JoinHandle<()>,
}

/// Shell task state
pub struct ConnectionShell {
    supervisor: StateSupervisor,
    connect_timeout: Duration,
    rx: UnboundedReceiver<ShellCommand>,
    /// Weak so the task ends once every handle is gone
    tx: WeakUnboundedSender<ShellCommand>,
    session: Option<Session>,
    next_session: u64,
    /// Set once a shutdown arrived, possibly while a connect was pending
    stopping: bool,
}

impl ConnectionShell {
    fn new(emitter: EventEmitter, connect_timeout: Duration) -> (ShellHandle, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shell = Self {
            supervisor: StateSupervisor::new(emitter),
            connect_timeout,
            rx,
            tx: tx.downgrade(),
            session: None,
            next_session: 0,
            stopping: false,
        };
        (ShellHandle { tx }, shell)
    }

    /// Spawn the shell on `runtime`.
    ///
    /// The task ends on [`ShellHandle::shutdown`] or when every handle is dropped.
    pub fn spawn(
        runtime: &Handle,
        emitter: EventEmitter,
        connect_timeout: Duration,
    ) -> (ShellHandle, JoinHandle<()>) {
        let (handle, shell) = Self::new(emitter, connect_timeout);
        let task = runtime.spawn(shell.run());
        (handle, task)
    }

    async fn run(mut self) {
        tracing::info!("Connection shell started");

        while !self.stopping {
            let Some(cmd) = self.rx.recv().await else {
                break;
            };
            tracing::debug!(?cmd, "Shell command");
            match cmd {
                ShellCommand::Connect { ip, port } => {
                    self.connect(&ip, port, TcpStream::connect((ip.as_str(), port)))
                        .await
                }
                ShellCommand::Disconnect => self.disconnect().await,
                ShellCommand::PeerClosed { session, reason } => self.peer_closed(session, reason),
                ShellCommand::Shutdown => self.stopping = true,
            }
        }

        self.disconnect().await;
        tracing::info!("Connection shell stopped");
    }

    /// Run `attempt` as the connection to `ip:port`.
    ///
    /// A `Disconnect` or `Shutdown` received while the attempt is pending
    /// abandons it.
    async fn connect<F>(&mut self, ip: &str, port: u16, attempt: F)
    where
        F: Future<Output = std::io::Result<TcpStream>>,
    {
        let current = self.supervisor.state();
        if current != ConnectionState::Disconnected {
            tracing::warn!("Ignoring connect to {}:{} while {}", ip, port, current);
            return;
        }

        self.supervisor.transition(ConnectionState::Connecting, None);

        let attempt = tokio::time::timeout(self.connect_timeout, attempt);
        tokio::pin!(attempt);

        let outcome = loop {
            let cmd = tokio::select! {
                outcome = &mut attempt => break Some(outcome),
                cmd = self.rx.recv() => cmd,
            };
            match cmd {
                Some(ShellCommand::Disconnect) => break None,
                Some(ShellCommand::Shutdown) | None => {
                    self.stopping = true;
                    break None;
                }
                Some(ShellCommand::Connect { ip: other, port: other_port }) => {
                    tracing::warn!("Ignoring connect to {}:{} while connecting", other, other_port);
                }
                Some(ShellCommand::PeerClosed { session, .. }) => {
                    tracing::trace!(session, "Stale session close ignored");
                }
            }
        };

        let stream = match outcome {
            Some(Ok(Ok(stream))) => stream,
            Some(Ok(Err(err))) => {
                let error = Error::Connection {
                    message: format!("failed to connect to {ip}:{port}: {err}"),
                };
                self.supervisor
                    .transition(ConnectionState::Disconnected, Some(error.to_string()));
                return;
            }
            Some(Err(_)) => {
                let error = Error::Timeout {
                    message: format!(
                        "no answer from {ip}:{port} after {}s",
                        self.connect_timeout.as_secs()
                    ),
                };
                self.supervisor
                    .transition(ConnectionState::Disconnected, Some(error.to_string()));
                return;
            }
            None => {
                tracing::info!("Connect to {}:{} abandoned", ip, port);
                self.supervisor
                    .transition(ConnectionState::Disconnected, None);
                return;
            }
        };

        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY: {}", err);
        }

        let (reader, writer) = stream.into_split();
        self.next_session += 1;
        let id = self.next_session;
        let watcher = tokio::spawn(watch_session(reader, id, self.tx.clone()));
        self.session = Some(Session { id, writer, watcher });

        self.supervisor.transition(ConnectionState::Connected, None);
    }

    async fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            tracing::debug!("No session to disconnect");
            return;
        };

        self.supervisor
            .transition(ConnectionState::Disconnecting, None);
        session.watcher.abort();
        if let Err(err) = session.writer.shutdown().await {
            tracing::debug!("Socket shutdown failed: {}", err);
        }
        self.supervisor
            .transition(ConnectionState::Disconnected, None);
    }

    fn peer_closed(&mut self, session: u64, reason: String) {
        match &self.session {
            Some(current) if current.id == session => {}
            _ => {
                tracing::trace!(session, "Stale session close ignored");
                return;
            }
        }

        self.session = None;
        self.supervisor
            .transition(ConnectionState::Disconnected, Some(reason));
    }
}

/// Drain the control socket until it ends, then report back to the shell
async fn watch_session(mut reader: OwnedReadHalf, session: u64, tx: WeakUnboundedSender<ShellCommand>) {
    let mut buf = vec![0u8; SESSION_READ_BUFFER];
    let reason = loop {
        match reader.read(&mut buf).await {
            Ok(0) => break "connection closed by peer".to_string(),
            Ok(n) => tracing::trace!(session, bytes = n, "Control data received"),
            Err(err) => break format!("connection lost: {err}"),
        }
    };

    if let Some(tx) = tx.upgrade() {
        let _ = tx.send(ShellCommand::PeerClosed { session, reason });
    }
}
