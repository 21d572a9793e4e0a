//! Command/Idle Coordinator
//!
//! The remote drops the link when it sees no byte for too long, so an idle
//! byte goes out every interval while no command is in flight. A command
//! preempts the heartbeat:
//!
//! ```text
//!   command ──► cancel heartbeat ──► join ──► write byte ──► restart heartbeat
//! ```
//!
//! The heartbeat is always joined before the command byte is written, and the
//! [`Connection`] additionally sits behind an async mutex, so writes on the
//! link are totally ordered. At most one heartbeat task exists at a time.

use crate::domain::models::{
    AppEvent, ConnectionStatus, MessageSeverity, SessionCommand, StatusMessage,
};
use crate::domain::state::{CoordinatorState, Transition};
use crate::infrastructure::bluetooth::connection::{Connection, ConnectionError};
use crate::infrastructure::bluetooth::protocol::{Command, HEARTBEAT_INTERVAL_MS, IDLE_BYTE};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Timing configuration for the coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Delay between idle bytes
    pub heartbeat_interval: Duration,
    /// How long a command waits for the heartbeat to acknowledge cancellation
    /// before the heartbeat task is aborted
    pub cancel_join_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL_MS),
            cancel_join_timeout: Duration::from_secs(2),
        }
    }
}

/// What happened to a dispatched command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// The write failed; heartbeating was restarted
    Failed,
    /// No usable connection; nothing was written
    NotConnected,
    /// The session has been torn down
    Rejected,
}

/// Why a heartbeat task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeartbeatExit {
    Cancelled,
    WriteFailed,
    NotConnected,
}

#[derive(Default)]
struct HeartbeatStats {
    started: AtomicUsize,
    live: AtomicUsize,
    peak: AtomicUsize,
}

/// Counts a heartbeat as live for as long as its task body runs
struct LiveGuard(Arc<HeartbeatStats>);

impl LiveGuard {
    fn enter(stats: &Arc<HeartbeatStats>) -> Self {
        let live = stats.live.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak.fetch_max(live, Ordering::SeqCst);
        Self(stats.clone())
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Handle to the running heartbeat task
struct Heartbeat {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<HeartbeatExit>,
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        // No-op once joined; stops a heartbeat whose coordinator went away
        self.handle.abort();
    }
}

/// Arbitrates between command bytes and the idle heartbeat on one connection
pub struct Coordinator {
    connection: Arc<Mutex<Connection>>,
    state: Arc<watch::Sender<CoordinatorState>>,
    heartbeat: Option<Heartbeat>,
    stats: Arc<HeartbeatStats>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Take ownership of `connection` for the rest of the session
    pub fn new(
        connection: Connection,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        config: CoordinatorConfig,
    ) -> Self {
        let (state, _) = watch::channel(CoordinatorState::Idle);
        Self {
            connection: Arc::new(Mutex::new(connection)),
            state: Arc::new(state),
            heartbeat: None,
            stats: Arc::new(HeartbeatStats::default()),
            event_sender,
            config,
        }
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state.subscribe()
    }

    /// Check if a heartbeat task is currently alive
    #[cfg(test)]
    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat
            .as_ref()
            .is_some_and(|heartbeat| !heartbeat.handle.is_finished())
    }

    /// Number of heartbeat tasks spawned so far
    pub fn heartbeats_started(&self) -> usize {
        self.stats.started.load(Ordering::SeqCst)
    }

    /// Begin idle signaling
    pub async fn start(&mut self) {
        if self.state().is_terminal() {
            debug!("Not starting heartbeat in state {:?}", self.state());
            return;
        }
        if !self.connection.lock().await.is_open() {
            warn!("Starting idle signal without an open connection");
        }
        self.restart_heartbeat().await;
    }

    /// Preempt the heartbeat, write `command`, then resume the heartbeat
    pub async fn dispatch(&mut self, command: Command) -> DispatchOutcome {
        if self.state() == CoordinatorState::Stopped {
            debug!("Session stopped, dropping {}", command);
            return DispatchOutcome::Rejected;
        }

        self.stop_heartbeat().await;

        // The heartbeat may have found the link dead before it saw the cancel
        if !self.state().accepts_commands() {
            warn!("Cannot send {}: link is {:?}", command, self.state());
            self.send_event(AppEvent::NotConnected {
                command: Some(command),
            });
            return DispatchOutcome::NotConnected;
        }

        apply(&self.state, Transition::CommandReceived);

        let result = self.connection.lock().await.write(command.as_byte()).await;
        let outcome = match result {
            Ok(()) => {
                info!("Sent {}", command);
                self.send_event(AppEvent::CommandSent(command));
                DispatchOutcome::Sent
            }
            Err(ConnectionError::NotConnected) => {
                warn!("Cannot send {}: not connected", command);
                self.send_event(AppEvent::NotConnected {
                    command: Some(command),
                });
                DispatchOutcome::NotConnected
            }
            Err(e) => {
                warn!("Command {} failed: {}", command, e);
                self.send_event(AppEvent::CommandFailed {
                    command,
                    reason: e.to_string(),
                });
                DispatchOutcome::Failed
            }
        };

        // Restart regardless of the outcome. A failed command leaves the link
        // open, so the next idle byte decides whether it is still alive.
        apply(&self.state, Transition::DispatchFinished);
        self.restart_heartbeat().await;

        outcome
    }

    /// Stop the heartbeat and close the connection. Idempotent.
    pub async fn teardown(&mut self) {
        if self.state() == CoordinatorState::Stopped {
            debug!("Teardown requested on stopped session");
            return;
        }

        self.stop_heartbeat().await;
        {
            let mut connection = self.connection.lock().await;
            connection.close().await;
            info!(
                "Session with {} stopped after {} heartbeat start(s)",
                connection.peer(),
                self.heartbeats_started()
            );
        }
        apply(&self.state, Transition::Teardown);
        self.send_event(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
    }

    /// Serve session commands until `Shutdown` or until the sender goes away
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        self.start().await;

        while let Some(command) = commands.recv().await {
            match command {
                SessionCommand::Send(command) => {
                    self.dispatch(command).await;
                }
                SessionCommand::Shutdown => break,
            }
        }

        self.teardown().await;
    }

    async fn restart_heartbeat(&mut self) {
        self.stop_heartbeat().await;

        let (cancel, cancel_rx) = watch::channel(false);
        let task = HeartbeatTask {
            connection: self.connection.clone(),
            cancel: cancel_rx,
            interval: self.config.heartbeat_interval,
            state: self.state.clone(),
            stats: self.stats.clone(),
            event_sender: self.event_sender.clone(),
        };

        self.stats.started.fetch_add(1, Ordering::SeqCst);
        let handle = tokio::spawn(task.run());
        self.heartbeat = Some(Heartbeat { cancel, handle });
    }

    /// Request cancellation and wait for the heartbeat to acknowledge it
    async fn stop_heartbeat(&mut self) {
        let Some(mut heartbeat) = self.heartbeat.take() else {
            return;
        };

        let _ = heartbeat.cancel.send(true);

        let joined =
            tokio::time::timeout(self.config.cancel_join_timeout, &mut heartbeat.handle).await;
        match joined {
            Ok(Ok(exit)) => trace!("Heartbeat stopped: {:?}", exit),
            Ok(Err(e)) => warn!("Heartbeat task ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "Heartbeat did not stop within {:?}, aborting it",
                    self.config.cancel_join_timeout
                );
                heartbeat.handle.abort();
                // Aborting drops the task, which releases the connection lock
                let _ = (&mut heartbeat.handle).await;
                self.send_event(AppEvent::LogMessage(StatusMessage::new(
                    "Idle signal was stuck and has been restarted",
                    MessageSeverity::Warning,
                )));
            }
        }
    }

    fn send_event(&self, event: AppEvent) {
        let _ = self.event_sender.send(event);
    }
}

/// Body of one heartbeat task
struct HeartbeatTask {
    connection: Arc<Mutex<Connection>>,
    cancel: watch::Receiver<bool>,
    interval: Duration,
    state: Arc<watch::Sender<CoordinatorState>>,
    stats: Arc<HeartbeatStats>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl HeartbeatTask {
    async fn run(mut self) -> HeartbeatExit {
        let _live = LiveGuard::enter(&self.stats);

        loop {
            if *self.cancel.borrow() {
                return HeartbeatExit::Cancelled;
            }

            let result = {
                let mut connection = self.connection.lock().await;
                let result = connection.write(IDLE_BYTE).await;
                // A dead keep-alive means a dead link; commands stop here too
                if result.is_err() {
                    connection.fault();
                }
                result
            };
            match result {
                Ok(()) => trace!("Idle byte sent"),
                Err(ConnectionError::NotConnected) => {
                    warn!("Idle signal stopped: not connected");
                    let _ = self
                        .event_sender
                        .send(AppEvent::NotConnected { command: None });
                    apply(&self.state, Transition::ConnectionLost);
                    return HeartbeatExit::NotConnected;
                }
                Err(e) => {
                    error!("Idle signal failed: {}", e);
                    let _ = self.event_sender.send(AppEvent::HeartbeatFailed {
                        reason: e.to_string(),
                    });
                    apply(&self.state, Transition::HeartbeatFailed);
                    return HeartbeatExit::WriteFailed;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                // Err means the coordinator is gone, which is a cancel too
                _ = self.cancel.changed() => return HeartbeatExit::Cancelled,
            }
        }
    }
}

fn apply(state: &watch::Sender<CoordinatorState>, transition: Transition) {
    state.send_if_modified(|current| {
        let next = current.transition(transition);
        if next == *current {
            return false;
        }
        debug!("{:?} --{:?}--> {:?}", current, transition, next);
        *current = next;
        true
    });
}
