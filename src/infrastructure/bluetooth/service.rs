//! Bluetooth Service Module
//!
//! Main service that opens the link, hands it to a [`Coordinator`] and
//! forwards user commands to it.

use crate::domain::models::{
    AppEvent, ConnectionStatus, MessageSeverity, SessionCommand, StatusMessage,
};
use crate::domain::settings::SettingsService;
use crate::domain::state::CoordinatorState;
use crate::infrastructure::bluetooth::{
    connection::{Connection, ConnectionConfig, Peer},
    coordinator::{Coordinator, CoordinatorConfig},
    protocol::Command,
};
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A running coordinator and the channel feeding it
struct Session {
    peer: Peer,
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<CoordinatorState>,
    task: JoinHandle<()>,
}

/// Main Bluetooth service coordinating the remote session
pub struct BluetoothService {
    session: Option<Session>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    settings: Arc<Mutex<SettingsService>>,
}

impl BluetoothService {
    /// Create a new Bluetooth service
    pub fn new(
        event_sender: mpsc::UnboundedSender<AppEvent>,
        settings: Arc<Mutex<SettingsService>>,
    ) -> Self {
        Self {
            session: None,
            event_sender,
            settings,
        }
    }

    /// Connect to a peer and start idle signaling
    pub async fn connect(&mut self, peer: &Peer) -> Result<()> {
        if self.session.is_some() {
            self.disconnect().await;
        }

        let _ = self
            .event_sender
            .send(AppEvent::ConnectionStatus(ConnectionStatus::Connecting));

        // Get configuration from settings
        let (connection_config, coordinator_config) = {
            let settings = self
                .settings
                .lock()
                .map_err(|_| anyhow::anyhow!("Lock error"))?;
            let s = settings.get();
            (
                ConnectionConfig {
                    connect_timeout: s.connect_timeout(),
                },
                CoordinatorConfig {
                    heartbeat_interval: s.heartbeat_interval(),
                    cancel_join_timeout: s.cancel_join_timeout(),
                },
            )
        };

        let connection = match Connection::open(peer, &connection_config).await {
            Ok(connection) => connection,
            Err(e) => {
                let _ = self
                    .event_sender
                    .send(AppEvent::ConnectionStatus(ConnectionStatus::Error));
                return Err(e).with_context(|| format!("Connection to {} failed", peer));
            }
        };

        if let Err(e) = self
            .settings
            .lock()
            .map_err(|_| anyhow::anyhow!("Lock error"))
            .and_then(|mut settings| settings.record_peer(&peer.to_string()))
        {
            warn!("Could not remember peer {}: {}", peer, e);
        }

        self.start_session(peer.clone(), connection, coordinator_config);

        let _ = self
            .event_sender
            .send(AppEvent::ConnectionStatus(ConnectionStatus::Connected));
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage::new(
            format!("Connected to {}", peer),
            MessageSeverity::Success,
        )));

        Ok(())
    }

    fn start_session(&mut self, peer: Peer, connection: Connection, config: CoordinatorConfig) {
        let coordinator = Coordinator::new(connection, self.event_sender.clone(), config);
        let state = coordinator.subscribe();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(coordinator.run(command_rx));

        self.session = Some(Session {
            peer,
            commands,
            state,
            task,
        });
    }

    /// Queue a command for the coordinator
    pub fn send(&self, command: Command) -> Result<()> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No active session"))?;
        session
            .commands
            .send(SessionCommand::Send(command))
            .map_err(|_| anyhow::anyhow!("Session for {} has ended", session.peer))
    }

    /// Tear the session down and wait for the link to be released
    pub async fn disconnect(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        let _ = session.commands.send(SessionCommand::Shutdown);
        if let Err(e) = session.task.await {
            warn!("Session task for {} ended abnormally: {}", session.peer, e);
        }

        info!("Disconnected from {}", session.peer);
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage::new(
            "Disconnected from device",
            MessageSeverity::Info,
        )));
    }

    /// Check if the session is still signaling the remote
    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| !session.state.borrow().is_terminal())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn settings_in(dir: &TempDir) -> Arc<Mutex<SettingsService>> {
        Arc::new(Mutex::new(SettingsService::with_path(
            dir.path().join("settings.json"),
        )))
    }

    #[tokio::test]
    async fn test_session_over_tcp_bridge() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer: Peer = format!("tcp://{}", listener.local_addr().unwrap())
            .parse()
            .unwrap();

        let robot = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut service = BluetoothService::new(tx, settings.clone());
        service.connect(&peer).await.unwrap();
        assert!(service.is_connected());

        service.send(Command::Forward).unwrap();
        service.send(Command::Kick2).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.disconnect().await;
        assert!(!service.is_connected());

        let received = robot.await.unwrap();
        let commands: Vec<u8> = received.iter().copied().filter(|b| *b != b'S').collect();
        assert_eq!(commands, b"FC");
        // Idle resumes after the last command until shutdown
        assert_eq!(received.last(), Some(&b'S'));

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events.first(),
            Some(&AppEvent::ConnectionStatus(ConnectionStatus::Connecting))
        );
        assert!(events.contains(&AppEvent::CommandSent(Command::Forward)));
        assert!(events.contains(&AppEvent::CommandSent(Command::Kick2)));

        let settings = settings.lock().unwrap();
        assert_eq!(settings.get().last_peer, Some(peer.to_string()));
    }

    #[tokio::test]
    async fn test_failed_connect_reports_error() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut service = BluetoothService::new(tx, settings_in(&dir));

        let peer = Peer::Device(dir.path().join("no-such-rfcomm"));
        assert!(service.connect(&peer).await.is_err());
        assert!(!service.is_connected());
        assert!(service.send(Command::Left).is_err());

        assert_eq!(
            rx.try_recv().unwrap(),
            AppEvent::ConnectionStatus(ConnectionStatus::Connecting)
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            AppEvent::ConnectionStatus(ConnectionStatus::Error)
        );
    }

    #[tokio::test]
    async fn test_disconnect_without_session() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut service = BluetoothService::new(tx, settings_in(&dir));
        service.disconnect().await;
        service.disconnect().await;
        assert!(!service.is_connected());
    }
}
