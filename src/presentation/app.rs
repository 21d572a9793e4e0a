use crate::domain::models::{AppEvent, ConnectionStatus, MessageSeverity, StatusMessage};
use crate::domain::settings::SettingsService;
use crate::infrastructure::bluetooth::connection::Peer;
use crate::infrastructure::bluetooth::protocol::Command;
use crate::infrastructure::bluetooth::BluetoothService;
use crate::presentation::input::{self, InputAction};
use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Terminal front-end for one remote session
pub struct RemoteApp {
    bluetooth: BluetoothService,
    event_rx: mpsc::UnboundedReceiver<AppEvent>,

    // State
    pub(crate) connection_status: ConnectionStatus,
    pub(crate) status_message: Option<StatusMessage>,
}

impl RemoteApp {
    pub fn new(settings: Arc<Mutex<SettingsService>>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            bluetooth: BluetoothService::new(event_tx, settings),
            event_rx,
            connection_status: ConnectionStatus::Disconnected,
            status_message: None,
        }
    }

    /// Drive the remote from stdin until `q`, Ctrl-C or end of input
    pub async fn run_interactive(&mut self, peer: &Peer) -> Result<()> {
        self.connect(peer).await?;
        println!("{}", input::HELP);

        let mut lines = input::spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else {
                        debug!("stdin closed");
                        break;
                    };
                    if !self.handle_line(&line) {
                        break;
                    }
                }
                Some(event) = self.event_rx.recv() => self.handle_event(event),
                _ = &mut ctrl_c => {
                    info!("Interrupted");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Send `commands` in order, `gap` apart, then disconnect
    pub async fn run_script(
        &mut self,
        peer: &Peer,
        commands: &[Command],
        gap: Duration,
    ) -> Result<()> {
        self.connect(peer).await?;

        for command in commands {
            self.pump_events();
            if !self.bluetooth.is_connected() {
                break;
            }
            self.bluetooth.send(*command)?;
            tokio::time::sleep(gap).await;
        }

        self.shutdown().await;
        Ok(())
    }

    async fn connect(&mut self, peer: &Peer) -> Result<()> {
        let result = self.bluetooth.connect(peer).await;
        self.pump_events();
        result
    }

    async fn shutdown(&mut self) {
        self.bluetooth.disconnect().await;
        self.pump_events();
    }

    /// Returns false when the user asked to quit
    fn handle_line(&mut self, line: &str) -> bool {
        for action in input::parse_line(line) {
            match action {
                InputAction::Command(command) => {
                    if let Err(e) = self.bluetooth.send(command) {
                        self.show(StatusMessage::new(e.to_string(), MessageSeverity::Error));
                    }
                }
                InputAction::Help => println!("{}", input::HELP),
                InputAction::Quit => return false,
                InputAction::Unknown(key) => self.show(StatusMessage::new(
                    format!("Unknown key {:?} (h for help)", key),
                    MessageSeverity::Warning,
                )),
            }
        }
        true
    }

    fn pump_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
        }
    }

    pub(crate) fn handle_event(&mut self, event: AppEvent) {
        if let AppEvent::ConnectionStatus(status) = &event {
            self.connection_status = *status;
        }
        if matches!(
            event,
            AppEvent::HeartbeatFailed { .. } | AppEvent::NotConnected { command: None }
        ) {
            self.connection_status = ConnectionStatus::Disconnected;
        }
        if let Some(message) = describe(&event) {
            self.show(message);
        }
    }

    fn show(&mut self, message: StatusMessage) {
        println!("{}", render(&message));
        self.status_message = Some(message);
    }
}

/// User-facing text for a coordinator notification
pub fn describe(event: &AppEvent) -> Option<StatusMessage> {
    let message = match event {
        AppEvent::CommandSent(command) => {
            StatusMessage::new(format!("Sent {}", command), MessageSeverity::Success)
        }
        AppEvent::CommandFailed { command, reason } => StatusMessage::new(
            format!("Command {} failed: {}", command.label(), reason),
            MessageSeverity::Error,
        ),
        AppEvent::NotConnected { .. } => StatusMessage::new(
            "Not connected to Bluetooth device",
            MessageSeverity::Error,
        ),
        AppEvent::HeartbeatFailed { reason } => StatusMessage::new(
            format!("Idle signal failed: {}", reason),
            MessageSeverity::Error,
        ),
        AppEvent::ConnectionStatus(ConnectionStatus::Connecting) => {
            StatusMessage::new("Connecting...", MessageSeverity::Info)
        }
        AppEvent::ConnectionStatus(ConnectionStatus::Error) => {
            StatusMessage::new("Connection failed", MessageSeverity::Error)
        }
        AppEvent::ConnectionStatus(_) => return None,
        AppEvent::LogMessage(message) => message.clone(),
    };
    Some(message)
}

fn render(message: &StatusMessage) -> String {
    let tag = match message.severity {
        MessageSeverity::Info => "info",
        MessageSeverity::Success => " ok ",
        MessageSeverity::Warning => "warn",
        MessageSeverity::Error => "fail",
    };
    format!("[{}] {}", tag, message.message)
}
