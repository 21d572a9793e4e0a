use crate::infrastructure::bluetooth::protocol::Command;

/// Notifications from the coordinator to the front-end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// A command byte was written to the link
    CommandSent(Command),
    /// A command byte could not be written; heartbeating resumes
    CommandFailed { command: Command, reason: String },
    /// No usable connection. `command` is `None` when the heartbeat noticed.
    NotConnected { command: Option<Command> },
    /// The idle loop could not write and has stopped
    HeartbeatFailed { reason: String },
    ConnectionStatus(ConnectionStatus),
    LogMessage(StatusMessage),
}

/// Requests from the front-end to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Send(Command),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>, severity: MessageSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
