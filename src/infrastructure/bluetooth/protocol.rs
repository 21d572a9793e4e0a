//! HC-05 Remote Protocol
//!
//! The paired robot understands single unframed ASCII bytes: no length
//! prefix, no acknowledgment, no checksum. One byte is one action.

use std::fmt;
use std::str::FromStr;

/// Delay between idle bytes while no command is in flight
pub const HEARTBEAT_INTERVAL_MS: u64 = 1000;

/// Keep-alive byte written by the heartbeat
pub const IDLE_BYTE: u8 = b'S';

/// Commands understood by the remote device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Move forward
    Forward,
    /// Move backward
    Backward,
    /// Turn left
    Left,
    /// Turn right
    Right,
    /// Action 1 ("kick1")
    Kick1,
    /// Action 2 ("kick2")
    Kick2,
    /// Idle / keep-alive
    Idle,
}

impl Command {
    /// Every command in the alphabet
    pub const ALL: [Command; 7] = [
        Command::Forward,
        Command::Backward,
        Command::Left,
        Command::Right,
        Command::Kick1,
        Command::Kick2,
        Command::Idle,
    ];

    /// Get the wire byte for this command
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Forward => b'F',
            Self::Backward => b'B',
            Self::Left => b'L',
            Self::Right => b'R',
            Self::Kick1 => b'P',
            Self::Kick2 => b'C',
            Self::Idle => IDLE_BYTE,
        }
    }

    /// Decode a wire byte. Bytes outside the alphabet map to `None`.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_byte() == byte)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Left => "left",
            Self::Right => "right",
            Self::Kick1 => "kick1",
            Self::Kick2 => "kick2",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ('{}')", self.label(), self.as_byte() as char)
    }
}

/// Error returned when a string does not name a command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command: {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    /// Accepts either the wire letter (`"F"`) or the label (`"forward"`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let [byte] = trimmed.as_bytes() {
            if let Some(command) = Self::from_byte(byte.to_ascii_uppercase()) {
                return Ok(command);
            }
        }
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        assert_eq!(Command::Forward.as_byte(), b'F');
        assert_eq!(Command::Backward.as_byte(), b'B');
        assert_eq!(Command::Left.as_byte(), b'L');
        assert_eq!(Command::Right.as_byte(), b'R');
        assert_eq!(Command::Kick1.as_byte(), b'P');
        assert_eq!(Command::Kick2.as_byte(), b'C');
        assert_eq!(Command::Idle.as_byte(), IDLE_BYTE);
    }

    #[test]
    fn test_alphabet_is_one_to_one() {
        for command in Command::ALL {
            assert_eq!(Command::from_byte(command.as_byte()), Some(command));
        }
        assert_eq!(Command::from_byte(b'X'), None);
        assert_eq!(Command::from_byte(b'f'), None);
    }

    #[test]
    fn test_parse_letters_and_labels() {
        assert_eq!("F".parse::<Command>(), Ok(Command::Forward));
        assert_eq!("p".parse::<Command>(), Ok(Command::Kick1));
        assert_eq!("Kick2".parse::<Command>(), Ok(Command::Kick2));
        assert_eq!(" idle ".parse::<Command>(), Ok(Command::Idle));
        assert!("jump".parse::<Command>().is_err());
    }
}
