//! Key bindings for the terminal remote

use crate::infrastructure::bluetooth::protocol::{Command, UnknownCommand};
use std::io::BufRead;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Command(Command),
    Help,
    Quit,
    Unknown(char),
}

pub const HELP: &str = "\
  w / f   forward        s / b   backward
  a / l   left           d / r   right
  p / 1   kick1          c / 2   kick2
  i / x   idle           h / ?   help
  q       quit
Keys may be chained on one line (e.g. \"wwd\") or a command named in full.";

/// Map a single key to an action
pub fn parse_key(key: char) -> InputAction {
    match key.to_ascii_lowercase() {
        'w' | 'f' => InputAction::Command(Command::Forward),
        's' | 'b' => InputAction::Command(Command::Backward),
        'a' | 'l' => InputAction::Command(Command::Left),
        'd' | 'r' => InputAction::Command(Command::Right),
        'p' | '1' => InputAction::Command(Command::Kick1),
        'c' | '2' => InputAction::Command(Command::Kick2),
        'i' | 'x' => InputAction::Command(Command::Idle),
        'h' | '?' => InputAction::Help,
        'q' => InputAction::Quit,
        other => InputAction::Unknown(other),
    }
}

/// Map one line of terminal input to actions, in order
pub fn parse_line(line: &str) -> Vec<InputAction> {
    let trimmed = line.trim();
    if trimmed.chars().count() > 1 {
        if let Ok(command) = trimmed.parse::<Command>() {
            return vec![InputAction::Command(command)];
        }
    }
    trimmed
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(parse_key)
        .collect()
}

/// Parse a one-shot command script: wire letters (`"FFLS"`) or labels
/// separated by commas or spaces (`"forward, kick1"`)
pub fn parse_script(script: &str) -> Result<Vec<Command>, UnknownCommand> {
    if script.contains(|c: char| c == ',' || c.is_whitespace()) {
        script
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(str::parse)
            .collect()
    } else {
        script.chars().map(|c| c.to_string().parse()).collect()
    }
}

/// Read lines on a dedicated thread and forward them to the runtime.
///
/// A blocking read cannot be cancelled, so it is kept off tokio's blocking
/// pool: the thread is never joined and does not hold up runtime shutdown.
/// The channel closes at end of input or once the receiver is dropped.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (line_sender, line_receiver) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if line_sender.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Stopped reading input: {}", e);
                    break;
                }
            }
        }
        debug!("Input reader finished");
    });
    line_receiver
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wasd_and_letters_agree() {
        assert_eq!(parse_key('w'), parse_key('F'));
        assert_eq!(parse_key('a'), InputAction::Command(Command::Left));
        assert_eq!(parse_key('D'), InputAction::Command(Command::Right));
        assert_eq!(parse_key('2'), InputAction::Command(Command::Kick2));
        assert_eq!(parse_key('q'), InputAction::Quit);
        assert_eq!(parse_key('z'), InputAction::Unknown('z'));
    }

    #[test]
    fn test_parse_line_chains_keys() {
        assert_eq!(
            parse_line("ww d\n"),
            vec![
                InputAction::Command(Command::Forward),
                InputAction::Command(Command::Forward),
                InputAction::Command(Command::Right),
            ]
        );
        assert_eq!(
            parse_line("kick1"),
            vec![InputAction::Command(Command::Kick1)]
        );
        assert!(parse_line("   ").is_empty());
    }

    #[test]
    fn test_parse_script() {
        assert_eq!(
            parse_script("FFLS").unwrap(),
            vec![Command::Forward, Command::Forward, Command::Left, Command::Idle]
        );
        assert_eq!(
            parse_script("forward, kick2 right").unwrap(),
            vec![Command::Forward, Command::Kick2, Command::Right]
        );
        assert!(parse_script("FXL").is_err());
    }

    #[tokio::test]
    async fn test_line_reader_forwards_lines_then_closes() {
        let input = std::io::Cursor::new("ww\nkick1\n\nq");
        let mut lines = spawn_line_reader(input);

        let mut received = Vec::new();
        while let Some(line) = lines.recv().await {
            received.push(line);
        }
        assert_eq!(received, vec!["ww", "kick1", "", "q"]);
    }
}
