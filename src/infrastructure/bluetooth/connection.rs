//! Serial Link Connection Module
//!
//! Owns the single outbound byte stream to the HC-05. On Linux the module is
//! bound to an RFCOMM tty (`rfcomm bind /dev/rfcomm0 <addr>`), so opening a
//! peer is opening a character device. A `tcp://` peer reaches a serial
//! bridge instead.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Transport errors
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Not connected to Bluetooth device")]
    NotConnected,
    #[error("Write failed: {0}")]
    Write(#[source] io::Error),
    #[error("Permission denied opening {peer}")]
    PermissionDenied { peer: String },
    #[error("Failed to open {peer}: {source}")]
    Open {
        peer: String,
        #[source]
        source: io::Error,
    },
    #[error("Timed out connecting to {peer}")]
    Timeout { peer: String },
    #[error("Invalid peer address: {0}")]
    InvalidPeer(String),
}

/// Remote end of the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    /// Character device such as `/dev/rfcomm0`
    Device(PathBuf),
    /// `host:port` of a TCP serial bridge
    Tcp(String),
}

impl FromStr for Peer {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(addr) = s.strip_prefix("tcp://") {
            match addr.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    Ok(Peer::Tcp(addr.to_string()))
                }
                _ => Err(ConnectionError::InvalidPeer(s.to_string())),
            }
        } else if s.is_empty() || s.contains("://") {
            Err(ConnectionError::InvalidPeer(s.to_string()))
        } else {
            Ok(Peer::Device(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Device(path) => write!(f, "{}", path.display()),
            Peer::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Upper bound on the connect handshake
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Open,
    /// Declared dead by its owner; the writer is held until `close`
    Faulted,
    Closed,
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// One transport session to a remote peer
pub struct Connection {
    peer: Peer,
    writer: Option<Writer>,
    state: LinkState,
}

impl Connection {
    /// Open the transport to `peer`
    pub async fn open(peer: &Peer, config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        info!("Connecting to {}", peer);

        let connect = async {
            let writer: Writer = match peer {
                Peer::Device(path) => Box::new(
                    tokio::fs::OpenOptions::new()
                        .write(true)
                        .open(path)
                        .await?,
                ),
                Peer::Tcp(addr) => {
                    let stream = tokio::net::TcpStream::connect(addr).await?;
                    stream.set_nodelay(true)?;
                    Box::new(stream)
                }
            };
            Ok::<_, io::Error>(writer)
        };

        let writer = match tokio::time::timeout(config.connect_timeout, connect).await {
            Ok(Ok(writer)) => writer,
            Ok(Err(e)) => return Err(open_error(peer, e)),
            Err(_) => {
                return Err(ConnectionError::Timeout {
                    peer: peer.to_string(),
                })
            }
        };

        info!("Connected to {}", peer);
        Ok(Self::from_writer(peer.clone(), writer))
    }

    /// Wrap an already connected byte sink
    pub fn from_writer(peer: Peer, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            peer,
            writer: Some(Box::new(writer)),
            state: LinkState::Open,
        }
    }

    /// A connection that never became available
    pub fn detached(peer: Peer) -> Self {
        Self {
            peer,
            writer: None,
            state: LinkState::Closed,
        }
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    #[cfg(test)]
    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == LinkState::Open
    }

    /// Write and flush exactly one byte. A failed write leaves the link open;
    /// the owner decides whether the failure is fatal and calls [`fault`].
    ///
    /// [`fault`]: Connection::fault
    pub async fn write(&mut self, byte: u8) -> Result<(), ConnectionError> {
        if self.state != LinkState::Open {
            return Err(ConnectionError::NotConnected);
        }
        let writer = self.writer.as_mut().ok_or(ConnectionError::NotConnected)?;

        let result = async {
            writer.write_all(&[byte]).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!("Write of {:?} to {} failed: {}", byte as char, self.peer, e);
            return Err(ConnectionError::Write(e));
        }
        Ok(())
    }

    /// Stop accepting writes without releasing the transport
    pub fn fault(&mut self) {
        if self.state == LinkState::Open {
            debug!("Link to {} faulted", self.peer);
            self.state = LinkState::Faulted;
        }
    }

    /// Release the transport. Safe to call in any state, any number of times.
    pub async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Error shutting down {}: {}", self.peer, e);
            }
            info!("Closed connection to {}", self.peer);
        }
        self.state = LinkState::Closed;
    }
}

fn open_error(peer: &Peer, source: io::Error) -> ConnectionError {
    match source.kind() {
        io::ErrorKind::PermissionDenied => ConnectionError::PermissionDenied {
            peer: peer.to_string(),
        },
        _ => ConnectionError::Open {
            peer: peer.to_string(),
            source,
        },
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .finish()
    }
}
