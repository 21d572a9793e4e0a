//! In-memory link used by the connection and coordinator tests

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio::time::Instant;

#[derive(Default)]
struct Inner {
    log: Vec<(Instant, u8)>,
    fail_after: Option<usize>,
    fail_on: Option<u8>,
    stall_on: Option<u8>,
    shut_down: bool,
}

/// Byte sink that records every byte with the (possibly paused) clock time
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `count` bytes, then fail every write
    pub fn fail_after(self, count: usize) -> Self {
        self.inner.lock().unwrap().fail_after = Some(count);
        self
    }

    /// Fail every write of `byte`
    pub fn fail_on(self, byte: u8) -> Self {
        self.inner.lock().unwrap().fail_on = Some(byte);
        self
    }

    /// Never complete a write of `byte`
    pub fn stall_on(self, byte: u8) -> Self {
        self.inner.lock().unwrap().stall_on = Some(byte);
        self
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.inner.lock().unwrap().log.iter().map(|(_, b)| *b).collect()
    }

    pub fn log(&self) -> Vec<(Instant, u8)> {
        self.inner.lock().unwrap().log.clone()
    }

    pub fn count(&self, byte: u8) -> usize {
        self.bytes().iter().filter(|b| **b == byte).count()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().unwrap().shut_down
    }
}

impl AsyncWrite for RecordingSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(&byte) = buf.first() else {
            return Poll::Ready(Ok(0));
        };

        if inner.stall_on == Some(byte) {
            return Poll::Pending;
        }

        let exhausted = inner.fail_after.is_some_and(|n| inner.log.len() >= n);
        if exhausted || inner.fail_on == Some(byte) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "link severed",
            )));
        }

        inner.log.push((Instant::now(), byte));
        Poll::Ready(Ok(1))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner.lock().unwrap().shut_down = true;
        Poll::Ready(Ok(()))
    }
}
