//! Transport and approval boundary.
//!
//! The tunnel never owns a socket. Every operation borrows a [`Transport`]
//! from the caller for the duration of the call, which keeps timeouts,
//! cancellation and reconnect policy entirely on the caller's side.
//!
//! # Approval
//!
//! Handshake acceptance is delegated to an optional [`Approver`] configured
//! on the tunnel. Any `Fn(&[u8]) -> bool` closure works:
//!
//! ```
//! use relay_tunnel::transport::Approver;
//!
//! let deny_all = |_request: &[u8]| false;
//! assert!(!deny_all.approve(b"{}"));
//! ```

use std::collections::VecDeque;

use thiserror::Error;

/// Errors a transport may surface.
///
/// The tunnel wraps these without altering them, so a transport that
/// implements its own deadline reports [`TransportError::Timeout`] and the
/// caller sees exactly that as the error source.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The channel was closed by either side.
    #[error("transport closed")]
    Closed,
    /// The operation did not complete in time.
    #[error("transport operation timed out")]
    Timeout,
    /// I/O failure on the underlying stream.
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Any other transport-specific failure.
    #[error("transport error: {0}")]
    Other(String),
}

/// Duplex byte-message channel to the bridge.
pub trait Transport {
    /// Block until one complete message is available.
    fn read(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Write one complete message.
    fn write(&mut self, message: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read(&mut self) -> Result<Vec<u8>, TransportError> {
        (**self).read()
    }

    fn write(&mut self, message: &[u8]) -> Result<(), TransportError> {
        (**self).write(message)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self) -> Result<Vec<u8>, TransportError> {
        (**self).read()
    }

    fn write(&mut self, message: &[u8]) -> Result<(), TransportError> {
        (**self).write(message)
    }
}

/// Decides whether an inbound session request is accepted.
///
/// Receives the raw JSON of the `SessionRequest` parameter.
pub trait Approver: Send + Sync {
    /// Returns `true` to approve the session.
    fn approve(&self, session_request: &[u8]) -> bool;
}

impl<F> Approver for F
where
    F: Fn(&[u8]) -> bool + Send + Sync,
{
    fn approve(&self, session_request: &[u8]) -> bool {
        self(session_request)
    }
}

/// In-process transport backed by queues.
///
/// Inbound frames are scripted up front with [`MemoryTransport::push_inbound`];
/// everything the tunnel writes is recorded and can be inspected afterwards.
/// Reading from an empty queue yields [`TransportError::Closed`].
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inbound: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    reads: usize,
    fail_writes: bool,
}

impl MemoryTransport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a frame to be returned by a future `read`.
    pub fn push_inbound(&mut self, frame: impl Into<Vec<u8>>) {
        self.inbound.push_back(frame.into());
    }

    /// Frames written so far, oldest first.
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// Number of `read` calls made, including failed ones.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Number of inbound frames not yet read.
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    /// Makes every subsequent `write` fail with [`TransportError::Closed`].
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl Transport for MemoryTransport {
    fn read(&mut self) -> Result<Vec<u8>, TransportError> {
        self.reads += 1;
        self.inbound.pop_front().ok_or(TransportError::Closed)
    }

    fn write(&mut self, message: &[u8]) -> Result<(), TransportError> {
        if self.fail_writes {
            return Err(TransportError::Closed);
        }
        self.written.push(message.to_vec());
        Ok(())
    }
}
