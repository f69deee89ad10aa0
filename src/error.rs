//! Tunnel error type.
//!
//! Every failure the tunnel surfaces is a [`TunnelError`]. Variants carry a
//! human-readable context string (offending raw text, expected vs. actual
//! method) for diagnostics, while [`TunnelError::kind`] gives callers a
//! stable [`ErrorKind`] to branch on regardless of that context.

use thiserror::Error;

use crate::transport::TransportError;

/// Result alias used throughout the library.
pub type Result<T, E = TunnelError> = std::result::Result<T, E>;

/// Errors produced by the tunnel, codec and URI parser.
#[derive(Error, Debug)]
pub enum TunnelError {
    /// Connection URI has no `bridge` query parameter.
    #[error("connection uri has no bridge parameter: {uri}")]
    MissingBridge {
        /// The URI as given (key redacted).
        uri: String,
    },
    /// Connection URI has no `key` query parameter.
    #[error("connection uri has no key parameter: {uri}")]
    MissingKey {
        /// The URI as given (key redacted).
        uri: String,
    },
    /// Connection URI is structurally malformed.
    #[error("invalid connection uri: {0}")]
    InvalidUri(String),
    /// A constructor parameter is absent or malformed.
    #[error("invalid tunnel parameters: {0}")]
    InvalidParams(String),
    /// HMAC verification failed; the payload was not decrypted.
    #[error("hmac mismatch, payload carried {actual}")]
    Authentication {
        /// Hex HMAC carried by the payload.
        actual: String,
    },
    /// Malformed JSON, hex, padding or parameter count.
    #[error("message format error: {0}")]
    Format(String),
    /// Message arrived out of protocol sequence.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Operation invoked in the wrong tunnel state.
    #[error("{operation} not allowed while tunnel is {status}")]
    Status {
        /// Operation that was attempted.
        operation: &'static str,
        /// Status at the time of the call.
        status: crate::tunnel::TunnelStatus,
    },
    /// The peer revoked the session.
    #[error("peer {peer} disconnected")]
    PeerDisconnected {
        /// Peer identifier.
        peer: String,
    },
    /// Underlying transport failed.
    #[error("{context}")]
    Transport {
        /// What the tunnel was doing.
        context: String,
        /// Transport failure, unaltered.
        #[source]
        source: TransportError,
    },
    /// No provider is registered under the requested name.
    #[error("provider with name {0} not found, register it first")]
    ProviderNotFound(String),
}

/// Stable classification of a [`TunnelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// URI missing `bridge`.
    BridgeMissing,
    /// URI missing `key`.
    KeyMissing,
    /// URI malformed.
    InvalidUri,
    /// Constructor parameter missing or malformed.
    InvalidParams,
    /// HMAC mismatch.
    Authentication,
    /// Malformed message.
    Format,
    /// Out-of-sequence message.
    Protocol,
    /// Wrong tunnel state.
    Status,
    /// Peer ended the session.
    PeerDisconnected,
    /// Transport failure.
    Transport,
    /// Registry lookup miss.
    ProviderNotFound,
}

impl TunnelError {
    /// Returns the error's kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingBridge { .. } => ErrorKind::BridgeMissing,
            Self::MissingKey { .. } => ErrorKind::KeyMissing,
            Self::InvalidUri(_) => ErrorKind::InvalidUri,
            Self::InvalidParams(_) => ErrorKind::InvalidParams,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Format(_) => ErrorKind::Format,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Status { .. } => ErrorKind::Status,
            Self::PeerDisconnected { .. } => ErrorKind::PeerDisconnected,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::ProviderNotFound(_) => ErrorKind::ProviderNotFound,
        }
    }

    pub(crate) fn transport(context: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            context: context.into(),
            source,
        }
    }
}
