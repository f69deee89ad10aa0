//! WebSocket bridge transport.
//!
//! Thin blocking wrapper around `tungstenite` that implements
//! [`Transport`]. Bridges accept one JSON envelope per text frame, so only
//! text frames are delivered; pings are answered and other control frames
//! are skipped.

use std::net::TcpStream;

use anyhow::{Context, Result};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::transport::{Transport, TransportError};

/// [`Transport`] over a WebSocket connection to the bridge.
pub struct WsTransport {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("can_read", &self.socket.can_read())
            .field("can_write", &self.socket.can_write())
            .finish()
    }
}

impl WsTransport {
    /// Dials the bridge. `http(s)://` URLs are rewritten to `ws(s)://`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the WebSocket handshake fails.
    pub fn connect(bridge: &str) -> Result<Self> {
        use tungstenite::client::IntoClientRequest;

        let url = http_to_ws_scheme(bridge);
        let request = url
            .as_str()
            .into_client_request()
            .with_context(|| format!("invalid WebSocket URL: {url}"))?;

        let (socket, response) = tungstenite::connect(request)
            .with_context(|| format!("WebSocket connect to {url} failed"))?;
        log::debug!("Connected to bridge {url} ({})", response.status());

        Ok(Self { socket })
    }

    /// Sends a close frame and flushes it.
    pub fn close(&mut self) -> Result<()> {
        match self.socket.close(None) {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {}
            Err(e) => return Err(e).context("WebSocket close failed"),
        }
        match self.socket.flush() {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e).context("WebSocket close failed"),
        }
    }
}

impl Transport for WsTransport {
    fn read(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            match self.socket.read().map_err(map_error)? {
                Message::Text(text) => return Ok(text.into_bytes()),
                Message::Ping(_) => {
                    // tungstenite queues the pong; flushing sends it.
                    self.socket.flush().map_err(map_error)?;
                }
                Message::Close(frame) => {
                    log::debug!("Bridge closed connection: {frame:?}");
                    return Err(TransportError::Closed);
                }
                Message::Binary(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    fn write(&mut self, message: &[u8]) -> Result<(), TransportError> {
        let text = String::from_utf8(message.to_vec())
            .map_err(|e| TransportError::Other(format!("bridge frames must be UTF-8: {e}")))?;
        self.socket.send(Message::Text(text)).map_err(map_error)
    }
}

fn map_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        tungstenite::Error::Io(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ) =>
        {
            TransportError::Timeout
        }
        tungstenite::Error::Io(e) => TransportError::Io(e),
        other => TransportError::Other(other.to_string()),
    }
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_to_ws_scheme_https() {
        assert_eq!(
            http_to_ws_scheme("https://bridge.walletconnect.org"),
            "wss://bridge.walletconnect.org"
        );
    }

    #[test]
    fn test_http_to_ws_scheme_http() {
        assert_eq!(
            http_to_ws_scheme("http://localhost:5001"),
            "ws://localhost:5001"
        );
    }

    #[test]
    fn test_http_to_ws_scheme_passthrough() {
        assert_eq!(http_to_ws_scheme("wss://b.example/ws"), "wss://b.example/ws");
        assert_eq!(http_to_ws_scheme("ws://localhost:5001"), "ws://localhost:5001");
    }

    #[test]
    fn test_http_to_ws_scheme_only_rewrites_prefix() {
        assert_eq!(
            http_to_ws_scheme("https://b.example/?next=https://other"),
            "wss://b.example/?next=https://other"
        );
    }

    #[test]
    fn test_connect_invalid_url_returns_error() {
        assert!(WsTransport::connect("not-a-url").is_err());
    }

    #[test]
    fn test_connect_unreachable_host_returns_error() {
        assert!(WsTransport::connect("ws://127.0.0.1:1/invalid").is_err());
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            map_error(tungstenite::Error::ConnectionClosed),
            TransportError::Closed
        ));
        assert!(matches!(
            map_error(tungstenite::Error::Io(std::io::ErrorKind::TimedOut.into())),
            TransportError::Timeout
        ));
        assert!(matches!(
            map_error(tungstenite::Error::Io(std::io::ErrorKind::BrokenPipe.into())),
            TransportError::Io(_)
        ));
        assert!(matches!(
            map_error(tungstenite::Error::Utf8),
            TransportError::Other(_)
        ));
    }
}
