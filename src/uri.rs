//! Connection URI parsing.
//!
//! The connection URI is shared out-of-band (usually as a QR code) and
//! carries everything needed to reach the peer:
//!
//! ```text
//! wc:{topic}@{version}?bridge={percent-encoded bridge url}&key={hex key}
//! ```
//!
//! `topic` is the handshake topic on the bridge, `version` the protocol
//! version, `bridge` the relay server and `key` the symmetric session key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::form_urlencoded;
use zeroize::Zeroizing;

use crate::error::{Result, TunnelError};

/// Scheme emitted by [`ConnectionDescriptor`]'s `Display`.
pub const URI_SCHEME: &str = "wc";

/// Parsed connection URI.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Handshake topic.
    pub topic: String,
    /// Protocol version (e.g. `1`).
    pub version: String,
    /// Bridge URL, decoded.
    pub bridge: String,
    /// Raw symmetric key bytes, decoded from hex. Zeroed on drop.
    pub key: Zeroizing<Vec<u8>>,
}

impl ConnectionDescriptor {
    /// Parses a connection URI.
    ///
    /// Both `wc:topic@1?...` and `wc://topic@1?...` are accepted.
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri
            .split_once(':')
            .ok_or_else(|| TunnelError::InvalidUri(format!("missing scheme in {}", redact(uri))))?;
        if scheme.is_empty() {
            return Err(TunnelError::InvalidUri(format!(
                "empty scheme in {}",
                redact(uri)
            )));
        }

        let rest = rest.strip_prefix("//").unwrap_or(rest);
        let (authority, query) = rest.split_once('?').unwrap_or((rest, ""));
        let (topic, version) = authority.rsplit_once('@').ok_or_else(|| {
            TunnelError::InvalidUri(format!("expected topic@version in {}", redact(uri)))
        })?;

        let mut bridge = None;
        let mut key = None;
        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            match name.as_ref() {
                "bridge" if bridge.is_none() => bridge = Some(value.into_owned()),
                "key" if key.is_none() => key = Some(value.into_owned()),
                _ => {}
            }
        }

        let bridge = bridge
            .filter(|b| !b.is_empty())
            .ok_or_else(|| TunnelError::MissingBridge { uri: redact(uri) })?;
        let key = key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| TunnelError::MissingKey { uri: redact(uri) })?;
        let key = Zeroizing::new(key);
        let key = hex::decode(key.as_bytes())
            .map(Zeroizing::new)
            .map_err(|e| TunnelError::InvalidUri(format!("key is not valid hex: {e}")))?;

        Ok(Self {
            topic: topic.to_string(),
            version: version.to_string(),
            bridge,
            key,
        })
    }

    /// Short form of the topic for log lines.
    pub fn short_topic(&self) -> &str {
        self.topic.get(..8).unwrap_or(&self.topic)
    }
}

/// Replaces the value of the `key` query parameter so URIs can go into
/// error messages and logs.
fn redact(uri: &str) -> String {
    match uri.find("key=") {
        Some(start) => {
            let value_start = start + "key=".len();
            let value_end = uri[value_start..]
                .find('&')
                .map_or(uri.len(), |i| value_start + i);
            format!("{}<redacted>{}", &uri[..value_start], &uri[value_end..])
        }
        None => uri.to_string(),
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bridge: String = form_urlencoded::byte_serialize(self.bridge.as_bytes()).collect();
        write!(
            f,
            "{URI_SCHEME}:{}@{}?bridge={}&key={}",
            self.topic,
            self.version,
            bridge,
            hex::encode(self.key.as_slice())
        )
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("topic", &self.topic)
            .field("version", &self.version)
            .field("bridge", &self.bridge)
            .field("key", &format_args!("<{} bytes>", self.key.len()))
            .finish()
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ConnectionDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConnectionDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let uri = String::deserialize(deserializer)?;
        Self::parse(&uri).map_err(serde::de::Error::custom)
    }
}
