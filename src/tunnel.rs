//! Tunnel abstraction.
//!
//! A [`Tunnel`] is one logical session with one peer. It borrows a
//! [`Transport`] for each call and never spawns work of its own, so every
//! read and write happens on the caller's thread during the call that asked
//! for it. Concrete protocols are created through [`crate::registry`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TunnelError};
use crate::rpc::ClientInfo;
use crate::transport::{Approver, Transport};

/// Tunnel connection status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelStatus {
    /// No session. Initial state and the state every failure returns to.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Handshake answered.
    Connected,
    /// Graceful teardown in progress. Reserved; nothing enters it yet.
    Disconnecting,
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        })
    }
}

/// Session over an encrypted bridge channel.
pub trait Tunnel: Send + fmt::Debug {
    /// Runs the handshake if not already connected.
    fn connect(&mut self, transport: &mut dyn Transport) -> Result<()>;

    /// Encrypts `message` and publishes it to the peer.
    fn send(&mut self, message: &[u8], transport: &mut dyn Transport) -> Result<()>;

    /// Returns the next application message from the peer.
    fn recv(&mut self, transport: &mut dyn Transport) -> Result<Vec<u8>>;

    /// Ends the session. Always safe to call.
    fn disconnect(&mut self, transport: &mut dyn Transport) -> Result<()>;

    /// Serializes the full session, key included, for later restore.
    ///
    /// The returned bytes are a secret.
    fn context(&self) -> Result<Vec<u8>>;

    /// Current status.
    fn status(&self) -> TunnelStatus;

    /// Peer topic, once a handshake has been approved.
    fn peer_id(&self) -> Option<&str>;

    /// Bridge URL the session runs over.
    fn bridge(&self) -> &str;

    /// Re-subscribes to our topic after the transport was replaced.
    fn resubscribe(&self, transport: &mut dyn Transport) -> Result<()>;
}

/// Untyped construction parameters, as handed to a registry.
pub type Params = HashMap<String, String>;

/// Parameter holding the connection URI.
pub const PARAM_URL: &str = "url";
/// Parameter holding the account to expose.
pub const PARAM_ACCOUNT: &str = "account";
/// Parameter holding JSON-encoded [`ClientInfo`].
pub const PARAM_CLIENT_INFO: &str = "clientinfo";
/// Optional parameter holding the decimal chain id.
pub const PARAM_CHAIN_ID: &str = "chainId";

/// Typed construction parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TunnelParams {
    /// Connection URI.
    pub uri: String,
    /// Account exposed to the peer.
    pub account: String,
    /// Our metadata.
    pub client_info: ClientInfo,
    /// Chain announced in the handshake reply.
    pub chain_id: i64,
}

impl TunnelParams {
    /// Builds typed parameters from an untyped map.
    ///
    /// `url`, `account` and `clientinfo` are required; `chainId` defaults to 0.
    pub fn from_params(params: &Params) -> Result<Self> {
        let uri = require(params, PARAM_URL, "expect handshake url param")?;
        let account = require(params, PARAM_ACCOUNT, "expect account param")?;
        let client_info = require(params, PARAM_CLIENT_INFO, "expect clientinfo param")?;
        let client_info: ClientInfo = serde_json::from_str(client_info).map_err(|e| {
            TunnelError::InvalidParams(format!("unmarshal clientinfo param error: {e}"))
        })?;
        let chain_id = match params.get(PARAM_CHAIN_ID) {
            Some(raw) => raw.trim().parse().map_err(|e| {
                TunnelError::InvalidParams(format!("chainId param {raw:?} is not an integer: {e}"))
            })?,
            None => 0,
        };

        Ok(Self {
            uri: uri.to_string(),
            account: account.to_string(),
            client_info,
            chain_id,
        })
    }

    /// Converts back into an untyped map.
    pub fn to_params(&self) -> Result<Params> {
        let client_info = serde_json::to_string(&self.client_info).map_err(|e| {
            TunnelError::InvalidParams(format!("marshal clientinfo param error: {e}"))
        })?;
        Ok(Params::from([
            (PARAM_URL.to_string(), self.uri.clone()),
            (PARAM_ACCOUNT.to_string(), self.account.clone()),
            (PARAM_CLIENT_INFO.to_string(), client_info),
            (PARAM_CHAIN_ID.to_string(), self.chain_id.to_string()),
        ]))
    }
}

fn require<'a>(params: &'a Params, name: &str, message: &str) -> Result<&'a str> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| TunnelError::InvalidParams(message.to_string()))
}

/// Runtime knobs that are not part of the persisted session.
#[derive(Clone, Default)]
pub struct TunnelConfig {
    /// Handshake approval hook. `None` approves every session request.
    pub approver: Option<Arc<dyn Approver>>,
    /// Maximum consecutive session-update frames a single `recv` will consume
    /// before giving up. `None` means unbounded.
    pub max_control_frames: Option<usize>,
}

impl TunnelConfig {
    /// Sets the approval hook.
    pub fn with_approver(mut self, approver: impl Approver + 'static) -> Self {
        self.approver = Some(Arc::new(approver));
        self
    }

    /// Bounds the control-frame loop in `recv`.
    pub fn with_max_control_frames(mut self, limit: usize) -> Self {
        self.max_control_frames = Some(limit);
        self
    }
}

impl fmt::Debug for TunnelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelConfig")
            .field("approver", &self.approver.as_ref().map(|_| "<approver>"))
            .field("max_control_frames", &self.max_control_frames)
            .finish()
    }
}
