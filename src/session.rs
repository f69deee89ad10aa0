//! Wallet-side session state machine.
//!
//! [`SessionTunnel`] answers a peer's handshake over the bridge and then
//! carries encrypted JSON-RPC traffic for it.
//!
//! # Handshake
//!
//! ```text
//! Wallet (this side)                         Bridge                    Peer
//! ─────────────────────────────────────────────────────────────────────────
//! sub {uri topic}                 ──►
//!                                 ◄──  pub {uri topic} wc_sessionRequest ◄──
//! approve?  (TunnelConfig::approver, default yes)
//! pub {peerId} SessionResponse    ──►                                   ──►
//! sub {self id}   (approved only) ──►
//! ```
//!
//! A rejected request is still answered and the tunnel still ends up
//! `Connected`, but with no peer: [`Tunnel::peer_id`] stays `None` and
//! `send` refuses to publish.
//!
//! # Status
//!
//! ```text
//! Disconnected ──connect──► Connecting ──ok──► Connected
//!      ▲                        │                  │
//!      └──────── failure ───────┘                  │
//!      └────────────── wc_sessionUpdate{approved:false}
//! ```
//!
//! `Disconnecting` exists in [`TunnelStatus`] but nothing enters it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::SessionKey;
use crate::envelope;
use crate::error::{Result, TunnelError};
use crate::rpc::{
    self, ClientInfo, JsonRpcRequest, JsonRpcResponse, SessionRequest, SessionResponse, SessionUpdate,
    METHOD_SESSION_REQUEST, METHOD_SESSION_UPDATE,
};
use crate::transport::Transport;
use crate::tunnel::{Tunnel, TunnelConfig, TunnelParams, TunnelStatus};
use crate::uri::ConnectionDescriptor;

/// Everything that survives a restart. Serialized as the tunnel context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TunnelState {
    descriptor: ConnectionDescriptor,
    self_id: String,
    self_info: ClientInfo,
    key: SessionKey,
    #[serde(default)]
    peer_id: String,
    #[serde(default)]
    peer_info: Option<ClientInfo>,
    chain_id: i64,
    accounts: Vec<String>,
    status: TunnelStatus,
}

/// Tunnel speaking the bridge session protocol.
#[derive(Debug)]
pub struct SessionTunnel {
    state: TunnelState,
    config: TunnelConfig,
}

impl SessionTunnel {
    /// Creates a fresh, disconnected tunnel.
    pub fn new(params: TunnelParams, config: TunnelConfig) -> Result<Self> {
        let descriptor = ConnectionDescriptor::parse(&params.uri)?;
        let key = SessionKey::from_slice(&descriptor.key)?;
        if params.account.is_empty() {
            return Err(TunnelError::InvalidParams("account must not be empty".into()));
        }

        let state = TunnelState {
            self_id: Uuid::new_v4().to_string(),
            self_info: params.client_info,
            key,
            peer_id: String::new(),
            peer_info: None,
            chain_id: params.chain_id,
            accounts: vec![params.account],
            status: TunnelStatus::Disconnected,
            descriptor,
        };
        log::debug!(
            "Created tunnel {} for handshake topic {}",
            state.self_id,
            state.descriptor.short_topic()
        );

        Ok(Self { state, config })
    }

    /// Restores a tunnel from bytes produced by [`Tunnel::context`].
    pub fn from_context(context: &[u8], config: TunnelConfig) -> Result<Self> {
        let state: TunnelState = serde_json::from_slice(context)
            .map_err(|e| TunnelError::Format(format!("unmarshal tunnel context error: {e}")))?;
        if state.accounts.is_empty() {
            return Err(TunnelError::Format("tunnel context has no accounts".into()));
        }
        log::debug!("Restored tunnel {} ({})", state.self_id, state.status);

        Ok(Self { state, config })
    }

    /// Parsed connection URI.
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.state.descriptor
    }

    /// Our topic on the bridge.
    pub fn self_id(&self) -> &str {
        &self.state.self_id
    }

    /// Our metadata.
    pub fn self_info(&self) -> &ClientInfo {
        &self.state.self_info
    }

    /// Peer metadata, once a handshake has been approved.
    pub fn peer_info(&self) -> Option<&ClientInfo> {
        self.state.peer_info.as_ref()
    }

    /// Accounts exposed to the peer. Never empty.
    pub fn accounts(&self) -> &[String] {
        &self.state.accounts
    }

    /// Active chain.
    pub fn chain_id(&self) -> i64 {
        self.state.chain_id
    }

    fn set_status(&mut self, status: TunnelStatus) {
        if self.state.status != status {
            log::debug!(
                "Tunnel {} status {} -> {}",
                self.state.self_id,
                self.state.status,
                status
            );
            self.state.status = status;
        }
    }

    fn require_connected(&self, operation: &'static str) -> Result<()> {
        if self.state.status == TunnelStatus::Connected {
            Ok(())
        } else {
            Err(TunnelError::Status {
                operation,
                status: self.state.status,
            })
        }
    }

    fn subscribe(&self, topic: &str, transport: &mut dyn Transport) -> Result<()> {
        let frame = envelope::frame_subscribe(topic).to_vec()?;
        transport
            .write(&frame)
            .map_err(|e| TunnelError::transport(format!("write sub {topic} to transport error"), e))
    }

    fn publish(&self, topic: &str, payload: &[u8], transport: &mut dyn Transport) -> Result<()> {
        let frame = envelope::frame_publish(topic, payload, &self.state.key)?.to_vec()?;
        transport
            .write(&frame)
            .map_err(|e| TunnelError::transport("write to transport error", e))
    }

    /// Reads the session request, answers it, and records the peer on
    /// approval. Returns whether the session was approved.
    fn handshake(&mut self, transport: &mut dyn Transport) -> Result<bool> {
        self.subscribe(&self.state.descriptor.topic, transport)?;

        let raw = transport
            .read()
            .map_err(|e| TunnelError::transport("read sessionRequest error", e))?;
        let plaintext = envelope::unwrap(&raw, &self.state.key)?;
        let request = JsonRpcRequest::from_slice(&plaintext)?;
        if request.method != METHOD_SESSION_REQUEST {
            return Err(TunnelError::Protocol(format!(
                "expect {METHOD_SESSION_REQUEST} but got {}",
                request.method
            )));
        }

        let session: SessionRequest = request.decode_single()?;
        let raw_session = serde_json::to_vec(request.single_param()?)
            .map_err(|e| TunnelError::Format(format!("marshal sessionRequest error: {e}")))?;

        let approved = match &self.config.approver {
            Some(approver) => approver.approve(&raw_session),
            None => true,
        };
        log::info!(
            "Session request from peer {} {}",
            session.peer_id,
            if approved { "approved" } else { "rejected" }
        );

        let reply = SessionResponse {
            peer_id: self.state.self_id.clone(),
            peer_meta: self.state.self_info.clone(),
            chain_id: self.state.chain_id,
            approved,
            accounts: self.state.accounts.clone(),
        };
        let reply = serde_json::to_value(&reply)
            .map_err(|e| TunnelError::Format(format!("marshal sessionResponse error: {e}")))?;
        let reply = JsonRpcResponse::success(request.id, reply).to_vec()?;
        self.publish(&session.peer_id, &reply, transport)?;

        if approved {
            self.subscribe(&self.state.self_id, transport)?;
            self.state.peer_id = session.peer_id;
            self.state.peer_info = session.peer_meta;
        }

        Ok(approved)
    }

    fn apply_session_update(&mut self, update: SessionUpdate) -> Result<()> {
        if !update.approved {
            if self.state.status == TunnelStatus::Connected {
                self.set_status(TunnelStatus::Disconnected);
                log::info!("Peer {} ended the session", self.state.peer_id);
                return Err(TunnelError::PeerDisconnected {
                    peer: self.state.peer_id.clone(),
                });
            }
            return Ok(());
        }

        if let Some(chain_id) = update.chain_id {
            self.state.chain_id = chain_id;
        }
        if let Some(accounts) = update.accounts.filter(|a| !a.is_empty()) {
            self.state.accounts = accounts;
        }
        log::debug!(
            "Session updated: chain {} accounts {}",
            self.state.chain_id,
            self.state.accounts.len()
        );
        Ok(())
    }
}

impl Tunnel for SessionTunnel {
    fn connect(&mut self, transport: &mut dyn Transport) -> Result<()> {
        if self.state.status != TunnelStatus::Disconnected {
            return Ok(());
        }

        self.set_status(TunnelStatus::Connecting);
        match self.handshake(transport) {
            Ok(approved) => {
                self.set_status(TunnelStatus::Connected);
                if approved {
                    log::info!("Tunnel connected to peer {}", self.state.peer_id);
                }
                Ok(())
            }
            Err(e) => {
                self.set_status(TunnelStatus::Disconnected);
                log::warn!("Handshake failed: {e}");
                Err(e)
            }
        }
    }

    fn send(&mut self, message: &[u8], transport: &mut dyn Transport) -> Result<()> {
        self.require_connected("send")?;
        if self.state.peer_id.is_empty() {
            return Err(TunnelError::Protocol(
                "session was not approved, no peer to send to".into(),
            ));
        }
        self.publish(&self.state.peer_id, message, transport)
    }

    fn recv(&mut self, transport: &mut dyn Transport) -> Result<Vec<u8>> {
        let mut control_frames = 0usize;

        loop {
            self.require_connected("recv")?;

            let raw = transport
                .read()
                .map_err(|e| TunnelError::transport("read from transport error", e))?;
            let plaintext = envelope::unwrap(&raw, &self.state.key)?;

            if rpc::method_of(&plaintext).as_deref() != Some(METHOD_SESSION_UPDATE) {
                return Ok(plaintext);
            }
            let request = JsonRpcRequest::from_slice(&plaintext)?;
            self.apply_session_update(request.decode_single()?)?;

            control_frames += 1;
            if let Some(limit) = self.config.max_control_frames {
                if control_frames > limit {
                    return Err(TunnelError::Protocol(format!(
                        "more than {limit} consecutive {METHOD_SESSION_UPDATE} frames without application data"
                    )));
                }
            }
        }
    }

    fn disconnect(&mut self, _transport: &mut dyn Transport) -> Result<()> {
        // Sends nothing and leaves the status alone.
        Ok(())
    }

    fn context(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.state)
            .map_err(|e| TunnelError::Format(format!("marshal tunnel context error: {e}")))
    }

    fn status(&self) -> TunnelStatus {
        self.state.status
    }

    fn peer_id(&self) -> Option<&str> {
        Some(self.state.peer_id.as_str()).filter(|id| !id.is_empty())
    }

    fn bridge(&self) -> &str {
        &self.state.descriptor.bridge
    }

    // The bridge forgets subscriptions when the socket drops.
    fn resubscribe(&self, transport: &mut dyn Transport) -> Result<()> {
        self.require_connected("resubscribe")?;
        self.subscribe(&self.state.self_id, transport)
    }
}
