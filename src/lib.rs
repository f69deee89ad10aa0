//! Encrypted JSON-RPC tunnel over an untrusted publish/subscribe bridge.
//!
//! A peer (typically a dapp) shows a connection URI containing a handshake
//! topic, a bridge URL and a 256-bit key. The wallet side parses it, answers
//! the peer's session request over the bridge, and from then on exchanges
//! AES-256-CBC + HMAC-SHA256 sealed JSON-RPC messages. The bridge routes by
//! topic and never sees plaintext.
//!
//! ```no_run
//! use relay_tunnel::{SessionTunnel, Tunnel, TunnelConfig, TunnelParams, WsTransport};
//! use relay_tunnel::rpc::ClientInfo;
//!
//! # fn main() -> anyhow::Result<()> {
//! let params = TunnelParams {
//!     uri: "wc:8a5e5bdc-a0e4-4702-ba63-8f1a5655744f@1?bridge=https%3A%2F%2Fbridge.example.org&key=41791102999c339c844880b23950704cc43aa840f3739e365323cda4dfa89e7a".into(),
//!     account: "0x120f18F5B8EdCaA3c083F9464c57C11D81a9E549".into(),
//!     client_info: ClientInfo::default(),
//!     chain_id: 1,
//! };
//! let mut tunnel = SessionTunnel::new(params, TunnelConfig::default())?;
//! let mut transport = WsTransport::connect(&tunnel.descriptor().bridge)?;
//!
//! tunnel.connect(&mut transport)?;
//! let request = tunnel.recv(&mut transport)?;
//! # let _ = request;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`uri`]: connection URI parsing
//! - [`crypto`]: authenticated payload codec
//! - [`envelope`]: bridge framing
//! - [`rpc`]: JSON-RPC and handshake payloads
//! - [`tunnel`] / [`session`]: the session state machine
//! - [`transport`]: caller-owned I/O boundary, [`ws`] for a real bridge
//! - [`registry`]: create and restore tunnels by provider name
//! - [`config`] / [`persistence`]: CLI configuration and context storage

pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod persistence;
pub mod registry;
pub mod rpc;
pub mod session;
pub mod transport;
pub mod tunnel;
pub mod uri;
pub mod ws;

pub use error::{ErrorKind, Result, TunnelError};
pub use registry::{Provider, Registry, WalletConnectProvider};
pub use session::SessionTunnel;
pub use transport::{Approver, MemoryTransport, Transport, TransportError};
pub use tunnel::{Params, Tunnel, TunnelConfig, TunnelParams, TunnelStatus};
pub use uri::ConnectionDescriptor;
pub use ws::WsTransport;
