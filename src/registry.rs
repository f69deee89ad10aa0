//! Provider registry.
//!
//! Tunnels are created by name so callers that persist only a provider name
//! and a context blob can bring a session back without knowing its concrete
//! type. The registry is an explicit value, not a process-wide table; build
//! one at startup and pass it where it is needed.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, TunnelError};
use crate::session::SessionTunnel;
use crate::tunnel::{Params, Tunnel, TunnelConfig, TunnelParams};

/// Name the bridge session provider registers under.
pub const WALLET_CONNECT: &str = "wc";

/// Creates tunnels of one protocol.
pub trait Provider: Send + Sync + fmt::Debug {
    /// Registry key.
    fn name(&self) -> &str;

    /// Creates a fresh tunnel from untyped parameters.
    fn new_tunnel(&self, params: &Params) -> Result<Box<dyn Tunnel>>;

    /// Restores a tunnel from its context bytes.
    fn from_context(&self, context: &[u8]) -> Result<Box<dyn Tunnel>>;
}

/// [`Provider`] for [`SessionTunnel`].
#[derive(Debug, Clone, Default)]
pub struct WalletConnectProvider {
    config: TunnelConfig,
}

impl WalletConnectProvider {
    /// Provider whose tunnels all share `config`.
    pub fn new(config: TunnelConfig) -> Self {
        Self { config }
    }
}

impl Provider for WalletConnectProvider {
    fn name(&self) -> &str {
        WALLET_CONNECT
    }

    fn new_tunnel(&self, params: &Params) -> Result<Box<dyn Tunnel>> {
        let params = TunnelParams::from_params(params)?;
        Ok(Box::new(SessionTunnel::new(params, self.config.clone())?))
    }

    fn from_context(&self, context: &[u8]) -> Result<Box<dyn Tunnel>> {
        Ok(Box::new(SessionTunnel::from_context(
            context,
            self.config.clone(),
        )?))
    }
}

/// Name-to-provider table.
#[derive(Debug, Default)]
pub struct Registry {
    providers: HashMap<String, Box<dyn Provider>>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in providers, all sharing `config`.
    pub fn with_defaults(config: TunnelConfig) -> Self {
        let mut registry = Self::new();
        registry.register(WalletConnectProvider::new(config));
        registry
    }

    /// Adds `provider`, replacing any provider with the same name.
    pub fn register(&mut self, provider: impl Provider + 'static) {
        let name = provider.name().to_string();
        if self.providers.insert(name.clone(), Box::new(provider)).is_some() {
            log::warn!("Replaced tunnel provider {name}");
        }
    }

    /// Looks up a provider by name.
    pub fn get(&self, name: &str) -> Result<&dyn Provider> {
        self.providers
            .get(name)
            .map(|provider| &**provider)
            .ok_or_else(|| TunnelError::ProviderNotFound(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Creates a tunnel with the named provider.
    pub fn new_tunnel(&self, name: &str, params: &Params) -> Result<Box<dyn Tunnel>> {
        self.get(name)?.new_tunnel(params)
    }

    /// Restores a tunnel with the named provider.
    pub fn from_context(&self, name: &str, context: &[u8]) -> Result<Box<dyn Tunnel>> {
        self.get(name)?.from_context(context)
    }
}
