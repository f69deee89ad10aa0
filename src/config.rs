//! Configuration loading and persistence.
//!
//! Reads `config.json` from the configuration directory and layers
//! environment overrides on top.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::PathBuf};

use crate::tunnel::TunnelConfig;

/// Overrides the configuration directory.
pub const ENV_CONFIG_DIR: &str = "RELAY_TUNNEL_CONFIG_DIR";
/// Overrides [`Config::max_control_frames`]. `0` means unbounded.
pub const ENV_MAX_CONTROL_FRAMES: &str = "RELAY_TUNNEL_MAX_CONTROL_FRAMES";
/// Overrides [`Config::context_file`].
pub const ENV_CONTEXT_FILE: &str = "RELAY_TUNNEL_CONTEXT_FILE";

const CONFIG_FILE: &str = "config.json";
const CONTEXT_FILE: &str = "session.json";

/// Configuration for the relay-tunnel CLI.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// Upper bound on session-update frames one receive may consume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_control_frames: Option<usize>,
    /// Where the tunnel context is persisted between runs.
    pub context_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let context_file = Self::config_dir()
            .map(|dir| dir.join(CONTEXT_FILE))
            .unwrap_or_else(|_| PathBuf::from(CONTEXT_FILE));

        Self {
            max_control_frames: None,
            context_file,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Unit tests use `tmp/relay-tunnel-test` under the crate root. Otherwise
    /// `RELAY_TUNNEL_CONFIG_DIR` wins over the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/relay-tunnel-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
                    PathBuf::from(dir)
                } else {
                    dirs::config_dir()
                        .context("Could not determine config directory")?
                        .join("relay-tunnel")
                }
            }
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::load_from_file() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default config: {e:#}");
                Self::default()
            }
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join(CONFIG_FILE);
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))
        } else {
            anyhow::bail!("Config file not found")
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(limit) = var(ENV_MAX_CONTROL_FRAMES) {
            match limit.trim().parse::<usize>() {
                Ok(0) => self.max_control_frames = None,
                Ok(limit) => self.max_control_frames = Some(limit),
                Err(_) => log::warn!("Ignoring {ENV_MAX_CONTROL_FRAMES}={limit:?}"),
            }
        }

        if let Some(path) = var(ENV_CONTEXT_FILE) {
            self.context_file = PathBuf::from(path);
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join(CONFIG_FILE);
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Runtime tunnel settings derived from this configuration.
    pub fn tunnel_config(&self) -> TunnelConfig {
        TunnelConfig {
            approver: None,
            max_control_frames: self.max_control_frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_control_frames, None);
        assert!(config.context_file.ends_with(CONTEXT_FILE));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(env(&[
            (ENV_MAX_CONTROL_FRAMES, "16"),
            (ENV_CONTEXT_FILE, "/var/lib/relay/ctx.json"),
        ]));
        assert_eq!(config.max_control_frames, Some(16));
        assert_eq!(config.context_file, PathBuf::from("/var/lib/relay/ctx.json"));

        config.apply_overrides(env(&[(ENV_MAX_CONTROL_FRAMES, "0")]));
        assert_eq!(config.max_control_frames, None);
    }

    #[test]
    fn test_invalid_override_is_ignored() {
        let mut config = Config::default();
        config.max_control_frames = Some(4);
        config.apply_overrides(env(&[(ENV_MAX_CONTROL_FRAMES, "lots")]));
        assert_eq!(config.max_control_frames, Some(4));
    }

    #[test]
    fn test_config_file_format() {
        let config: Config =
            serde_json::from_str(r#"{"context_file":"/tmp/s.json","max_control_frames":8}"#)
                .unwrap();
        assert_eq!(config.max_control_frames, Some(8));

        let json = serde_json::to_string(&Config {
            max_control_frames: None,
            context_file: PathBuf::from("/tmp/s.json"),
        })
        .unwrap();
        assert!(!json.contains("max_control_frames"));
    }

    #[test]
    fn test_tunnel_config() {
        let config = Config {
            max_control_frames: Some(3),
            ..Config::default()
        };
        let tunnel = config.tunnel_config();
        assert_eq!(tunnel.max_control_frames, Some(3));
        assert!(tunnel.approver.is_none());
    }

    #[test]
    fn test_config_dir_in_tests() {
        let dir = Config::config_dir().unwrap();
        assert!(dir.ends_with("tmp/relay-tunnel-test"));
        assert!(dir.exists());
    }
}
