//! TOML configuration.
//!
//! Priority (highest wins):
//! 1. CLI arguments (merged after the file is loaded)
//! 2. Config file (TOML)
//! 3. Defaults
//!
//! Every section doubles as a clap argument group. Fields are optional so a
//! flag that was not given leaves the file's value alone.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Args;
use eyre::{Result, WrapErr};
use parley_net_p2p::{DEFAULT_IDLE_TIMEOUT, P2pConfig};
use parley_node::Timeouts;
use parley_primitives::PeerAddress;
use serde::{Deserialize, Serialize};

/// Complete binary configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ParleyConfig {
    pub(crate) network: NetworkArgs,
    pub(crate) peer: PeerArgs,
    pub(crate) timeouts: TimeoutArgs,
    pub(crate) directory: DirectoryArgs,
}

impl ParleyConfig {
    /// Load the config file, or defaults when no path is given.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .wrap_err_with(|| format!("failed to parse config file {}", path.display()))
    }
}

/// Network configuration.
#[derive(Debug, Clone, Default, PartialEq, Args, Serialize, Deserialize)]
#[command(next_help_heading = "Network")]
#[serde(default)]
pub(crate) struct NetworkArgs {
    /// Listen address (repeatable). TCP and WebRTC-direct on ephemeral ports when unset.
    #[arg(long = "listen", value_name = "MULTIADDR")]
    pub(crate) listen: Vec<PeerAddress>,

    /// Externally reachable address to advertise (repeatable).
    #[arg(long = "external", value_name = "MULTIADDR")]
    pub(crate) external: Vec<PeerAddress>,

    /// Close connections without streams after this many seconds.
    #[arg(long = "idle-timeout", value_name = "SECS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) idle_timeout: Option<u64>,

    /// Node identity key file. Created on first run; ephemeral when unset.
    #[arg(long = "identity", value_name = "PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) identity: Option<PathBuf>,
}

impl NetworkArgs {
    pub(crate) fn merge(&mut self, cli: Self) {
        if !cli.listen.is_empty() {
            self.listen = cli.listen;
        }
        if !cli.external.is_empty() {
            self.external = cli.external;
        }
        self.idle_timeout = cli.idle_timeout.or(self.idle_timeout);
        self.identity = cli.identity.or(self.identity.take());
    }

    /// Swarm configuration for these arguments.
    pub(crate) fn p2p_config(&self, relay_server: bool) -> P2pConfig {
        let listen_addrs = if self.listen.is_empty() {
            P2pConfig::default_listen_addrs()
        } else {
            self.listen.iter().map(|a| a.as_multiaddr().clone()).collect()
        };
        P2pConfig {
            listen_addrs,
            external_addrs: self
                .external
                .iter()
                .map(|a| a.as_multiaddr().clone())
                .collect(),
            idle_timeout: self
                .idle_timeout
                .map_or(DEFAULT_IDLE_TIMEOUT, Duration::from_secs),
            relay_server,
            identity_file: self.identity.clone(),
        }
    }
}

/// Peer configuration.
#[derive(Debug, Clone, Default, PartialEq, Args, Serialize, Deserialize)]
#[command(next_help_heading = "Peer")]
#[serde(default)]
pub(crate) struct PeerArgs {
    /// Relay to bootstrap through, including its `/p2p/<peer id>`.
    #[arg(long = "relay", value_name = "MULTIADDR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) relay: Option<PeerAddress>,
}

impl PeerArgs {
    pub(crate) fn merge(&mut self, cli: Self) {
        self.relay = cli.relay.or(self.relay.take());
    }
}

/// Operation timeouts, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Args, Serialize, Deserialize)]
#[command(next_help_heading = "Timeouts")]
#[serde(default)]
pub(crate) struct TimeoutArgs {
    /// Relay and peer dial timeout [default: 10].
    #[arg(long = "timeout.relay-connect", value_name = "SECS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) relay_connect: Option<u64>,

    /// Chat stream open timeout [default: 5].
    #[arg(long = "timeout.chat-open", value_name = "SECS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) chat_open: Option<u64>,

    /// Directory request timeout [default: 5].
    #[arg(long = "timeout.directory", value_name = "SECS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) directory_request: Option<u64>,
}

impl TimeoutArgs {
    pub(crate) fn merge(&mut self, cli: Self) {
        self.relay_connect = cli.relay_connect.or(self.relay_connect);
        self.chat_open = cli.chat_open.or(self.chat_open);
        self.directory_request = cli.directory_request.or(self.directory_request);
    }

    pub(crate) fn timeouts(&self) -> Timeouts {
        let defaults = Timeouts::default();
        Timeouts {
            relay_connect: self
                .relay_connect
                .map_or(defaults.relay_connect, Duration::from_secs),
            chat_open: self
                .chat_open
                .map_or(defaults.chat_open, Duration::from_secs),
            directory_request: self
                .directory_request
                .map_or(defaults.directory_request, Duration::from_secs),
        }
    }
}

/// Relay directory configuration.
#[derive(Debug, Clone, Default, PartialEq, Args, Serialize, Deserialize)]
#[command(next_help_heading = "Directory")]
#[serde(default)]
pub(crate) struct DirectoryArgs {
    /// Persist the directory to this JSON file. Kept in memory when unset.
    #[arg(long = "directory.file", value_name = "PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) file: Option<PathBuf>,
}

impl DirectoryArgs {
    pub(crate) fn merge(&mut self, cli: Self) {
        self.file = cli.file.or(self.file.take());
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use parley_node::{
        DEFAULT_CHAT_OPEN_TIMEOUT, DEFAULT_DIRECTORY_REQUEST_TIMEOUT,
        DEFAULT_RELAY_CONNECT_TIMEOUT,
    };
    use tempfile::NamedTempFile;

    use super::*;

    const RELAY: &str = "/ip4/10.0.0.1/tcp/4001";

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_no_file_gives_defaults() {
        let config = ParleyConfig::load(None).unwrap();
        assert_eq!(config, ParleyConfig::default());
        assert!(config.peer.relay.is_none());

        let timeouts = config.timeouts.timeouts();
        assert_eq!(timeouts.relay_connect, DEFAULT_RELAY_CONNECT_TIMEOUT);
        assert_eq!(timeouts.chat_open, DEFAULT_CHAT_OPEN_TIMEOUT);
        assert_eq!(timeouts.directory_request, DEFAULT_DIRECTORY_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_load_partial_file() {
        let file = write_config(&format!(
            "[peer]\nrelay = \"{RELAY}\"\n\n[timeouts]\nchat_open = 2\n"
        ));
        let config = ParleyConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.peer.relay, Some(RELAY.parse().unwrap()));
        let timeouts = config.timeouts.timeouts();
        assert_eq!(timeouts.chat_open, Duration::from_secs(2));
        assert_eq!(timeouts.relay_connect, DEFAULT_RELAY_CONNECT_TIMEOUT);
        assert!(config.network.listen.is_empty());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = write_config(&format!(
            "[peer]\nrelay = \"{RELAY}\"\n\n[timeouts]\nchat_open = 2\nrelay_connect = 20\n"
        ));
        let mut config = ParleyConfig::load(Some(file.path())).unwrap();

        config.peer.merge(PeerArgs::default());
        config.timeouts.merge(TimeoutArgs {
            chat_open: Some(7),
            ..Default::default()
        });

        assert_eq!(config.peer.relay, Some(RELAY.parse().unwrap()));
        assert_eq!(config.timeouts.chat_open, Some(7));
        assert_eq!(config.timeouts.relay_connect, Some(20));
    }

    #[test]
    fn test_missing_or_bad_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ParleyConfig::load(Some(&dir.path().join("missing.toml"))).is_err());

        let file = write_config("[peer]\nrelay = \"not-an-addr\"\n");
        assert!(ParleyConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_p2p_config() {
        let network = NetworkArgs::default();
        let config = network.p2p_config(false);
        assert_eq!(config.listen_addrs, P2pConfig::default_listen_addrs());
        assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        assert!(!config.relay_server);

        let network = NetworkArgs {
            listen: vec![RELAY.parse().unwrap()],
            idle_timeout: Some(30),
            ..Default::default()
        };
        let config = network.p2p_config(true);
        assert_eq!(config.listen_addrs.len(), 1);
        assert_eq!(config.listen_addrs[0].to_string(), RELAY);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert!(config.relay_server);
    }
}
