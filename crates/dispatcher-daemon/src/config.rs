use std::io;
use std::path::Path;
use std::time::Duration;

use dispatcher::RegistryConfig;
use serde::Deserialize;

pub const DEFAULT_INGRESS_LISTEN: &str = "127.0.0.1:9180";
pub const DEFAULT_TUNNEL_LISTEN: &str = "0.0.0.0:9190";
pub const DEFAULT_HELLO_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Deserialize, Default)]
pub struct DaemonConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub ingress: IngressConfig,
    #[serde(default)]
    pub tunnel: TunnelConfig,
}

/// Where RPC ingress accepts newline-delimited JSON requests.
#[derive(Debug, Deserialize)]
pub struct IngressConfig {
    #[serde(default = "default_ingress_listen")]
    pub listen: String,
}

/// Where gateways dial in to establish their tunnels.
#[derive(Debug, Deserialize)]
pub struct TunnelConfig {
    #[serde(default = "default_tunnel_listen")]
    pub listen: String,
    /// How long a freshly accepted socket may take to send its hello frame.
    #[serde(default = "default_hello_timeout_ms")]
    pub hello_timeout_ms: u64,
}

impl TunnelConfig {
    pub fn hello_timeout(&self) -> Duration {
        Duration::from_millis(self.hello_timeout_ms)
    }
}

fn default_ingress_listen() -> String {
    DEFAULT_INGRESS_LISTEN.into()
}

fn default_tunnel_listen() -> String {
    DEFAULT_TUNNEL_LISTEN.into()
}

fn default_hello_timeout_ms() -> u64 {
    DEFAULT_HELLO_TIMEOUT_MS
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            listen: default_ingress_listen(),
        }
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            listen: default_tunnel_listen(),
            hello_timeout_ms: default_hello_timeout_ms(),
        }
    }
}

impl DaemonConfig {
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let input = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&input)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        config
            .registry
            .validate()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        Ok(config)
    }
}
