//! Server configuration loaded from `drydock.toml`.
//!
//! # Example
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"     # Network interface (127.0.0.1 = localhost only)
//! port = 8080                 # Base HTTP port
//! environment = "development" # development probes ports, production binds exactly
//!
//! [bundle]
//! path = ".drydock/bundle/handlers.so"
//! ```
//!
//! Use `interface = "0.0.0.0"` to make the server accessible from LAN.

use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Server environment, driving port negotiation and deploy reproducibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// `[serve]` section: where and how the server binds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeSection {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    pub interface: IpAddr,

    /// Base HTTP port. Development probes upward from here; production
    /// binds exactly this port or refuses to start.
    pub port: u16,

    /// Server environment.
    pub environment: Environment,
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 8080,
            environment: Environment::Development,
        }
    }
}

/// `[bundle]` section: where the build tool drops compiled handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleSection {
    /// Handler bundle path, relative to the project root.
    pub path: PathBuf,
}

impl Default for BundleSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from(format!(
                ".drydock/bundle/handlers{}",
                std::env::consts::DLL_SUFFIX
            )),
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub serve: ServeSection,
    pub bundle: BundleSection,

    /// Project root directory (set at load time, not part of the file).
    #[serde(skip)]
    pub root: PathBuf,
}

impl ServerConfig {
    /// Load configuration from `<root>/<config>`; a missing file yields
    /// defaults (a fresh project has not written drydock.toml yet).
    pub fn load(root: &Path, config_name: &Path) -> Result<Self> {
        let config_path = root.join(config_name);
        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?;
            toml::from_str::<Self>(&content)
                .with_context(|| format!("failed to parse {}", config_path.display()))?
        } else {
            Self::default()
        };
        config.root = root.to_path_buf();
        Ok(config)
    }

    /// Directory holding the server's on-disk coordination files.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(".drydock").join("server")
    }

    /// Server record file (`ServerRecord` as JSON).
    pub fn record_path(&self) -> PathBuf {
        self.state_dir().join("state.json")
    }

    /// Command mailbox file (one JSON command per line).
    pub fn mailbox_path(&self) -> PathBuf {
        self.state_dir().join("requests.jsonl")
    }

    /// Absolute path of the handler bundle.
    pub fn bundle_path(&self) -> PathBuf {
        self.root.join(&self.bundle.path)
    }
}

#[cfg(test)]
pub fn test_parse_config(content: &str) -> ServerConfig {
    toml::from_str(content).expect("test config should parse")
}
