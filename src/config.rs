use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from gatherd.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct GatherdConfig {
    pub pf: PfConfig,
    pub webhooks: WebhooksConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PfConfig {
    /// Status command, looked up on the search path unless it contains a `/`.
    pub command: String,
    /// Run the command through `sudo_command`. Needs a passwordless sudo rule.
    pub use_sudo: bool,
    pub sudo_command: String,
    /// Overrides `$PATH` for command lookup.
    pub search_path: Option<String>,
    /// Seconds between cycles in `gather --interval` mode.
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhooksConfig {
    pub bind: String,
    pub port: u16,
    pub kong: KongConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KongConfig {
    pub path: String,
    /// Request bodies larger than this are rejected with 400.
    pub max_body_bytes: usize,
}

// --- Default implementations ---

impl Default for PfConfig {
    fn default() -> Self {
        Self {
            command: "pfctl".to_string(),
            use_sudo: false,
            sudo_command: "sudo".to_string(),
            search_path: None,
            interval_secs: 10,
        }
    }
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 1619,
            kong: KongConfig::default(),
        }
    }
}

impl Default for KongConfig {
    fn default() -> Self {
        Self {
            path: "/kong".to_string(),
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Errors from loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

/// Load config from `path`. A missing file means all defaults.
pub fn load_config(path: &Path) -> Result<GatherdConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(GatherdConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}
