use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use crate::identity::{IdentityError, PartyDirectory, PartyKey};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid party {name}: {source}")]
    Party {
        name: String,
        #[source]
        source: IdentityError,
    },
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct AccountsConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub node: Option<NodeConfig>,
    #[serde(default)]
    pub parties: Vec<PartyConfig>,
    /// Directory of the loaded file; relative key files resolve against it.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// The party this node hosts accounts as.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub name: String,
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
}

fn default_key_file() -> PathBuf {
    PathBuf::from("pk.hex")
}

/// A remote party: name and hex encoded ed25519 verifying key.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct PartyConfig {
    pub name: String,
    pub key: String,
}

impl AccountsConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&raw)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Missing files fall back to defaults; unreadable or malformed ones fail.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn node_key_path(&self, node: &NodeConfig) -> PathBuf {
        match &self.base_dir {
            Some(base) if node.key_file.is_relative() => base.join(&node.key_file),
            _ => node.key_file.clone(),
        }
    }

    /// Known parties plus the local node, if configured.
    pub fn directory(&self) -> Result<PartyDirectory, ConfigError> {
        let mut directory = PartyDirectory::new();
        for party in &self.parties {
            let key = PartyKey::from_hex(&party.key).map_err(|source| ConfigError::Party {
                name: party.name.clone(),
                source,
            })?;
            register(&mut directory, &party.name, key)?;
        }
        if let Some(node) = &self.node {
            let key_path = self.node_key_path(node);
            let encoded = fs::read_to_string(&key_path).map_err(|source| ConfigError::Io {
                path: key_path.clone(),
                source,
            })?;
            let key = PartyKey::from_hex(&encoded).map_err(|source| ConfigError::Party {
                name: node.name.clone(),
                source,
            })?;
            register(&mut directory, &node.name, key)?;
        }
        Ok(directory)
    }
}

fn register(directory: &mut PartyDirectory, name: &str, key: PartyKey) -> Result<(), ConfigError> {
    directory
        .register(name, key)
        .map(|_| ())
        .map_err(|source| ConfigError::Party {
            name: name.to_string(),
            source,
        })
}
