//! Linker configuration loaded from TOML.
//!
//! ```toml
//! site_policy = "chained"          # or "monomorphic"
//! max_chain_length = 8
//! eviction = "fifo"                # or "megamorphic"
//! unstable_relink_threshold = 8    # 0 disables
//! sync_on_relink = false
//! discovery_scope = "ruby"         # omit to discover every exporter
//! member_cache_capacity = 256
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::call_site::{EvictionPolicy, SitePolicy, DEFAULT_MAX_CHAIN_LENGTH};
use crate::dynamic_linker::DEFAULT_UNSTABLE_RELINK_THRESHOLD;
use crate::linker::DEFAULT_MEMBER_CACHE_CAPACITY;

/// Which call-site implementation to create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    Monomorphic,
    #[default]
    Chained,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkerConfig {
    pub site_policy: SiteKind,
    pub max_chain_length: usize,
    pub eviction: EvictionPolicy,
    pub unstable_relink_threshold: u64,
    pub sync_on_relink: bool,
    pub discovery_scope: Option<String>,
    pub member_cache_capacity: usize,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            site_policy: SiteKind::Chained,
            max_chain_length: DEFAULT_MAX_CHAIN_LENGTH,
            eviction: EvictionPolicy::Fifo,
            unstable_relink_threshold: DEFAULT_UNSTABLE_RELINK_THRESHOLD,
            sync_on_relink: false,
            discovery_scope: None,
            member_cache_capacity: DEFAULT_MEMBER_CACHE_CAPACITY,
        }
    }
}

impl LinkerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: LinkerConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chain_length == 0 {
            return Err(ConfigError::Invalid(
                "max_chain_length must be at least 1".to_string(),
            ));
        }
        if self.member_cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "member_cache_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn site_policy(&self) -> SitePolicy {
        match self.site_policy {
            SiteKind::Monomorphic => SitePolicy::Monomorphic,
            SiteKind::Chained => SitePolicy::Chained {
                max_chain_length: self.max_chain_length,
                eviction: self.eviction,
            },
        }
    }

    // Builder-style setters, mirroring the TOML keys

    pub fn with_site_policy(mut self, kind: SiteKind) -> Self {
        self.site_policy = kind;
        self
    }

    pub fn with_max_chain_length(mut self, max: usize) -> Self {
        self.max_chain_length = max;
        self
    }

    pub fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn with_discovery_scope(mut self, scope: impl Into<String>) -> Self {
        self.discovery_scope = Some(scope.into());
        self
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            ConfigError::Parse(e) => write!(f, "Invalid linker config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid linker config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}
