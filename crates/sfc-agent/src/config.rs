//! Agent configuration.
//!
//! Loaded from YAML, e.g. `/etc/sfc/agent.yaml`:
//!
//! ```yaml
//! bridge: br-int
//! local_host: compute-1
//! transport_ofport: 2
//! classifier_policy: exactly_one
//! ```

use crate::classifier::ClassifierPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {field} {message}")]
    Invalid { field: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Integration bridge the chain tables live on.
    #[serde(default = "default_bridge")]
    pub bridge: String,

    /// Binding host name of this agent. Next-hop members bound to this
    /// host are delivered locally instead of over the transport port.
    #[serde(default)]
    pub local_host: String,

    /// OpenFlow port number of the patch/tunnel port towards other hosts.
    #[serde(default = "default_transport_ofport")]
    pub transport_ofport: u32,

    #[serde(default)]
    pub classifier_policy: ClassifierPolicy,
}

fn default_bridge() -> String {
    "br-int".to_string()
}

fn default_transport_ofport() -> u32 {
    1
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bridge: default_bridge(),
            local_host: String::new(),
            transport_ofport: default_transport_ofport(),
            classifier_policy: ClassifierPolicy::default(),
        }
    }
}

impl AgentConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: AgentConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bridge.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "bridge",
                message: "must not be empty".to_string(),
            });
        }
        if self.local_host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "local_host",
                message: "must not be empty".to_string(),
            });
        }
        if self.transport_ofport == 0 {
            return Err(ConfigError::Invalid {
                field: "transport_ofport",
                message: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Freezes the settings the flow compiler reads.
    pub fn context(&self) -> CompilerContext {
        CompilerContext {
            bridge: self.bridge.clone(),
            local_host: self.local_host.clone(),
            transport_ofport: self.transport_ofport,
        }
    }
}

/// Immutable per-agent context passed to every compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerContext {
    pub bridge: String,
    pub local_host: String,
    pub transport_ofport: u32,
}

impl CompilerContext {
    pub fn new(local_host: impl Into<String>, transport_ofport: u32) -> Self {
        Self {
            bridge: default_bridge(),
            local_host: local_host.into(),
            transport_ofport,
        }
    }

    pub fn is_local(&self, host: Option<&str>) -> bool {
        host == Some(self.local_host.as_str())
    }
}
