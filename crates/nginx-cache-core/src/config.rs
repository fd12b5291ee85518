use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Environment variable consulted for the settings file location.
pub const CONFIG_ENV: &str = "NGINX_CACHE_CONFIG";

pub const DEFAULT_NONCE_LIFETIME_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CoreConfig {
    #[serde(default)]
    pub cache: CacheZoneConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// Event names that trigger an automatic purge. `None` keeps the defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purge_actions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheZoneConfig {
    /// Absolute location of the cache zone. Empty until an operator sets it.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub auto_purge: bool,
}

impl CacheZoneConfig {
    pub fn is_configured(&self) -> bool {
        !self.path.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityConfig {
    #[serde(default)]
    pub nonce_secret: String,
    #[serde(default = "default_nonce_lifetime")]
    pub nonce_lifetime_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            nonce_secret: String::new(),
            nonce_lifetime_secs: DEFAULT_NONCE_LIFETIME_SECS,
        }
    }
}

fn default_nonce_lifetime() -> u64 {
    DEFAULT_NONCE_LIFETIME_SECS
}

impl CoreConfig {
    /// Reads the settings file. A missing file yields the defaults.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file missing, using defaults");
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)?;
        let cfg: CoreConfig = serde_json::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn require_nonce_secret(&self) -> CoreResult<&str> {
        let secret = self.security.nonce_secret.trim();
        if secret.is_empty() {
            return Err(CoreError::Config(
                "security.nonce_secret is required for manual purges".to_string(),
            ));
        }
        Ok(secret)
    }
}
