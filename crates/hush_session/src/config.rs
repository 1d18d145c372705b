use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use hush_crypto::identity::{DEFAULT_RSA_BITS, MIN_RSA_BITS};

use crate::error::{Result, SessionError};

pub const APP_QUALIFIER: &str = "org";
pub const APP_ORG: &str = "hush";
pub const APP_NAME: &str = "hush";

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    pub relay: RelaySettings,
    /// Display name announced in hello; prompted for when absent.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_rsa_bits")]
    pub rsa_bits: usize,
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_rsa_bits() -> usize {
    DEFAULT_RSA_BITS
}

fn default_log_filter() -> String {
    "info".into()
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            relay: RelaySettings {
                host: "127.0.0.1".into(),
                port: 8000,
            },
            username: None,
            rsa_bits: default_rsa_bits(),
            log_filter: default_log_filter(),
        }
    }
}

impl ClientSettings {
    /// Load from `path`, or from the per-user config dir when `path` is `None`.
    /// A missing explicit file is an error; a missing default file yields
    /// `ClientSettings::default()`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_settings_path() {
                Ok(p) => (p, false),
                Err(e) => {
                    tracing::debug!(error = %e, "no config directory, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !explicit && !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)?;
        let settings: Self = serde_json::from_str(&text)
            .map_err(|e| SessionError::Config(format!("{}: {e}", path.display())))?;
        settings.validate()?;
        tracing::debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| SessionError::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.rsa_bits < MIN_RSA_BITS {
            return Err(SessionError::Config(format!(
                "rsa_bits {} is below the {MIN_RSA_BITS}-bit minimum",
                self.rsa_bits
            )));
        }
        if self.relay.host.trim().is_empty() {
            return Err(SessionError::Config("relay host is empty".into()));
        }
        if matches!(&self.username, Some(u) if u.trim().is_empty()) {
            return Err(SessionError::Config("username is empty".into()));
        }
        Ok(())
    }

    pub fn relay_addr(&self) -> String {
        format!("{}:{}", self.relay.host, self.relay.port)
    }
}

pub fn config_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| SessionError::Config("cannot determine config directory".into()))?;
    Ok(dirs.config_dir().to_path_buf())
}

pub fn default_settings_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(SETTINGS_FILE))
}
