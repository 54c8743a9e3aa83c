//! Client configuration, read from `SC_*` environment variables with
//! per-user data directory defaults.

use std::path::PathBuf;
use std::str::FromStr;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sc_store::vault::DEFAULT_AUTO_LOCK_SECS;

pub const APP_QUALIFIER: &str = "net";
pub const APP_ORG: &str = "securechat";
pub const APP_NAME: &str = "secure-chat";

pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 25 * 1024 * 1024;

/// What to do when an outgoing message cannot be encrypted for every member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendPolicy {
    /// Refuse with `EncryptionUnavailable`.
    #[default]
    Require,
    /// Encrypt when possible, otherwise send plaintext and warn the caller.
    Prefer,
    /// Never encrypt.
    Plaintext,
}

impl FromStr for SendPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "require" => Ok(Self::Require),
            "prefer" => Ok(Self::Prefer),
            "plaintext" => Ok(Self::Plaintext),
            other => Err(ConfigError::InvalidValue {
                var: "SC_SEND_POLICY",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Cannot determine a data directory; set SC_DATA_DIR")]
    NoDataDir,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub data_dir: PathBuf,
    pub send_policy: SendPolicy,
    /// 0 disables auto-lock.
    pub vault_auto_lock_secs: u64,
    pub max_attachment_bytes: u64,
}

impl ClientConfig {
    /// Defaults with an explicit data directory (tests, embedding).
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            send_policy: SendPolicy::default(),
            vault_auto_lock_secs: DEFAULT_AUTO_LOCK_SECS,
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match lookup("SC_DATA_DIR") {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => default_data_dir()?,
        };
        let mut config = Self::with_data_dir(data_dir);

        if let Some(policy) = lookup("SC_SEND_POLICY") {
            config.send_policy = policy.parse()?;
        }
        if let Some(secs) = lookup("SC_VAULT_AUTO_LOCK_SECS") {
            config.vault_auto_lock_secs = parse_u64("SC_VAULT_AUTO_LOCK_SECS", &secs)?;
        }
        if let Some(bytes) = lookup("SC_MAX_ATTACHMENT_BYTES") {
            config.max_attachment_bytes = parse_u64("SC_MAX_ATTACHMENT_BYTES", &bytes)?;
        }
        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("keys.db")
    }
}

fn parse_u64(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}

pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(ConfigError::NoDataDir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn env_overrides_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("SC_DATA_DIR", "/tmp/sc-test"),
            ("SC_SEND_POLICY", "Prefer"),
            ("SC_VAULT_AUTO_LOCK_SECS", "0"),
            ("SC_MAX_ATTACHMENT_BYTES", "1024"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/sc-test"));
        assert_eq!(config.send_policy, SendPolicy::Prefer);
        assert_eq!(config.vault_auto_lock_secs, 0);
        assert_eq!(config.max_attachment_bytes, 1024);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/sc-test/keys.db"));
    }

    #[test]
    fn defaults_require_encryption() {
        let config = ClientConfig::from_lookup(lookup(&[("SC_DATA_DIR", "/tmp/x")])).unwrap();
        assert_eq!(config.send_policy, SendPolicy::Require);
        assert_eq!(config.max_attachment_bytes, DEFAULT_MAX_ATTACHMENT_BYTES);
    }

    #[test]
    fn bad_values_rejected() {
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("SC_DATA_DIR", "/x"), ("SC_SEND_POLICY", "maybe")])),
            Err(ConfigError::InvalidValue { var: "SC_SEND_POLICY", .. })
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("SC_DATA_DIR", "/x"), ("SC_MAX_ATTACHMENT_BYTES", "-1")])),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
