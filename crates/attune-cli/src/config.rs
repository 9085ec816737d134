//! Configuration file management for attune.
//!
//! Provides a TOML-based config file at `~/.config/attune/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use attune_core::config::ServiceConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub service: ServiceSection,
    #[serde(default)]
    pub session: SessionSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceSection {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SessionSection {
    /// User whose plan the session commands operate on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

fn default_timeout_secs() -> u64 {
    ServiceConfig::DEFAULT_TIMEOUT_SECS
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the attune config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/attune` or `~/.config/attune`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("attune");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("attune")
}

/// Return the path to the attune config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct AttuneConfig {
    pub service: ServiceConfig,
    pub user_id: String,
}

impl AttuneConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// A config file that exists but cannot be parsed is an error; a missing
    /// one is skipped.
    pub fn resolve(cli_base_url: Option<&str>, cli_user: Option<&str>) -> Result<Self> {
        let file_config = if config_path().exists() {
            Some(load_config()?)
        } else {
            None
        };
        Self::resolve_with(cli_base_url, cli_user, file_config.as_ref())
    }

    /// Resolve against an already-loaded config file.
    ///
    /// - Base URL: `cli_base_url` > `ATTUNE_BASE_URL` > `service.base_url` > `ServiceConfig::DEFAULT_BASE_URL`
    /// - Timeout: `ATTUNE_TIMEOUT_SECS` > `service.timeout_secs` > `ServiceConfig::DEFAULT_TIMEOUT_SECS`
    /// - User: `cli_user` > `ATTUNE_USER_ID` > `session.user_id` > error
    pub fn resolve_with(
        cli_base_url: Option<&str>,
        cli_user: Option<&str>,
        file_config: Option<&ConfigFile>,
    ) -> Result<Self> {
        let base_url = if let Some(url) = cli_base_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("ATTUNE_BASE_URL") {
            url
        } else if let Some(cfg) = file_config {
            cfg.service.base_url.clone()
        } else {
            ServiceConfig::DEFAULT_BASE_URL.to_string()
        };

        let timeout_secs = if let Ok(raw) = std::env::var("ATTUNE_TIMEOUT_SECS") {
            raw.trim()
                .parse::<u64>()
                .with_context(|| format!("ATTUNE_TIMEOUT_SECS is not a whole number of seconds: {raw:?}"))?
        } else if let Some(cfg) = file_config {
            cfg.service.timeout_secs
        } else {
            ServiceConfig::DEFAULT_TIMEOUT_SECS
        };
        if timeout_secs == 0 {
            bail!("request timeout must be at least one second");
        }

        let user_id = if let Some(user) = cli_user {
            user.to_string()
        } else if let Ok(user) = std::env::var("ATTUNE_USER_ID") {
            user
        } else if let Some(user) = file_config.and_then(|cfg| cfg.session.user_id.clone()) {
            user
        } else {
            bail!(
                "no user id; pass --user, set ATTUNE_USER_ID, or run `attune init --user <id>`"
            );
        };
        if user_id.trim().is_empty() {
            bail!("user id must not be empty");
        }

        Ok(Self {
            service: ServiceConfig::new(base_url)
                .with_timeout(Duration::from_secs(timeout_secs)),
            user_id,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
