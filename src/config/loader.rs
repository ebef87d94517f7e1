//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/quillmind/config.toml)
//! 3. Project config (.quillmind/config.toml)
//! 4. Environment variables (QUILLMIND_* prefix, `__` separates sections)

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use tracing::{debug, info};

use super::types::Config;
use crate::types::{QuillError, Result};

const ENV_PREFIX: &str = "QUILLMIND_";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        // QUILLMIND_HTTP__POST_TIMEOUT_SECS -> http.post_timeout_secs
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(true));

        Self::extract(figment)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        Self::extract(
            Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Toml::file(path)),
        )
    }

    fn extract(figment: Figment) -> Result<Config> {
        let config: Config = figment
            .extract()
            .map_err(|e| QuillError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Global config directory (~/.config/quillmind/ on Linux)
    pub fn global_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "quillmind").map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Project data directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".quillmind")
    }

    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    /// Default SQLite location when `storage.database_path` is unset
    pub fn default_database_path() -> PathBuf {
        Self::project_dir().join("quillmind.db")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Render the effective configuration as TOML (default), JSON or YAML
    pub fn render(config: &Config, format: &str) -> Result<String> {
        match format {
            "json" => Ok(serde_json::to_string_pretty(config)?),
            "yaml" => Ok(serde_yaml::to_string(config)?),
            _ => toml::to_string_pretty(config).map_err(|e| QuillError::Config(e.to_string())),
        }
    }

    /// Write a starter config file. Existing files are kept unless `force`.
    pub fn init(global: bool, force: bool) -> Result<PathBuf> {
        let path = if global {
            Self::global_config_path().ok_or_else(|| {
                QuillError::Config("Cannot determine global config directory".to_string())
            })?
        } else {
            Self::project_config_path()
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        if !path.exists() || force {
            fs::write(&path, Self::default_config_content())?;
            info!("Created config: {}", path.display());
        } else {
            info!("Config exists: {}", path.display());
        }

        Ok(path)
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn default_config_content() -> String {
        r#"# quillmind configuration
# Project settings in .quillmind/config.toml override ~/.config/quillmind/config.toml.

[storage]
# database_path = ".quillmind/quillmind.db"
in_memory = false

[http]
post_timeout_secs = 60
get_timeout_secs = 30

[server]
bind = "127.0.0.1:8787"
namespace = "quillmind/v1"

[access]
default_roles = ["administrator", "editor", "author", "contributor"]

# Endpoint overrides per provider
# [providers.xai_grok]
# model = "grok-2-1212"
# max_tokens = 131072

# Bearer tokens accepted by the HTTP surface
# [actors.change-me]
# user_id = 1
# roles = ["administrator"]
# capabilities = ["edit_posts", "upload_files", "manage_options", "manage_categories"]

[content]
# fixtures_path = ".quillmind/content.json"
"#
        .to_string()
    }
}
