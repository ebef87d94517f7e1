//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/quillmind/) and project (.quillmind/) level
//! configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ai::provider::{Endpoint, ProviderId};
use crate::constants::{network, server};
use crate::types::{Actor, QuillError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings and diagnostics persistence
    pub storage: StorageConfig,

    /// Upstream HTTP client settings
    pub http: HttpConfig,

    /// HTTP surface settings
    pub server: ServerConfig,

    /// Per-provider endpoint overrides keyed by provider ID
    pub providers: BTreeMap<String, EndpointOverride>,

    /// Access control defaults
    pub access: AccessConfig,

    /// Static bearer tokens mapped to actors
    pub actors: BTreeMap<String, ActorConfig>,

    /// Content and taxonomy fixtures
    pub content: ContentConfig,
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `QuillError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if self.http.post_timeout_secs == 0 || self.http.get_timeout_secs == 0 {
            return Err(QuillError::Config(
                "http timeouts must be greater than 0".to_string(),
            ));
        }

        for (id, endpoint) in &self.providers {
            id.parse::<ProviderId>()
                .map_err(|_| QuillError::Config(format!("Unknown provider in [providers]: {}", id)))?;

            if let Some(ratio) = endpoint.tokens_per_word
                && ratio <= 0.0
            {
                return Err(QuillError::Config(format!(
                    "providers.{}.tokens_per_word must be greater than 0, got {}",
                    id, ratio
                )));
            }
            for (field, value) in [("url", &endpoint.url), ("auth_url", &endpoint.auth_url)] {
                if let Some(value) = value
                    && let Err(e) = url::Url::parse(value)
                {
                    return Err(QuillError::Config(format!(
                        "providers.{}.{} is not a valid URL ({}): {}",
                        id, field, e, value
                    )));
                }
            }
            if endpoint.max_tokens == Some(0) {
                return Err(QuillError::Config(format!(
                    "providers.{}.max_tokens must be greater than 0",
                    id
                )));
            }
        }

        if self.server.namespace.trim_matches('/').is_empty() {
            return Err(QuillError::Config(
                "server.namespace must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Built-in endpoint with any configured override applied
    pub fn endpoint(&self, id: ProviderId) -> Endpoint {
        let builtin = Endpoint::builtin(id);
        match self.providers.get(id.as_str()) {
            Some(over) => over.apply(builtin),
            None => builtin,
        }
    }

    /// Bearer token → actor table for the HTTP surface
    pub fn actor_entries(&self) -> Vec<(String, Actor)> {
        self.actors
            .iter()
            .map(|(token, actor)| (token.clone(), actor.to_actor()))
            .collect()
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file; defaults to `.quillmind/quillmind.db`
    pub database_path: Option<PathBuf>,

    /// Keep settings in memory only
    pub in_memory: bool,

    /// Connection pool size; auto-sized when unset
    pub pool_max_size: Option<u32>,
}

// =============================================================================
// HTTP Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub post_timeout_secs: u64,
    pub get_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            post_timeout_secs: network::DEFAULT_POST_TIMEOUT_SECS,
            get_timeout_secs: network::DEFAULT_GET_TIMEOUT_SECS,
        }
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Route prefix, e.g. `quillmind/v1`
    pub namespace: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: server::DEFAULT_BIND.to_string(),
            namespace: server::DEFAULT_NAMESPACE.to_string(),
        }
    }
}

// =============================================================================
// Provider Overrides
// =============================================================================

/// Partial endpoint; unset fields keep the built-in value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_per_word: Option<f64>,
}

impl EndpointOverride {
    pub fn apply(&self, mut endpoint: Endpoint) -> Endpoint {
        if let Some(url) = &self.url {
            endpoint.url = url.clone();
        }
        if let Some(auth_url) = &self.auth_url {
            endpoint.auth_url = Some(auth_url.clone());
        }
        if let Some(model) = &self.model {
            endpoint.model = Some(model.clone());
        }
        if let Some(vision_model) = &self.vision_model {
            endpoint.vision_model = Some(vision_model.clone());
        }
        if let Some(max_tokens) = self.max_tokens {
            endpoint.max_tokens = max_tokens;
        }
        if let Some(ratio) = self.tokens_per_word {
            endpoint.tokens_per_word = ratio;
        }
        endpoint
    }
}

// =============================================================================
// Access and Actors
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Roles seeded into every feature's default `roles`
    pub default_roles: Vec<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            default_roles: ["administrator", "editor", "author", "contributor"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    pub user_id: u64,
    pub roles: Vec<String>,
    pub capabilities: Vec<String>,
    /// Feature IDs the user opted out of
    pub opted_out: Vec<String>,
}

impl ActorConfig {
    pub fn to_actor(&self) -> Actor {
        let mut actor = Actor::new(self.user_id, self.roles.iter().cloned())
            .with_capabilities(self.capabilities.iter().cloned());
        for feature in &self.opted_out {
            actor = actor.with_opt_out(feature.clone());
        }
        actor
    }
}

// =============================================================================
// Content Fixtures
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// JSON file with `items` and `terms` seeding the in-memory collaborators
    pub fixtures_path: Option<PathBuf>,
}
