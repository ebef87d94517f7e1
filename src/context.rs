//! Application Context
//!
//! Everything a feature or provider reaches for at request time: the
//! settings and diagnostics stores, the host platform's content and
//! taxonomy collaborators, hooks, the normalizer, provider endpoints and a
//! shared HTTP client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::ai::hooks::Hooks;
use crate::ai::normalizer::ContentNormalizer;
use crate::ai::provider::{Endpoint, ProviderId, SharedProvider, create_provider};
use crate::ai::request::{ApiRequest, Credentials};
use crate::config::{Config, ConfigLoader};
use crate::constants::network;
use crate::feature::{Feature, FeatureId};
use crate::storage::{
    Database, MemoryContent, MemoryStore, PoolConfig, SharedContent, SharedSettings,
    SharedTaxonomies, SharedTransients,
};
use crate::types::Result;

pub type SharedContext = Arc<AppContext>;

pub struct AppContext {
    pub settings: SharedSettings,
    pub transients: SharedTransients,
    pub content: SharedContent,
    pub taxonomies: SharedTaxonomies,
    pub hooks: Hooks,
    pub normalizer: ContentNormalizer,
    providers: HashMap<ProviderId, SharedProvider>,
    endpoints: HashMap<ProviderId, Endpoint>,
    default_roles: Vec<String>,
    http: reqwest::Client,
    post_timeout: Duration,
    get_timeout: Duration,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("hooks", &self.hooks)
            .field("endpoints", &self.endpoints)
            .field("default_roles", &self.default_roles)
            .field("post_timeout", &self.post_timeout)
            .field("get_timeout", &self.get_timeout)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    pub fn builder() -> AppContextBuilder {
        AppContextBuilder::default()
    }

    /// Context backed entirely by in-memory stores
    pub fn in_memory() -> Self {
        Self::builder().build()
    }

    /// Build from configuration: SQLite (or memory) settings, fixture
    /// content, endpoint overrides and timeouts
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut builder = Self::builder()
            .default_roles(config.access.default_roles.clone())
            .timeouts(
                Duration::from_secs(config.http.post_timeout_secs),
                Duration::from_secs(config.http.get_timeout_secs),
            );

        for id in ProviderId::ALL {
            builder = builder.endpoint(id, config.endpoint(id));
        }

        if !config.storage.in_memory {
            let path = config
                .storage
                .database_path
                .clone()
                .unwrap_or_else(ConfigLoader::default_database_path);
            let pool = match config.storage.pool_max_size {
                Some(max_size) => PoolConfig {
                    max_size,
                    ..PoolConfig::default()
                },
                None => PoolConfig::auto(),
            };
            let db = Arc::new(Database::open_with_config(&path, pool)?);
            let purged = db.purge_expired()?;
            debug!(path = %path.display(), purged, "Opened settings database");
            builder = builder.settings(db.clone()).transients(db);
        }

        if let Some(path) = &config.content.fixtures_path {
            let content = Arc::new(MemoryContent::load(path)?);
            info!(path = %path.display(), items = content.item_count(), "Loaded content fixtures");
            builder = builder.content(content.clone()).taxonomies(content);
        }

        Ok(builder.build())
    }

    pub fn feature(&self, id: FeatureId) -> Feature<'_> {
        Feature::new(id, self)
    }

    pub fn provider(&self, id: ProviderId) -> SharedProvider {
        self.providers
            .get(&id)
            .cloned()
            .unwrap_or_else(|| create_provider(id))
    }

    /// Effective endpoint: configured override or the built-in value
    pub fn endpoint(&self, id: ProviderId) -> Endpoint {
        self.endpoints
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Endpoint::builtin(id))
    }

    /// Request client scoped to a feature
    pub fn request(&self, credentials: Credentials, feature: FeatureId) -> ApiRequest {
        ApiRequest::new(self.http.clone(), credentials, feature.as_str())
            .with_timeouts(self.post_timeout, self.get_timeout)
    }

    pub fn default_roles(&self) -> &[String] {
        &self.default_roles
    }
}

// =============================================================================
// Builder
// =============================================================================

#[derive(Default)]
pub struct AppContextBuilder {
    settings: Option<SharedSettings>,
    transients: Option<SharedTransients>,
    content: Option<SharedContent>,
    taxonomies: Option<SharedTaxonomies>,
    hooks: Hooks,
    normalizer: Option<ContentNormalizer>,
    providers: HashMap<ProviderId, SharedProvider>,
    endpoints: HashMap<ProviderId, Endpoint>,
    default_roles: Option<Vec<String>>,
    timeouts: Option<(Duration, Duration)>,
}

impl AppContextBuilder {
    pub fn settings(mut self, settings: SharedSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn transients(mut self, transients: SharedTransients) -> Self {
        self.transients = Some(transients);
        self
    }

    pub fn content(mut self, content: SharedContent) -> Self {
        self.content = Some(content);
        self
    }

    pub fn taxonomies(mut self, taxonomies: SharedTaxonomies) -> Self {
        self.taxonomies = Some(taxonomies);
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn normalizer(mut self, normalizer: ContentNormalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Replace a provider implementation
    pub fn provider(mut self, provider: SharedProvider) -> Self {
        self.providers.insert(provider.id(), provider);
        self
    }

    pub fn endpoint(mut self, id: ProviderId, endpoint: Endpoint) -> Self {
        self.endpoints.insert(id, endpoint);
        self
    }

    pub fn default_roles(mut self, roles: Vec<String>) -> Self {
        self.default_roles = Some(roles);
        self
    }

    pub fn timeouts(mut self, post: Duration, get: Duration) -> Self {
        self.timeouts = Some((post, get));
        self
    }

    pub fn build(self) -> AppContext {
        let memory = Arc::new(MemoryStore::new());
        let content = Arc::new(MemoryContent::new());
        let (post_timeout, get_timeout) = self.timeouts.unwrap_or((
            Duration::from_secs(network::DEFAULT_POST_TIMEOUT_SECS),
            Duration::from_secs(network::DEFAULT_GET_TIMEOUT_SECS),
        ));

        let mut providers = self.providers;
        for id in ProviderId::ALL {
            providers.entry(id).or_insert_with(|| create_provider(id));
        }

        AppContext {
            settings: self.settings.unwrap_or_else(|| memory.clone()),
            transients: self.transients.unwrap_or(memory),
            content: self.content.unwrap_or_else(|| content.clone()),
            taxonomies: self.taxonomies.unwrap_or(content),
            hooks: self.hooks,
            normalizer: self.normalizer.unwrap_or_default(),
            providers,
            endpoints: self.endpoints,
            default_roles: self
                .default_roles
                .unwrap_or_else(|| crate::config::AccessConfig::default().default_roles),
            http: default_client(),
            post_timeout,
            get_timeout,
        }
    }
}

fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(network::USER_AGENT)
        .build()
        .unwrap_or_default()
}

/// Build a shared context from configuration
pub fn shared_from_config(config: &Config) -> Result<SharedContext> {
    AppContext::from_config(config).map(Arc::new)
}
