//! Storage Seams
//!
//! Every persistence concern is a trait so features and providers can be
//! driven by the in-memory stores in tests and by SQLite in the binary.
//!
//! - [`SettingsRepository`]: one JSON document per option key
//! - [`TransientStore`]: expiring JSON values (diagnostics cache)
//! - [`ContentRepository`]: posts/attachments owned by the host platform
//! - [`TaxonomyStore`]: terms and term relationships owned by the host platform

pub mod content;
pub mod database;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::types::{ContentItem, Result, Term};

pub use content::{ContentFixtures, MemoryContent};
pub use database::{Database, PoolConfig, SharedDatabase};
pub use memory::MemoryStore;

pub trait SettingsRepository: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Value>>;
    fn save(&self, key: &str, value: &Value) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

pub trait TransientStore: Send + Sync {
    fn set_transient(&self, key: &str, value: &Value, ttl: Duration) -> Result<()>;
    /// Expired entries read as `None`
    fn get_transient(&self, key: &str) -> Result<Option<Value>>;
    fn delete_transient(&self, key: &str) -> Result<()>;
}

pub trait ContentRepository: Send + Sync {
    fn get_item(&self, id: u64) -> Result<Option<ContentItem>>;
    /// `None` deletes the meta key
    fn update_meta(&self, id: u64, key: &str, value: Option<Value>) -> Result<()>;
}

pub trait TaxonomyStore: Send + Sync {
    fn terms(&self, taxonomy: &str) -> Result<Vec<Term>>;
    /// Find a term by name or create it; returns the term ID
    fn ensure_term(&self, taxonomy: &str, name: &str) -> Result<u64>;
    fn object_terms(&self, object_id: u64, taxonomy: &str) -> Result<Vec<u64>>;
    fn set_object_terms(&self, object_id: u64, taxonomy: &str, term_ids: &[u64], append: bool) -> Result<()>;
    fn delete_object_terms(&self, object_id: u64, taxonomy: &str) -> Result<()>;
}

pub type SharedSettings = Arc<dyn SettingsRepository>;
pub type SharedTransients = Arc<dyn TransientStore>;
pub type SharedContent = Arc<dyn ContentRepository>;
pub type SharedTaxonomies = Arc<dyn TaxonomyStore>;
