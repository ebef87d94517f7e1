//! In-memory content and taxonomy collaborators.
//!
//! Seeded from a JSON (or YAML, by extension) fixtures file for CLI and
//! server runs:
//!
//! ```json
//! {
//!   "items": [{"id": 1, "title": "Hello", "content": "<p>World</p>"}],
//!   "terms": [{"id": 10, "taxonomy": "post_tag", "name": "rust"}]
//! }
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{ContentRepository, TaxonomyStore};
use crate::types::{ContentItem, QuillError, Result, Term};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentFixtures {
    #[serde(default)]
    pub items: Vec<ContentItem>,
    #[serde(default)]
    pub terms: Vec<Term>,
}

#[derive(Debug)]
pub struct MemoryContent {
    items: DashMap<u64, ContentItem>,
    terms: DashMap<String, Vec<Term>>,
    relationships: DashMap<(u64, String), Vec<u64>>,
    next_term_id: AtomicU64,
}

impl Default for MemoryContent {
    fn default() -> Self {
        Self {
            items: DashMap::new(),
            terms: DashMap::new(),
            relationships: DashMap::new(),
            next_term_id: AtomicU64::new(1),
        }
    }
}

impl MemoryContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixtures(fixtures: ContentFixtures) -> Self {
        let store = Self::new();
        for item in fixtures.items {
            store.insert_item(item);
        }
        for term in fixtures.terms {
            store.insert_term(term);
        }
        store
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        let parsed: std::result::Result<ContentFixtures, String> = if is_yaml {
            serde_yaml::from_str(&raw).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&raw).map_err(|e| e.to_string())
        };
        let fixtures = parsed.map_err(|e| {
            QuillError::Config(format!("Invalid content fixtures {}: {}", path.display(), e))
        })?;
        debug!(
            "Loaded {} items and {} terms from {}",
            fixtures.items.len(),
            fixtures.terms.len(),
            path.display()
        );
        Ok(Self::from_fixtures(fixtures))
    }

    pub fn insert_item(&self, item: ContentItem) {
        self.items.insert(item.id, item);
    }

    pub fn insert_term(&self, term: Term) {
        self.next_term_id.fetch_max(term.id + 1, Ordering::SeqCst);
        self.terms.entry(term.taxonomy.clone()).or_default().push(term);
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

impl ContentRepository for MemoryContent {
    fn get_item(&self, id: u64) -> Result<Option<ContentItem>> {
        Ok(self.items.get(&id).map(|i| i.value().clone()))
    }

    fn update_meta(&self, id: u64, key: &str, value: Option<Value>) -> Result<()> {
        let mut item = self
            .items
            .get_mut(&id)
            .ok_or_else(|| QuillError::Storage(format!("Content item {} not found", id)))?;
        match value {
            Some(v) => {
                item.meta.insert(key.to_string(), v);
            }
            None => {
                item.meta.remove(key);
            }
        }
        Ok(())
    }
}

impl TaxonomyStore for MemoryContent {
    fn terms(&self, taxonomy: &str) -> Result<Vec<Term>> {
        Ok(self
            .terms
            .get(taxonomy)
            .map(|t| t.value().clone())
            .unwrap_or_default())
    }

    fn ensure_term(&self, taxonomy: &str, name: &str) -> Result<u64> {
        let mut terms = self.terms.entry(taxonomy.to_string()).or_default();
        if let Some(existing) = terms.iter().find(|t| t.name.eq_ignore_ascii_case(name)) {
            return Ok(existing.id);
        }
        let id = self.next_term_id.fetch_add(1, Ordering::SeqCst);
        terms.push(Term {
            id,
            taxonomy: taxonomy.to_string(),
            name: name.to_string(),
            parent: 0,
        });
        Ok(id)
    }

    fn object_terms(&self, object_id: u64, taxonomy: &str) -> Result<Vec<u64>> {
        Ok(self
            .relationships
            .get(&(object_id, taxonomy.to_string()))
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }

    fn set_object_terms(&self, object_id: u64, taxonomy: &str, term_ids: &[u64], append: bool) -> Result<()> {
        let mut linked = self
            .relationships
            .entry((object_id, taxonomy.to_string()))
            .or_default();
        if !append {
            linked.clear();
        }
        for id in term_ids {
            if !linked.contains(id) {
                linked.push(*id);
            }
        }
        Ok(())
    }

    fn delete_object_terms(&self, object_id: u64, taxonomy: &str) -> Result<()> {
        self.relationships.remove(&(object_id, taxonomy.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_meta_update_and_delete() {
        let store = MemoryContent::new();
        store.insert_item(ContentItem::new(1, "Title", "Body"));

        store
            .update_meta(1, "_classifai_error", Some(json!({"code": "x"})))
            .unwrap();
        let item = store.get_item(1).unwrap().unwrap();
        assert_eq!(item.meta["_classifai_error"], json!({"code": "x"}));

        store.update_meta(1, "_classifai_error", None).unwrap();
        assert!(store.get_item(1).unwrap().unwrap().meta.is_empty());
        assert!(store.update_meta(99, "k", None).is_err());
    }

    #[test]
    fn test_ensure_term_reuses_existing() {
        let store = MemoryContent::new();
        store.insert_term(Term {
            id: 10,
            taxonomy: "post_tag".into(),
            name: "Rust".into(),
            parent: 0,
        });

        assert_eq!(store.ensure_term("post_tag", "rust").unwrap(), 10);
        let created = store.ensure_term("post_tag", "Tokio").unwrap();
        assert_eq!(created, 11);
        assert_eq!(store.terms("post_tag").unwrap().len(), 2);
    }

    #[test]
    fn test_object_terms_replace_and_append() {
        let store = MemoryContent::new();
        store.set_object_terms(1, "category", &[1, 2], false).unwrap();
        store.set_object_terms(1, "category", &[2, 3], true).unwrap();
        assert_eq!(store.object_terms(1, "category").unwrap(), vec![1, 2, 3]);

        store.set_object_terms(1, "category", &[4], false).unwrap();
        assert_eq!(store.object_terms(1, "category").unwrap(), vec![4]);

        store.delete_object_terms(1, "category").unwrap();
        assert!(store.object_terms(1, "category").unwrap().is_empty());
    }

    #[test]
    fn test_load_fixtures() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"items": [{{"id": 5, "title": "Fixture"}}], "terms": [{{"id": 3, "taxonomy": "category", "name": "News"}}]}}"#
        )
        .unwrap();

        let store = MemoryContent::load(file.path()).unwrap();
        assert_eq!(store.item_count(), 1);
        assert_eq!(store.get_item(5).unwrap().unwrap().title, "Fixture");
        assert_eq!(store.terms("category").unwrap()[0].name, "News");
    }

    #[test]
    fn test_load_yaml_fixtures() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            "items:\n  - id: 9\n    title: From YAML\n    post_type: page\nterms: []\n"
        )
        .unwrap();

        let store = MemoryContent::load(file.path()).unwrap();
        let item = store.get_item(9).unwrap().unwrap();
        assert_eq!(item.title, "From YAML");
        assert_eq!(item.post_type, "page");
        assert!(item.show_in_rest);
    }
}
