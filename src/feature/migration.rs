//! Legacy Settings Migration
//!
//! Older installs stored one flat document per provider holding every
//! feature's keys side by side. Migration lifts a feature's keys out of that
//! shape into the nested-by-provider document. Keys already in the nested
//! shape are left alone, so running it again is a no-op.

use serde_json::{Map, Value, json};

use super::catalog::{FeatureId, LegacyLayout};
use super::settings::truthy;

/// Map a legacy enable flag onto `status`
fn legacy_status(value: &Value) -> Value {
    if truthy(value) {
        json!("enabled")
    } else {
        json!("disabled")
    }
}

/// Move nested legacy objects' keys up to the top level
fn lift(doc: &mut Map<String, Value>, layout: &LegacyLayout) -> bool {
    let mut changed = false;
    for key in layout.lifted {
        if let Some(Value::Object(inner)) = doc.remove(*key) {
            for (k, v) in inner {
                doc.entry(k).or_insert(v);
            }
            changed = true;
        }
    }
    changed
}

/// Convert a legacy-shaped document for `feature`.
///
/// Returns the migrated document and whether anything changed.
pub fn migrate_document(feature: FeatureId, doc: &Map<String, Value>) -> (Map<String, Value>, bool) {
    let Some(layout) = feature.legacy_layout() else {
        return (doc.clone(), false);
    };

    let mut out = doc.clone();
    let mut changed = lift(&mut out, &layout);

    if let Some(flag) = out.remove(layout.enable_key) {
        out.entry("status").or_insert_with(|| legacy_status(&flag));
        changed = true;
    }

    let mut provider_doc = out
        .remove(layout.provider.as_str())
        .and_then(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .unwrap_or_default();
    let mut moved_provider_keys = false;
    for (old, new) in layout.provider_keys {
        if let Some(value) = out.remove(*old) {
            provider_doc.entry(new.to_string()).or_insert(value);
            moved_provider_keys = true;
        }
    }
    if moved_provider_keys || !provider_doc.is_empty() {
        out.insert(layout.provider.as_str().to_string(), Value::Object(provider_doc));
    }
    changed |= moved_provider_keys;

    for (old, new) in layout.feature_keys {
        if let Some(value) = out.remove(*old) {
            out.entry(new.to_string()).or_insert(value);
            changed = true;
        }
    }

    for suffix in ["roles", "users", "user_based_opt_out"] {
        let legacy_key = format!("{}_{}", layout.access_prefix, suffix);
        if let Some(value) = out.remove(&legacy_key) {
            out.entry(suffix.to_string()).or_insert(value);
            changed = true;
        }
    }

    if changed {
        out.entry("provider")
            .or_insert_with(|| json!(layout.provider.as_str()));
    }

    (out, changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_chatgpt() -> Map<String, Value> {
        json!({
            "api_key": "sk-old",
            "authenticated": true,
            "enable_titles": "1",
            "number_titles": 3,
            "title_generation_roles": ["editor"],
            "title_generation_users": [4],
            "title_generation_user_based_opt_out": "no",
            "enable_excerpt": "no",
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_migrate_title_generation() {
        let (doc, changed) = migrate_document(FeatureId::TitleGeneration, &legacy_chatgpt());
        assert!(changed);
        assert_eq!(doc["status"], "enabled");
        assert_eq!(doc["provider"], "openai_chatgpt");
        assert_eq!(doc["openai_chatgpt"]["api_key"], "sk-old");
        assert_eq!(doc["openai_chatgpt"]["number_of_suggestions"], 3);
        assert_eq!(doc["roles"], json!(["editor"]));
        assert_eq!(doc["users"], json!([4]));
        assert!(!doc.contains_key("api_key"));
        assert!(!doc.contains_key("enable_titles"));
    }

    #[test]
    fn test_migration_idempotent() {
        for feature in FeatureId::ALL {
            let (once, _) = migrate_document(feature, &legacy_chatgpt());
            let (twice, changed) = migrate_document(feature, &once);
            assert_eq!(once, twice, "{}", feature);
            assert!(!changed, "{}", feature);
        }
    }

    #[test]
    fn test_nested_document_untouched() {
        let nested = json!({
            "status": "enabled",
            "provider": "xai_grok",
            "xai_grok": { "api_key": "xai-1", "authenticated": true },
        })
        .as_object()
        .cloned()
        .unwrap();
        let (doc, changed) = migrate_document(FeatureId::TitleGeneration, &nested);
        assert!(!changed);
        assert_eq!(doc, nested);
    }

    #[test]
    fn test_migrate_watson_lifts_nested_objects() {
        let legacy = json!({
            "credentials": {
                "watson_url": "https://nlu.test",
                "watson_username": "apikey",
                "watson_password": "secret",
            },
            "features": { "category": true, "category_threshold": 80 },
            "enable_content_classification": 1,
        })
        .as_object()
        .cloned()
        .unwrap();
        let (doc, changed) = migrate_document(FeatureId::Classification, &legacy);

        assert!(changed);
        assert_eq!(doc["status"], "enabled");
        assert_eq!(doc["ibm_watson_nlu"]["endpoint_url"], "https://nlu.test");
        assert_eq!(doc["ibm_watson_nlu"]["category_threshold"], 80);
        assert!(!doc.contains_key("credentials"));
    }
}
