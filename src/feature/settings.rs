//! Feature Settings Documents
//!
//! One JSON document per feature: feature-level keys plus one nested
//! sub-document per supported provider. Absent keys are filled from defaults
//! at read time and never written eagerly.

use serde_json::{Map, Value, json};

use super::catalog::FeatureId;
use crate::ai::provider::{ProviderId, create_provider};
use crate::types::ContentItem;

// =============================================================================
// Value Coercion
// =============================================================================

/// Loose truthiness for flags stored by older clients.
///
/// `true`, non-zero numbers and `"1"`, `"yes"`, `"on"`, `"true"`,
/// `"enabled"` are truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "yes" | "on" | "true" | "enabled"
        ),
        _ => false,
    }
}

/// Non-negative integer from a number or numeric string
pub fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// =============================================================================
// Defaults and Merge
// =============================================================================

/// Full default document for a feature.
///
/// `default_roles` seeds the `roles` list.
pub fn default_document(feature: FeatureId, default_roles: &[String]) -> Map<String, Value> {
    let supported = feature.supported_providers();

    let mut doc = Map::new();
    doc.insert("status".into(), json!("disabled"));
    doc.insert("provider".into(), json!(supported[0].as_str()));
    doc.insert("role_based_access".into(), json!(true));
    doc.insert("roles".into(), json!(default_roles));
    doc.insert("users".into(), json!([]));
    doc.insert("user_based_opt_out".into(), json!(false));
    doc.extend(feature.specific_defaults());

    for id in supported {
        let provider = create_provider(*id);
        doc.insert(
            id.as_str().to_string(),
            Value::Object(provider.default_settings(feature)),
        );
    }
    doc
}

/// Layer a persisted document over defaults.
///
/// Top-level persisted keys replace defaults. Provider sub-documents merge
/// one level deeper; every other nested object is replaced wholesale.
pub fn merge_settings(defaults: &Map<String, Value>, persisted: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = defaults.clone();
    for (key, value) in persisted {
        let is_provider_doc = key.parse::<ProviderId>().is_ok();
        match (merged.get_mut(key), value) {
            (Some(Value::Object(base)), Value::Object(over)) if is_provider_doc => {
                for (k, v) in over {
                    base.insert(k.clone(), v.clone());
                }
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

// =============================================================================
// Merged Settings View
// =============================================================================

/// Read-only view over a merged feature document
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSettings {
    feature: FeatureId,
    doc: Map<String, Value>,
}

impl FeatureSettings {
    pub fn new(feature: FeatureId, doc: Map<String, Value>) -> Self {
        Self { feature, doc }
    }

    pub fn feature(&self) -> FeatureId {
        self.feature
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.doc.get(key)
    }

    pub fn str(&self, key: &str) -> &str {
        self.doc.get(key).and_then(Value::as_str).unwrap_or("")
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        self.doc.get(key).and_then(as_u64)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.doc.get(key).is_some_and(truthy)
    }

    pub fn string_list(&self, key: &str) -> Vec<String> {
        self.doc
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `status` is `enabled`; legacy truthy values are accepted
    pub fn is_enabled(&self) -> bool {
        self.flag("status")
    }

    /// Active provider; an unknown or unsupported value falls back to the
    /// first supported provider
    pub fn provider(&self) -> ProviderId {
        self.str("provider")
            .parse::<ProviderId>()
            .ok()
            .filter(|id| self.feature.supports(*id))
            .unwrap_or(self.feature.supported_providers()[0])
    }

    pub fn provider_doc(&self, id: ProviderId) -> Option<&Map<String, Value>> {
        self.doc.get(id.as_str()).and_then(Value::as_object)
    }

    pub fn provider_value(&self, id: ProviderId, key: &str) -> Option<&Value> {
        self.provider_doc(id).and_then(|doc| doc.get(key))
    }

    pub fn provider_str(&self, id: ProviderId, key: &str) -> &str {
        self.provider_value(id, key)
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn provider_u64(&self, id: ProviderId, key: &str) -> Option<u64> {
        self.provider_value(id, key).and_then(as_u64)
    }

    pub fn provider_flag(&self, id: ProviderId, key: &str) -> bool {
        self.provider_value(id, key).is_some_and(truthy)
    }

    pub fn is_authenticated(&self, id: ProviderId) -> bool {
        self.provider_flag(id, "authenticated")
    }

    /// Post type and status eligibility; features without the lists accept
    /// every item
    pub fn allows_content(&self, item: &ContentItem) -> bool {
        let listed = |key: &str, value: &str| {
            self.doc.get(key).and_then(Value::as_array).is_none_or(|list| {
                list.iter().filter_map(Value::as_str).any(|v| v == value)
            })
        };
        listed("post_types", &item.post_type) && listed("post_statuses", &item.status)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.doc
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles() -> Vec<String> {
        vec!["administrator".to_string(), "editor".to_string()]
    }

    #[test]
    fn test_truthy() {
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!("1")));
        assert!(truthy(&json!("enabled")));
        assert!(!truthy(&json!("no")));
        assert!(!truthy(&json!("disabled")));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&Value::Null));
    }

    #[test]
    fn test_as_u64() {
        assert_eq!(as_u64(&json!(3)), Some(3));
        assert_eq!(as_u64(&json!("7")), Some(7));
        assert_eq!(as_u64(&json!(-1)), None);
        assert_eq!(as_u64(&json!("x")), None);
    }

    #[test]
    fn test_default_document_shape() {
        let doc = default_document(FeatureId::TitleGeneration, &roles());
        assert_eq!(doc["status"], "disabled");
        assert_eq!(doc["provider"], "openai_chatgpt");
        assert_eq!(doc["roles"], json!(["administrator", "editor"]));
        assert_eq!(doc["xai_grok"]["authenticated"], false);
        assert_eq!(doc["chrome_ai"]["authenticated"], true);
        assert!(doc.contains_key("generate_title_prompt"));
    }

    #[test]
    fn test_merge_provider_docs_one_level() {
        let defaults = default_document(FeatureId::TitleGeneration, &roles());
        let persisted = json!({
            "status": "enabled",
            "xai_grok": { "api_key": "xai-123" },
        });
        let merged = merge_settings(&defaults, persisted.as_object().unwrap());

        assert_eq!(merged["status"], "enabled");
        assert_eq!(merged["xai_grok"]["api_key"], "xai-123");
        assert_eq!(merged["xai_grok"]["number_of_suggestions"], 1);
        assert_eq!(merged["provider"], "openai_chatgpt");
    }

    #[test]
    fn test_merge_replaces_other_objects_wholesale() {
        let defaults = default_document(FeatureId::TermCleanup, &roles());
        let persisted = json!({ "taxonomies": { "genre": true } });
        let merged = merge_settings(&defaults, persisted.as_object().unwrap());
        assert_eq!(merged["taxonomies"], json!({ "genre": true }));
    }

    #[test]
    fn test_provider_fallback() {
        let mut doc = default_document(FeatureId::DescriptiveTextGenerator, &roles());
        doc.insert("provider".into(), json!("chrome_ai"));
        let settings = FeatureSettings::new(FeatureId::DescriptiveTextGenerator, doc);
        assert_eq!(settings.provider(), ProviderId::OpenaiChatgpt);
    }

    #[test]
    fn test_allows_content() {
        let doc = default_document(FeatureId::Classification, &roles());
        let settings = FeatureSettings::new(FeatureId::Classification, doc);
        assert!(settings.allows_content(&ContentItem::new(1, "T", "C")));
        assert!(!settings.allows_content(&ContentItem::new(1, "T", "C").with_status("draft")));
        assert!(!settings.allows_content(&ContentItem::new(1, "T", "C").with_post_type("page")));

        let title = FeatureSettings::new(
            FeatureId::TitleGeneration,
            default_document(FeatureId::TitleGeneration, &roles()),
        );
        assert!(title.allows_content(&ContentItem::new(1, "T", "C").with_status("draft")));
    }
}
