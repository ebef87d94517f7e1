//! IBM Watson Natural Language Understanding Provider
//!
//! Classifies a content item into up to four term kinds (categories,
//! keywords, concepts, entities). Each kind has its own enable flag,
//! relevance threshold and target taxonomy. Prior relationships of enabled
//! taxonomies are removed before new terms are linked.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::{Provider, ProviderId, Route, RouteCall, RouteResult, Target, auth_outcome, incoming_doc, pick_str};
use crate::ai::diagnostics;
use crate::ai::request::{Credentials, RequestOptions};
use crate::constants::settings::CLASSIFICATION_ERROR_META;
use crate::constants::watson::{
    API_VERSION, CATEGORY_TAXONOMY, CONCEPT_TAXONOMY, DEFAULT_THRESHOLD, ENTITY_TAXONOMY, MAX_CHARS,
    KEYWORD_TAXONOMY,
};
use crate::context::AppContext;
use crate::feature::{FeatureId, FeatureSettings, FeatureState, as_u64, truthy};
use crate::types::{ContentItem, QuillError, Result, SettingsError};

const ID: ProviderId = ProviderId::IbmWatsonNlu;
const NOT_ENABLED: &str = "Language Processing not enabled for current post.";

/// One classification output kind
#[derive(Debug, Clone, Copy)]
struct NluKind {
    /// Settings key prefix
    key: &'static str,
    /// Response array and request feature name
    api_field: &'static str,
    /// Per-result score field
    score_field: &'static str,
    default_enabled: bool,
    default_taxonomy: &'static str,
}

const KINDS: [NluKind; 4] = [
    NluKind {
        key: "category",
        api_field: "categories",
        score_field: "score",
        default_enabled: true,
        default_taxonomy: CATEGORY_TAXONOMY,
    },
    NluKind {
        key: "keyword",
        api_field: "keywords",
        score_field: "relevance",
        default_enabled: true,
        default_taxonomy: KEYWORD_TAXONOMY,
    },
    NluKind {
        key: "concept",
        api_field: "concepts",
        score_field: "relevance",
        default_enabled: false,
        default_taxonomy: CONCEPT_TAXONOMY,
    },
    NluKind {
        key: "entity",
        api_field: "entities",
        score_field: "relevance",
        default_enabled: false,
        default_taxonomy: ENTITY_TAXONOMY,
    },
];

impl NluKind {
    fn threshold_key(&self) -> String {
        format!("{}_threshold", self.key)
    }

    fn taxonomy_key(&self) -> String {
        format!("{}_taxonomy", self.key)
    }

    fn is_enabled(&self, settings: &FeatureSettings) -> bool {
        settings
            .provider_value(ID, self.key)
            .map(truthy)
            .unwrap_or(self.default_enabled)
    }

    fn threshold(&self, settings: &FeatureSettings) -> f64 {
        settings
            .provider_u64(ID, &self.threshold_key())
            .unwrap_or(DEFAULT_THRESHOLD) as f64
    }

    fn taxonomy(&self, settings: &FeatureSettings) -> String {
        match settings.provider_str(ID, &self.taxonomy_key()) {
            "" => self.default_taxonomy.to_string(),
            taxonomy => taxonomy.to_string(),
        }
    }

    /// Term names at or above the threshold
    fn accepted_names(&self, response: &Value, threshold: f64) -> Vec<String> {
        let Some(results) = response.get(self.api_field).and_then(Value::as_array) else {
            return Vec::new();
        };

        results
            .iter()
            .filter(|r| {
                r.get(self.score_field)
                    .and_then(Value::as_f64)
                    .is_some_and(|score| score * 100.0 >= threshold)
            })
            .filter_map(|r| {
                if self.api_field == "categories" {
                    // "/technology and computing/software" links the leaf label
                    r.get("label")
                        .and_then(Value::as_str)
                        .and_then(|label| label.split('/').rfind(|s| !s.trim().is_empty()))
                        .map(|s| s.trim().to_string())
                } else {
                    r.get("text").and_then(Value::as_str).map(str::to_string)
                }
            })
            .collect()
    }
}

/// Resolved credentials; an API key uses the fixed `apikey` username
#[derive(Debug, Clone, PartialEq)]
struct NluCredentials {
    endpoint_url: String,
    username: String,
    password: String,
}

impl NluCredentials {
    fn new(endpoint_url: String, apikey: &str, username: String, password: String) -> Self {
        if apikey.is_empty() {
            Self {
                endpoint_url,
                username,
                password,
            }
        } else {
            Self {
                endpoint_url,
                username: "apikey".to_string(),
                password: apikey.to_string(),
            }
        }
    }

    fn from_settings(settings: &FeatureSettings, fallback_url: &str) -> Self {
        let endpoint_url = match settings.provider_str(ID, "endpoint_url") {
            "" => fallback_url.to_string(),
            url => url.to_string(),
        };
        Self::new(
            endpoint_url,
            settings.provider_str(ID, "apikey"),
            settings.provider_str(ID, "username").to_string(),
            settings.provider_str(ID, "password").to_string(),
        )
    }

    fn is_complete(&self) -> bool {
        !self.endpoint_url.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }

    fn analyze_url(&self) -> String {
        format!("{}/v1/analyze", self.endpoint_url.trim_end_matches('/'))
    }

    fn credentials(&self) -> Credentials {
        Credentials::basic(&self.username, &self.password)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WatsonNluProvider;

impl WatsonNluProvider {
    async fn authenticate(&self, ctx: &AppContext, feature: FeatureId, creds: &NluCredentials) -> Result<()> {
        if !creds.is_complete() {
            return Err(QuillError::AuthRequired(
                "Please enter your credentials.".to_string(),
            ));
        }

        let body = json!({
            "text": "Lorem ipsum dolor sit amet.",
            "language": "en",
            "features": { "keywords": { "emotion": false, "limit": 1 } },
        });
        ctx.request(creds.credentials(), feature)
            .post(
                &creds.analyze_url(),
                RequestOptions::json(body).query("version", API_VERSION),
            )
            .await
            .map(|_| ())
    }

    fn ensure_eligible(&self, ctx: &AppContext, call: &RouteCall<'_>, item: &ContentItem) -> Result<FeatureSettings> {
        let feature = ctx.feature(call.feature);
        let settings = feature.get_settings()?;
        if feature.state_for(&settings, call.actor) != FeatureState::Active
            || !settings.allows_content(item)
        {
            return Err(QuillError::not_enabled(NOT_ENABLED));
        }
        Ok(settings)
    }

    /// Analyze an item and link accepted terms
    async fn classify(
        &self,
        ctx: &AppContext,
        call: &RouteCall<'_>,
        settings: &FeatureSettings,
        item: &ContentItem,
    ) -> Result<()> {
        let enabled: Vec<&NluKind> = KINDS.iter().filter(|k| k.is_enabled(settings)).collect();
        if enabled.is_empty() {
            debug!(item = item.id, "No classification kinds enabled");
            return Ok(());
        }

        for kind in &enabled {
            ctx.taxonomies
                .delete_object_terms(item.id, &kind.taxonomy(settings))?;
        }

        let endpoint = ctx.endpoint(ID);
        let creds = NluCredentials::from_settings(settings, &endpoint.url);
        let text = ctx.normalizer.normalize(&item.title, &ctx.normalizer.render(&item.content));
        let text: String = text.chars().take(MAX_CHARS).collect();

        let mut features = Map::new();
        for kind in &enabled {
            let options = match kind.api_field {
                "keywords" | "entities" => json!({ "emotion": false, "limit": 20 }),
                "categories" => json!({ "limit": 3 }),
                _ => json!({ "limit": 10 }),
            };
            features.insert(kind.api_field.to_string(), options);
        }
        let body = json!({ "text": text, "language": "en", "features": features });

        let response = ctx
            .request(creds.credentials(), call.feature)
            .post(
                &creds.analyze_url(),
                RequestOptions::json(body).query("version", API_VERSION),
            )
            .await;
        diagnostics::record(ctx.transients.as_ref(), ID, &call.route, response.as_ref());
        let response = response?;

        for kind in &enabled {
            let taxonomy = kind.taxonomy(settings);
            let names = kind.accepted_names(&response, kind.threshold(settings));
            let mut term_ids = Vec::with_capacity(names.len());
            for name in &names {
                term_ids.push(ctx.taxonomies.ensure_term(&taxonomy, name)?);
            }
            if !term_ids.is_empty() {
                ctx.taxonomies
                    .set_object_terms(item.id, &taxonomy, &term_ids, true)?;
            }
            debug!(item = item.id, taxonomy = %taxonomy, linked = term_ids.len(), "Linked terms");
        }

        Ok(())
    }
}

#[async_trait]
impl Provider for WatsonNluProvider {
    fn id(&self) -> ProviderId {
        ID
    }

    fn default_settings(&self, _feature: FeatureId) -> Map<String, Value> {
        let mut doc = Map::new();
        for key in ["endpoint_url", "apikey", "username", "password"] {
            doc.insert(key.to_string(), json!(""));
        }
        doc.insert("authenticated".to_string(), json!(false));
        for kind in KINDS {
            doc.insert(kind.key.to_string(), json!(kind.default_enabled));
            doc.insert(kind.threshold_key(), json!(DEFAULT_THRESHOLD));
            doc.insert(kind.taxonomy_key(), json!(kind.default_taxonomy));
        }
        doc
    }

    async fn sanitize_settings(
        &self,
        ctx: &AppContext,
        feature: FeatureId,
        incoming: &Map<String, Value>,
        current: &FeatureSettings,
        errors: &mut Vec<SettingsError>,
    ) -> Map<String, Value> {
        let doc = incoming_doc(incoming, ID);
        let mut out = Map::new();
        for key in ["endpoint_url", "apikey", "username", "password"] {
            out.insert(key.to_string(), json!(pick_str(&doc, current, ID, key)));
        }

        let creds = NluCredentials::new(
            pick_str(&doc, current, ID, "endpoint_url"),
            &pick_str(&doc, current, ID, "apikey"),
            pick_str(&doc, current, ID, "username"),
            pick_str(&doc, current, ID, "password"),
        );
        let outcome = self.authenticate(ctx, feature, &creds).await;
        out.insert("authenticated".to_string(), json!(auth_outcome(ID, outcome, errors)));

        for kind in KINDS {
            let enabled = doc
                .get(kind.key)
                .map(truthy)
                .unwrap_or_else(|| kind.is_enabled(current));
            let threshold = doc
                .get(&kind.threshold_key())
                .and_then(as_u64)
                .unwrap_or_else(|| kind.threshold(current) as u64)
                .min(100);
            let taxonomy = match pick_str(&doc, current, ID, &kind.taxonomy_key()) {
                t if t.is_empty() => kind.default_taxonomy.to_string(),
                t => t,
            };
            out.insert(kind.key.to_string(), json!(enabled));
            out.insert(kind.threshold_key(), json!(threshold));
            out.insert(kind.taxonomy_key(), json!(taxonomy));
        }
        out
    }

    async fn rest_endpoint_callback(
        &self,
        ctx: &AppContext,
        call: &RouteCall<'_>,
    ) -> Result<RouteResult> {
        if call.route != Route::Classify {
            return Ok(RouteResult::Empty);
        }

        let missing = || QuillError::post_id_required("Post ID is required to classify post.");
        let Target::Item(id) = call.target else {
            return Err(missing());
        };
        let item = ctx.content.get_item(id)?.ok_or_else(missing)?;
        let settings = self.ensure_eligible(ctx, call, &item)?;

        info!(item = item.id, "Classifying content item");
        match self.classify(ctx, call, &settings, &item).await {
            Ok(()) => ctx
                .content
                .update_meta(item.id, CLASSIFICATION_ERROR_META, None)?,
            Err(err) => {
                let meta = json!({ "code": err.code(), "message": err.to_string() });
                ctx.content
                    .update_meta(item.id, CLASSIFICATION_ERROR_META, Some(meta))?;
                return Err(err.into_request_failed());
            }
        }

        let mut terms = BTreeMap::new();
        for kind in KINDS {
            let taxonomy = kind.taxonomy(&settings);
            let linked = ctx.taxonomies.object_terms(item.id, &taxonomy)?;
            if !linked.is_empty() {
                terms.insert(taxonomy, linked);
            }
        }
        Ok(RouteResult::Terms { terms })
    }

    fn debug_information(
        &self,
        ctx: &AppContext,
        _feature: FeatureId,
        settings: &FeatureSettings,
    ) -> Vec<(String, String)> {
        let yes_no = |b: bool| if b { "yes" } else { "no" }.to_string();
        let creds = NluCredentials::from_settings(settings, &ctx.endpoint(ID).url);

        let mut rows = vec![
            ("Configured".to_string(), yes_no(settings.is_authenticated(ID))),
            ("API URL".to_string(), creds.endpoint_url.clone()),
            ("API username".to_string(), creds.username.clone()),
        ];
        for kind in KINDS {
            rows.push((
                format!("{} (status)", capitalize(kind.key)),
                yes_no(kind.is_enabled(settings)),
            ));
            rows.push((
                format!("{} (threshold)", capitalize(kind.key)),
                kind.threshold(settings).to_string(),
            ));
            rows.push((
                format!("{} (taxonomy)", capitalize(kind.key)),
                kind.taxonomy(settings),
            ));
        }
        rows.push((
            "Latest response".to_string(),
            diagnostics::formatted_latest(ctx.transients.as_ref(), ID, &Route::Classify),
        ));
        rows
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_leaf_label() {
        let response = json!({"categories": [
            {"label": "/technology and computing/software", "score": 0.92},
            {"label": "/science", "score": 0.4}
        ]});
        assert_eq!(KINDS[0].accepted_names(&response, 70.0), vec!["software"]);
    }

    #[test]
    fn test_keyword_threshold() {
        let response = json!({"keywords": [
            {"text": "rust", "relevance": 0.7},
            {"text": "tokio", "relevance": 0.69}
        ]});
        assert_eq!(KINDS[1].accepted_names(&response, 70.0), vec!["rust"]);
        assert!(KINDS[2].accepted_names(&response, 70.0).is_empty());
    }

    #[test]
    fn test_apikey_credentials() {
        let creds = NluCredentials::new("https://nlu.test/".into(), "secret", String::new(), String::new());
        assert_eq!(creds.username, "apikey");
        assert!(creds.is_complete());
        assert_eq!(creds.analyze_url(), "https://nlu.test/v1/analyze");

        let incomplete = NluCredentials::new("https://nlu.test".into(), "", "user".into(), String::new());
        assert!(!incomplete.is_complete());
    }

    #[test]
    fn test_default_settings() {
        let defaults = WatsonNluProvider.default_settings(FeatureId::Classification);
        assert_eq!(defaults["category"], true);
        assert_eq!(defaults["concept"], false);
        assert_eq!(defaults["keyword_taxonomy"], "post_tag");
        assert_eq!(defaults["entity_threshold"], 70);
    }
}
