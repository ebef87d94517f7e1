//! OpenAI Embeddings Provider
//!
//! Term cleanup: embeds every term of a taxonomy in one batched request and
//! reports pairs whose cosine similarity reaches the configured threshold.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::chat;
use super::{
    Provider, ProviderId, Route, RouteCall, RouteResult, SimilarTerm, Target, auth_outcome,
    incoming_doc, pick_str,
};
use crate::ai::diagnostics;
use crate::ai::hooks::{HookContext, HookStage};
use crate::ai::request::{Credentials, RequestOptions};
use crate::constants::term_cleanup::DEFAULT_THRESHOLD;
use crate::context::AppContext;
use crate::feature::{FeatureId, FeatureSettings, truthy};
use crate::types::{QuillError, Result, SettingsError, Term};

const ID: ProviderId = ProviderId::OpenaiEmbeddings;

#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddingsProvider;

impl EmbeddingsProvider {
    async fn authenticate(&self, ctx: &AppContext, feature: FeatureId, api_key: &str) -> Result<()> {
        if api_key.is_empty() {
            return Err(chat::missing_key(ID.service_name()));
        }
        let endpoint = ctx.endpoint(ID);
        let url = endpoint.auth_url.as_deref().unwrap_or(&endpoint.url);
        chat::verify_by_get(ctx, feature, Credentials::bearer(api_key), url).await
    }
}

/// Cosine similarity; zero vectors are dissimilar to everything
pub(crate) fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Embedding vectors ordered by their `index` field
fn extract_embeddings(response: &Value) -> Vec<Vec<f64>> {
    let Some(data) = response.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut indexed: Vec<(u64, Vec<f64>)> = data
        .iter()
        .enumerate()
        .filter_map(|(pos, d)| {
            let index = d.get("index").and_then(Value::as_u64).unwrap_or(pos as u64);
            let vector = d
                .get("embedding")
                .and_then(Value::as_array)?
                .iter()
                .filter_map(Value::as_f64)
                .collect();
            Some((index, vector))
        })
        .collect();
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, v)| v).collect()
}

/// Pairs at or above `threshold` percent, most similar first
fn similar_pairs(terms: &[Term], embeddings: &[Vec<f64>], threshold: f64) -> Vec<SimilarTerm> {
    let mut pairs = Vec::new();
    for i in 0..terms.len() {
        for j in (i + 1)..terms.len() {
            let score = cosine_similarity(&embeddings[i], &embeddings[j]) * 100.0;
            if score >= threshold {
                pairs.push(SimilarTerm {
                    term_id: terms[i].id,
                    name: terms[i].name.clone(),
                    similar_term_id: terms[j].id,
                    similar_name: terms[j].name.clone(),
                    score: (score * 100.0).round() / 100.0,
                });
            }
        }
    }
    pairs.sort_by(|a, b| b.score.total_cmp(&a.score));
    pairs
}

#[async_trait]
impl Provider for EmbeddingsProvider {
    fn id(&self) -> ProviderId {
        ID
    }

    fn default_settings(&self, _feature: FeatureId) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert("api_key".to_string(), json!(""));
        doc.insert("authenticated".to_string(), json!(false));
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
        let api_key = pick_str(&doc, current, ID, "api_key");
        let outcome = self.authenticate(ctx, feature, &api_key).await;

        let mut out = Map::new();
        out.insert("authenticated".to_string(), json!(auth_outcome(ID, outcome, errors)));
        out.insert("api_key".to_string(), json!(api_key));
        out
    }

    async fn rest_endpoint_callback(
        &self,
        ctx: &AppContext,
        call: &RouteCall<'_>,
    ) -> Result<RouteResult> {
        if call.route != Route::TermCleanup {
            return Ok(RouteResult::Empty);
        }

        let Target::Taxonomy(taxonomy) = &call.target else {
            return Err(QuillError::InvalidParam(
                "A taxonomy is required for term cleanup.".to_string(),
            ));
        };

        let settings = chat::ensure_active(ctx, call, Some(ID.service_name()))?;
        let enabled = settings
            .get("taxonomies")
            .and_then(|t| t.get(taxonomy))
            .is_some_and(truthy);
        if !enabled {
            return Err(QuillError::not_enabled(format!(
                "Term cleanup is not enabled for the {} taxonomy.",
                taxonomy
            )));
        }

        let terms = ctx.taxonomies.terms(taxonomy)?;
        if terms.len() < 2 {
            debug!(taxonomy = %taxonomy, count = terms.len(), "Not enough terms to compare");
            return Ok(RouteResult::SimilarTerms(Vec::new()));
        }

        let endpoint = ctx.endpoint(ID);
        let counter = endpoint.counter();
        let input: Vec<String> = terms
            .iter()
            .map(|t| counter.trim_content(&t.name, endpoint.max_tokens as i64))
            .collect();

        let hook_ctx = HookContext {
            feature: call.feature,
            provider: ID,
            route: &call.route,
            item_id: None,
        };
        let body = ctx.hooks.apply(
            HookStage::BodyBuilt,
            &hook_ctx,
            json!({ "model": endpoint.model(), "input": input }),
        );

        info!(taxonomy = %taxonomy, terms = terms.len(), "Dispatching embeddings request");
        let response = ctx
            .request(
                Credentials::bearer(settings.provider_str(ID, "api_key")),
                call.feature,
            )
            .post(&endpoint.url, RequestOptions::json(body))
            .await;
        diagnostics::record(ctx.transients.as_ref(), ID, &call.route, response.as_ref());

        let response = ctx
            .hooks
            .apply(HookStage::ResponseReceived, &hook_ctx, response?);
        let embeddings = extract_embeddings(&response);
        if embeddings.len() != terms.len() {
            return Err(QuillError::InvalidResponseFormat {
                reason: format!(
                    "expected {} embeddings, received {}",
                    terms.len(),
                    embeddings.len()
                ),
                body: response.to_string(),
            });
        }

        let threshold = settings.u64("threshold").unwrap_or(DEFAULT_THRESHOLD) as f64;
        Ok(RouteResult::SimilarTerms(similar_pairs(
            &terms,
            &embeddings,
            threshold,
        )))
    }

    fn debug_information(
        &self,
        ctx: &AppContext,
        _feature: FeatureId,
        settings: &FeatureSettings,
    ) -> Vec<(String, String)> {
        let authenticated = if settings.is_authenticated(ID) { "yes" } else { "no" };
        let taxonomies = settings
            .get("taxonomies")
            .and_then(Value::as_object)
            .map(|t| {
                t.iter()
                    .filter(|(_, enabled)| truthy(enabled))
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();

        vec![
            ("Authenticated".to_string(), authenticated.to_string()),
            ("Model".to_string(), ctx.endpoint(ID).model().to_string()),
            ("Taxonomies".to_string(), taxonomies),
            (
                "Threshold".to_string(),
                settings
                    .u64("threshold")
                    .unwrap_or(DEFAULT_THRESHOLD)
                    .to_string(),
            ),
            (
                "Latest response".to_string(),
                diagnostics::formatted_latest(ctx.transients.as_ref(), ID, &Route::TermCleanup),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(id: u64, name: &str) -> Term {
        Term {
            id,
            taxonomy: "category".into(),
            name: name.into(),
            parent: 0,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_extract_embeddings_orders_by_index() {
        let response = json!({"data": [
            {"index": 1, "embedding": [0.0, 1.0]},
            {"index": 0, "embedding": [1.0, 0.0]}
        ]});
        assert_eq!(
            extract_embeddings(&response),
            vec![vec![1.0, 0.0], vec![0.0, 1.0]]
        );
    }

    #[test]
    fn test_similar_pairs_threshold_and_order() {
        let terms = vec![term(1, "Rust"), term(2, "Rustlang"), term(3, "Gardening")];
        let embeddings = vec![vec![1.0, 0.1], vec![1.0, 0.0], vec![0.0, 1.0]];
        let pairs = similar_pairs(&terms, &embeddings, 75.0);

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].term_id, 1);
        assert_eq!(pairs[0].similar_term_id, 2);
        assert!(pairs[0].score > 99.0);
    }
}
