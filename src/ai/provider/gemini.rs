//! Google AI (Gemini API) Provider
//!
//! `models/{model}:generateContent` with the key in `x-goog-api-key`.
//! Multiple suggestions are requested through `candidateCount`.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::chat::{self, ChatBackend, ChatJob, UserContent};
use super::{
    Endpoint, Provider, ProviderId, RouteCall, RouteResult, auth_outcome, incoming_doc, pick_str,
};
use crate::ai::request::{Credentials, RequestOptions};
use crate::context::AppContext;
use crate::feature::{FeatureId, FeatureSettings};
use crate::types::{Result, SettingsError};

const ID: ProviderId = ProviderId::GoogleaiGeminiApi;
const KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Default, Clone, Copy)]
pub struct GeminiProvider;

impl GeminiProvider {
    async fn authenticate(&self, ctx: &AppContext, feature: FeatureId, api_key: &str) -> Result<()> {
        if api_key.is_empty() {
            return Err(chat::missing_key(ID.service_name()));
        }
        let endpoint = ctx.endpoint(ID);
        let url = endpoint.auth_url.as_deref().unwrap_or(&endpoint.url);
        chat::verify_by_get(ctx, feature, Credentials::header(KEY_HEADER, api_key), url).await
    }

    fn generate_url(endpoint: &Endpoint) -> String {
        format!(
            "{}/{}:generateContent",
            endpoint.url.trim_end_matches('/'),
            endpoint.model()
        )
    }
}

#[async_trait]
impl ChatBackend for GeminiProvider {
    fn provider_id(&self) -> ProviderId {
        ID
    }

    fn build_body(&self, _endpoint: &Endpoint, job: &ChatJob) -> Value {
        let part = match &job.user {
            UserContent::Text(_) => json!({ "text": job.quoted_text() }),
            UserContent::ImageUrl(url) => json!({
                "file_data": { "mime_type": "image/jpeg", "file_uri": url }
            }),
        };

        let mut generation = json!({
            "temperature": job.temperature,
            "candidateCount": job.n,
        });
        if let Some(max_tokens) = job.max_tokens {
            generation["maxOutputTokens"] = json!(max_tokens);
        }

        json!({
            "system_instruction": { "parts": [{ "text": job.system }] },
            "contents": [{ "role": "user", "parts": [part] }],
            "generationConfig": generation,
        })
    }

    async fn send(
        &self,
        ctx: &AppContext,
        settings: &FeatureSettings,
        endpoint: &Endpoint,
        _job: &ChatJob,
        body: Value,
    ) -> Result<Value> {
        let credentials = Credentials::header(KEY_HEADER, settings.provider_str(ID, "api_key"));
        ctx.request(credentials, settings.feature())
            .post(&Self::generate_url(endpoint), RequestOptions::json(body))
            .await
    }

    fn extract_choices(&self, response: &Value) -> Vec<String> {
        response
            .get("candidates")
            .and_then(Value::as_array)
            .map(|candidates| {
                candidates
                    .iter()
                    .filter_map(|c| c.pointer("/content/parts/0/text").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn id(&self) -> ProviderId {
        ID
    }

    fn default_settings(&self, feature: FeatureId) -> Map<String, Value> {
        chat::text_provider_defaults(feature, &[("api_key", json!(""))])
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
        chat::apply_suggestion_count(&mut out, feature, &doc, current, ID);
        out
    }

    async fn rest_endpoint_callback(
        &self,
        ctx: &AppContext,
        call: &RouteCall<'_>,
    ) -> Result<RouteResult> {
        chat::run_route(self, ctx, call).await
    }

    fn debug_information(
        &self,
        ctx: &AppContext,
        feature: FeatureId,
        settings: &FeatureSettings,
    ) -> Vec<(String, String)> {
        let endpoint = ctx.endpoint(ID);
        chat::text_debug_information(ctx, ID, feature, settings, endpoint.model())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ChatJob {
        ChatJob {
            system: "Write a title.".into(),
            user: UserContent::Text("Body".into()),
            n: 2,
            temperature: 0.9,
            max_tokens: None,
            multiple: true,
        }
    }

    #[test]
    fn test_generate_url() {
        assert_eq!(
            GeminiProvider::generate_url(&Endpoint::builtin(ID)),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_body_shape() {
        let body = GeminiProvider.build_body(&Endpoint::builtin(ID), &job());
        assert_eq!(body["generationConfig"]["candidateCount"], 2);
        assert_eq!(body["system_instruction"]["parts"][0]["text"], "Write a title.");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "\"\"\"Body\"\"\"");
    }

    #[test]
    fn test_extract_candidates() {
        let response = json!({"candidates": [
            {"content": {"parts": [{"text": "One"}]}},
            {"content": {"parts": []}},
            {"content": {"parts": [{"text": "Two"}]}}
        ]});
        assert_eq!(GeminiProvider.extract_choices(&response), vec!["One", "Two"]);
    }
}
