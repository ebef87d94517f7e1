//! OpenAI ChatGPT Provider
//!
//! Chat Completions API for titles, excerpts, resizing and (with the vision
//! model) descriptive text.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::chat::{self, ChatBackend, ChatJob};
use super::{
    Endpoint, Provider, ProviderId, RouteCall, RouteResult, auth_outcome, incoming_doc, pick_str,
};
use crate::ai::request::{Credentials, RequestOptions};
use crate::context::AppContext;
use crate::feature::{FeatureId, FeatureSettings};
use crate::types::{Result, SettingsError};

const ID: ProviderId = ProviderId::OpenaiChatgpt;

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAiProvider;

impl OpenAiProvider {
    async fn authenticate(&self, ctx: &AppContext, feature: FeatureId, api_key: &str) -> Result<()> {
        if api_key.is_empty() {
            return Err(chat::missing_key(ID.service_name()));
        }
        let endpoint = ctx.endpoint(ID);
        let url = endpoint.auth_url.as_deref().unwrap_or(&endpoint.url);
        chat::verify_by_get(ctx, feature, Credentials::bearer(api_key), url).await
    }
}

#[async_trait]
impl ChatBackend for OpenAiProvider {
    fn provider_id(&self) -> ProviderId {
        ID
    }

    fn build_body(&self, endpoint: &Endpoint, job: &ChatJob) -> Value {
        let model = if job.is_vision() {
            endpoint.vision_model()
        } else {
            endpoint.model()
        };
        chat::openai_body(Some(model), job)
    }

    async fn send(
        &self,
        ctx: &AppContext,
        settings: &FeatureSettings,
        endpoint: &Endpoint,
        _job: &ChatJob,
        body: Value,
    ) -> Result<Value> {
        let credentials = Credentials::bearer(settings.provider_str(ID, "api_key"));
        ctx.request(credentials, settings.feature())
            .post(&endpoint.url, RequestOptions::json(body))
            .await
    }

    fn extract_choices(&self, response: &Value) -> Vec<String> {
        chat::openai_choices(response)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
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
        let model = if feature == FeatureId::DescriptiveTextGenerator {
            endpoint.vision_model()
        } else {
            endpoint.model()
        };
        chat::text_debug_information(ctx, ID, feature, settings, model)
    }
}
