//! Azure OpenAI Provider
//!
//! Same wire format as OpenAI, but the URL is assembled from the resource
//! endpoint and deployment name, the key travels in an `api-key` header and
//! the model is fixed by the deployment.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::chat::{self, ChatBackend, ChatJob};
use super::{
    Endpoint, Provider, ProviderId, RouteCall, RouteResult, auth_outcome, incoming_doc, pick_str,
};
use crate::ai::request::{Credentials, RequestOptions};
use crate::context::AppContext;
use crate::feature::{FeatureId, FeatureSettings};
use crate::types::{QuillError, Result, SettingsError};

const ID: ProviderId = ProviderId::AzureOpenai;
const DEFAULT_API_VERSION: &str = "2024-06-01";

#[derive(Debug, Default, Clone, Copy)]
pub struct AzureOpenAiProvider;

/// Resource settings needed to reach a deployment
#[derive(Debug, Clone, PartialEq)]
struct Deployment {
    endpoint_url: String,
    api_key: String,
    deployment: String,
    api_version: String,
}

impl Deployment {
    fn from_settings(settings: &FeatureSettings, fallback_url: &str) -> Self {
        let endpoint_url = match settings.provider_str(ID, "endpoint_url") {
            "" => fallback_url.to_string(),
            url => url.to_string(),
        };
        let api_version = match settings.provider_str(ID, "api_version") {
            "" => DEFAULT_API_VERSION.to_string(),
            v => v.to_string(),
        };
        Self {
            endpoint_url,
            api_key: settings.provider_str(ID, "api_key").to_string(),
            deployment: settings.provider_str(ID, "deployment").to_string(),
            api_version,
        }
    }

    fn is_complete(&self) -> bool {
        !self.endpoint_url.is_empty() && !self.api_key.is_empty() && !self.deployment.is_empty()
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint_url.trim_end_matches('/'),
            self.deployment
        )
    }

    fn options(&self, body: Value) -> RequestOptions {
        RequestOptions::json(body).query("api-version", &self.api_version)
    }

    fn credentials(&self) -> Credentials {
        Credentials::header("api-key", &self.api_key)
    }
}

impl AzureOpenAiProvider {
    /// Verify with a one-token completion against the deployment
    async fn authenticate(&self, ctx: &AppContext, feature: FeatureId, deployment: &Deployment) -> Result<()> {
        if !deployment.is_complete() {
            return Err(QuillError::AuthRequired(
                "Please enter your credentials.".to_string(),
            ));
        }
        let body = json!({
            "messages": [{ "role": "user", "content": "Hi" }],
            "max_tokens": 1,
        });
        ctx.request(deployment.credentials(), feature)
            .post(&deployment.completions_url(), deployment.options(body))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ChatBackend for AzureOpenAiProvider {
    fn provider_id(&self) -> ProviderId {
        ID
    }

    fn build_body(&self, _endpoint: &Endpoint, job: &ChatJob) -> Value {
        chat::openai_body(None, job)
    }

    async fn send(
        &self,
        ctx: &AppContext,
        settings: &FeatureSettings,
        endpoint: &Endpoint,
        _job: &ChatJob,
        body: Value,
    ) -> Result<Value> {
        let deployment = Deployment::from_settings(settings, &endpoint.url);
        ctx.request(deployment.credentials(), settings.feature())
            .post(&deployment.completions_url(), deployment.options(body))
            .await
    }

    fn extract_choices(&self, response: &Value) -> Vec<String> {
        chat::openai_choices(response)
    }
}

#[async_trait]
impl Provider for AzureOpenAiProvider {
    fn id(&self) -> ProviderId {
        ID
    }

    fn default_settings(&self, feature: FeatureId) -> Map<String, Value> {
        chat::text_provider_defaults(
            feature,
            &[
                ("endpoint_url", json!("")),
                ("api_key", json!("")),
                ("deployment", json!("")),
                ("api_version", json!(DEFAULT_API_VERSION)),
            ],
        )
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
        let mut api_version = pick_str(&doc, current, ID, "api_version");
        if api_version.is_empty() {
            api_version = DEFAULT_API_VERSION.to_string();
        }
        let deployment = Deployment {
            endpoint_url: pick_str(&doc, current, ID, "endpoint_url"),
            api_key: pick_str(&doc, current, ID, "api_key"),
            deployment: pick_str(&doc, current, ID, "deployment"),
            api_version,
        };
        let outcome = self.authenticate(ctx, feature, &deployment).await;

        let mut out = Map::new();
        out.insert("authenticated".to_string(), json!(auth_outcome(ID, outcome, errors)));
        out.insert("endpoint_url".to_string(), json!(deployment.endpoint_url));
        out.insert("api_key".to_string(), json!(deployment.api_key));
        out.insert("deployment".to_string(), json!(deployment.deployment));
        out.insert("api_version".to_string(), json!(deployment.api_version));
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
        let deployment = settings.provider_str(ID, "deployment").to_string();
        chat::text_debug_information(ctx, ID, feature, settings, &deployment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url() {
        let deployment = Deployment {
            endpoint_url: "https://example.openai.azure.com/".into(),
            api_key: "k".into(),
            deployment: "gpt4o".into(),
            api_version: DEFAULT_API_VERSION.into(),
        };
        assert!(deployment.is_complete());
        assert_eq!(
            deployment.completions_url(),
            "https://example.openai.azure.com/openai/deployments/gpt4o/chat/completions"
        );
    }

    #[test]
    fn test_incomplete_deployment() {
        let deployment = Deployment {
            endpoint_url: String::new(),
            api_key: "k".into(),
            deployment: "d".into(),
            api_version: DEFAULT_API_VERSION.into(),
        };
        assert!(!deployment.is_complete());
    }

    #[test]
    fn test_defaults_include_deployment_fields() {
        let defaults = AzureOpenAiProvider.default_settings(FeatureId::ContentResizing);
        assert_eq!(defaults["api_version"], DEFAULT_API_VERSION);
        assert_eq!(defaults["number_of_suggestions"], 1);
        assert!(defaults.contains_key("deployment"));
    }
}
