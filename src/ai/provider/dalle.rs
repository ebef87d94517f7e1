//! OpenAI DALL·E Provider
//!
//! Image generation from a free-text prompt. Results are returned as
//! `[{url}]`, where `url` holds either a hosted URL or base64 data depending
//! on the requested format.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::info;

use super::chat;
use super::{
    GeneratedImage, Provider, ProviderId, Route, RouteCall, RouteResult, Target, auth_outcome,
    clamp_suggestions, incoming_doc, pick_str,
};
use crate::ai::diagnostics;
use crate::ai::hooks::{HookContext, HookStage};
use crate::ai::request::{Credentials, RequestOptions};
use crate::constants::image;
use crate::context::AppContext;
use crate::feature::{FeatureId, FeatureSettings, as_u64};
use crate::types::{QuillError, Result, SettingsError, caps};

const ID: ProviderId = ProviderId::OpenaiDalle;

#[derive(Debug, Default, Clone, Copy)]
pub struct DallEProvider;

/// Value from `allowed`, else `fallback`
fn one_of(value: Option<&str>, allowed: &[&str], fallback: &str) -> String {
    value
        .filter(|v| allowed.contains(v))
        .unwrap_or(fallback)
        .to_string()
}

/// Request options after folding route arguments over settings
#[derive(Debug, Clone, PartialEq)]
struct ImageRequest {
    n: u32,
    size: String,
    quality: Option<String>,
    style: Option<String>,
    format: String,
}

impl ImageRequest {
    fn resolve(call: &RouteCall<'_>, settings: &FeatureSettings) -> Self {
        let args = &call.args;
        let n = clamp_suggestions(
            args.num
                .map(u64::from)
                .or_else(|| settings.provider_u64(ID, "number")),
        );
        let size = one_of(
            args.size
                .as_deref()
                .or(Some(settings.provider_str(ID, "size"))),
            image::SIZES,
            image::DEFAULT_SIZE,
        );
        let quality = args
            .quality
            .as_deref()
            .or(Some(settings.provider_str(ID, "quality")))
            .filter(|q| image::QUALITIES.contains(q))
            .map(str::to_string);
        let style = args
            .style
            .as_deref()
            .or(Some(settings.provider_str(ID, "style")))
            .filter(|s| image::STYLES.contains(s))
            .map(str::to_string);
        let format = one_of(args.format.as_deref(), image::FORMATS, "url");

        Self {
            n,
            size,
            quality,
            style,
            format,
        }
    }

    fn body(&self, model: &str, prompt: &str) -> Value {
        let mut body = json!({
            "prompt": prompt,
            "n": self.n,
            "size": self.size,
            "response_format": self.format,
        });
        if !model.is_empty() {
            body["model"] = json!(model);
        }
        if let Some(quality) = &self.quality {
            body["quality"] = json!(quality);
        }
        if let Some(style) = &self.style {
            body["style"] = json!(style);
        }
        body
    }

    fn extract(&self, response: &Value) -> Vec<GeneratedImage> {
        response
            .get("data")
            .and_then(Value::as_array)
            .map(|data| {
                data.iter()
                    .filter_map(|d| d.get(&self.format).and_then(Value::as_str))
                    .filter(|url| !url.is_empty())
                    .map(|url| GeneratedImage {
                        url: url.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl DallEProvider {
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
impl Provider for DallEProvider {
    fn id(&self) -> ProviderId {
        ID
    }

    fn default_settings(&self, _feature: FeatureId) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert("api_key".to_string(), json!(""));
        doc.insert("authenticated".to_string(), json!(false));
        doc.insert("number".to_string(), json!(1));
        doc.insert("size".to_string(), json!(image::DEFAULT_SIZE));
        doc.insert("quality".to_string(), json!("standard"));
        doc.insert("style".to_string(), json!("vivid"));
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

        let number = doc
            .get("number")
            .and_then(as_u64)
            .or_else(|| current.provider_u64(ID, "number"))
            .filter(|n| (1..=10).contains(n))
            .unwrap_or(1);

        let mut out = Map::new();
        out.insert("authenticated".to_string(), json!(auth_outcome(ID, outcome, errors)));
        out.insert("api_key".to_string(), json!(api_key));
        out.insert("number".to_string(), json!(number));
        out.insert(
            "size".to_string(),
            json!(one_of(
                Some(&pick_str(&doc, current, ID, "size")),
                image::SIZES,
                image::DEFAULT_SIZE
            )),
        );
        out.insert(
            "quality".to_string(),
            json!(one_of(
                Some(&pick_str(&doc, current, ID, "quality")),
                image::QUALITIES,
                "standard"
            )),
        );
        out.insert(
            "style".to_string(),
            json!(one_of(
                Some(&pick_str(&doc, current, ID, "style")),
                image::STYLES,
                "vivid"
            )),
        );
        out
    }

    async fn rest_endpoint_callback(
        &self,
        ctx: &AppContext,
        call: &RouteCall<'_>,
    ) -> Result<RouteResult> {
        if call.route != Route::GenerateImage {
            return Ok(RouteResult::Empty);
        }

        let prompt = match &call.target {
            Target::Prompt(prompt) if !prompt.trim().is_empty() => prompt.trim().to_string(),
            _ => {
                return Err(QuillError::PromptRequired(
                    "A prompt is required to generate an image.".to_string(),
                ));
            }
        };

        if !call.actor.can(caps::UPLOAD_FILES) {
            return Err(QuillError::Forbidden(
                "Sorry, you are not allowed to do that.".to_string(),
            ));
        }

        let settings = chat::ensure_active(ctx, call, Some(ID.service_name()))?;
        let endpoint = ctx.endpoint(ID);
        let request = ImageRequest::resolve(call, &settings);

        let hook_ctx = HookContext {
            feature: call.feature,
            provider: ID,
            route: &call.route,
            item_id: None,
        };
        let prompt = ctx.hooks.apply_text(HookStage::PromptBuilt, &hook_ctx, prompt);
        let body = ctx.hooks.apply(
            HookStage::BodyBuilt,
            &hook_ctx,
            request.body(endpoint.model(), &prompt),
        );

        info!(n = request.n, size = %request.size, "Dispatching image generation request");
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
        let images = request.extract(&response);
        if images.is_empty() {
            return Err(QuillError::no_choices(ID.service_name()));
        }
        Ok(RouteResult::Images(images))
    }

    fn debug_information(
        &self,
        ctx: &AppContext,
        _feature: FeatureId,
        settings: &FeatureSettings,
    ) -> Vec<(String, String)> {
        let authenticated = if settings.is_authenticated(ID) { "yes" } else { "no" };
        vec![
            ("Authenticated".to_string(), authenticated.to_string()),
            ("Model".to_string(), ctx.endpoint(ID).model().to_string()),
            (
                "Number of images".to_string(),
                settings.provider_u64(ID, "number").unwrap_or(1).to_string(),
            ),
            (
                "Image size".to_string(),
                one_of(
                    Some(settings.provider_str(ID, "size")),
                    image::SIZES,
                    image::DEFAULT_SIZE,
                ),
            ),
            (
                "Latest response".to_string(),
                diagnostics::formatted_latest(ctx.transients.as_ref(), ID, &Route::GenerateImage),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(format: &str) -> ImageRequest {
        ImageRequest {
            n: 2,
            size: "1024x1024".into(),
            quality: None,
            style: Some("natural".into()),
            format: format.into(),
        }
    }

    #[test]
    fn test_one_of() {
        assert_eq!(one_of(Some("512x512"), image::SIZES, image::DEFAULT_SIZE), "512x512");
        assert_eq!(one_of(Some("9x9"), image::SIZES, image::DEFAULT_SIZE), "1024x1024");
        assert_eq!(one_of(None, image::FORMATS, "url"), "url");
    }

    #[test]
    fn test_body_shape() {
        let body = request("url").body("dall-e-3", "A lighthouse at dusk");
        assert_eq!(body["model"], "dall-e-3");
        assert_eq!(body["n"], 2);
        assert_eq!(body["response_format"], "url");
        assert_eq!(body["style"], "natural");
        assert!(body.get("quality").is_none());
    }

    #[test]
    fn test_extract_by_format() {
        let response = json!({"data": [
            {"url": "https://img.test/1.png"},
            {"b64_json": "aGVsbG8="},
            {"url": ""}
        ]});
        assert_eq!(
            request("url").extract(&response),
            vec![GeneratedImage { url: "https://img.test/1.png".into() }]
        );
        assert_eq!(request("b64_json").extract(&response)[0].url, "aGVsbG8=");
        assert!(request("url").extract(&json!({})).is_empty());
    }

    #[test]
    fn test_default_settings() {
        let defaults = DallEProvider.default_settings(FeatureId::ImageGeneration);
        assert_eq!(defaults["number"], 1);
        assert_eq!(defaults["size"], "1024x1024");
        assert_eq!(defaults["authenticated"], false);
    }
}
