//! Chrome AI (browser) Provider
//!
//! Never calls upstream. Routes return the prompt and trimmed content so the
//! editor can run the built-in browser model itself.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::chat::{self, UserContent};
use super::{BrowserPayload, Provider, ProviderId, Route, RouteCall, RouteResult};
use crate::context::AppContext;
use crate::feature::{FeatureId, FeatureSettings};
use crate::types::{Result, SettingsError};

const ID: ProviderId = ProviderId::ChromeAi;

#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeAiProvider;

#[async_trait]
impl Provider for ChromeAiProvider {
    fn id(&self) -> ProviderId {
        ID
    }

    fn default_settings(&self, _feature: FeatureId) -> Map<String, Value> {
        let mut doc = Map::new();
        doc.insert("authenticated".to_string(), json!(true));
        doc
    }

    async fn sanitize_settings(
        &self,
        _ctx: &AppContext,
        feature: FeatureId,
        _incoming: &Map<String, Value>,
        _current: &FeatureSettings,
        _errors: &mut Vec<SettingsError>,
    ) -> Map<String, Value> {
        self.default_settings(feature)
    }

    async fn rest_endpoint_callback(
        &self,
        ctx: &AppContext,
        call: &RouteCall<'_>,
    ) -> Result<RouteResult> {
        if !matches!(call.route, Route::Title | Route::Excerpt | Route::ResizeContent) {
            debug!(route = %call.route, "Route not handled by browser provider");
            return Ok(RouteResult::Empty);
        }

        let item = chat::resolve_item(ctx, call)?;
        let settings = chat::ensure_active(ctx, call, None)?;
        let endpoint = ctx.endpoint(ID);
        let job = chat::build_job(ctx, call, ID, &endpoint, &settings, item.as_ref())?;

        let content = match job.user {
            UserContent::Text(text) => text,
            UserContent::ImageUrl(url) => url,
        };
        Ok(RouteResult::Browser(BrowserPayload {
            prompt: job.system,
            content,
            func: ID.as_str().to_string(),
        }))
    }

    fn debug_information(
        &self,
        _ctx: &AppContext,
        _feature: FeatureId,
        _settings: &FeatureSettings,
    ) -> Vec<(String, String)> {
        vec![("Runs in".to_string(), "browser".to_string())]
    }
}
