//! Feature Dispatcher
//!
//! Entry point shared by the HTTP surface and the CLI. A dispatch:
//!
//! 1. resolves the feature for the route (or takes an explicit one)
//! 2. checks the actor's capability for the route
//! 3. checks the target item is exposed to the API
//! 4. gates on the feature being active for the actor
//! 5. forwards to the active provider's route callback
//!
//! Settings reads and writes go through here too so the capability check
//! lives in one place.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::ai::provider::{Route, RouteArgs, RouteCall, RouteResult, Target};
use crate::context::{AppContext, SharedContext};
use crate::feature::{FeatureId, FeatureState, SaveMode, settings_snapshot, truthy};
use crate::types::actor::caps;
use crate::types::{Actor, QuillError, Result, SettingsError};

const FORBIDDEN_MESSAGE: &str = "Sorry, you are not allowed to do that.";
const ONBOARDING_STEP: &str = "enable_features";

/// One route invocation as received from a caller
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub route: Route,
    /// Defaults to the feature that owns the route
    pub feature: Option<FeatureId>,
    pub target: Target,
    pub args: RouteArgs,
}

impl DispatchRequest {
    pub fn new(route: Route, target: Target) -> Self {
        Self {
            route,
            feature: None,
            target,
            args: RouteArgs::default(),
        }
    }

    pub fn with_feature(mut self, feature: FeatureId) -> Self {
        self.feature = Some(feature);
        self
    }

    pub fn with_args(mut self, args: RouteArgs) -> Self {
        self.args = args;
        self
    }
}

/// Body of a settings save
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SettingsPayload {
    /// Feature ID → incoming feature document
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub is_setup: Option<Value>,
    #[serde(default)]
    pub step: Option<String>,
}

impl SettingsPayload {
    pub fn mode(&self) -> SaveMode {
        let is_setup = self.is_setup.as_ref().is_some_and(truthy);
        if is_setup && self.step.as_deref() == Some(ONBOARDING_STEP) {
            SaveMode::EnableOnly
        } else {
            SaveMode::Full
        }
    }
}

/// Response of a settings save: every feature's merged settings plus the
/// accumulated notices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsResponse {
    pub settings: Map<String, Value>,
    pub errors: Vec<SettingsError>,
}

/// Feature owning a built-in route
pub fn feature_for_route(route: &Route) -> Option<FeatureId> {
    match route {
        Route::Title => Some(FeatureId::TitleGeneration),
        Route::Excerpt => Some(FeatureId::ExcerptGeneration),
        Route::ResizeContent => Some(FeatureId::ContentResizing),
        Route::DescriptiveText => Some(FeatureId::DescriptiveTextGenerator),
        Route::Classify => Some(FeatureId::Classification),
        Route::GenerateImage => Some(FeatureId::ImageGeneration),
        Route::TermCleanup => Some(FeatureId::TermCleanup),
        Route::Unknown(_) => None,
    }
}

/// Capability an actor needs to run a route
pub fn required_capability(route: &Route) -> &'static str {
    match route {
        Route::GenerateImage => caps::UPLOAD_FILES,
        Route::TermCleanup => caps::MANAGE_TERMS,
        _ => caps::EDIT_POSTS,
    }
}

#[derive(Debug, Clone)]
pub struct FeatureDispatcher {
    ctx: SharedContext,
}

impl FeatureDispatcher {
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    // =========================================================================
    // Routes
    // =========================================================================

    pub async fn dispatch(&self, actor: &Actor, request: DispatchRequest) -> Result<RouteResult> {
        let DispatchRequest {
            route,
            feature,
            target,
            args,
        } = request;

        let feature = feature.or_else(|| feature_for_route(&route)).ok_or_else(|| {
            QuillError::InvalidParam(format!("No feature handles the {} route.", route))
        })?;

        self.authorize(actor, &route, &target)?;

        let handle = self.ctx.feature(feature);
        let settings = handle.get_settings()?;
        let state = handle.state_for(&settings, actor);
        if state != FeatureState::Active {
            debug!(%feature, ?state, user = actor.user_id, "Dispatch rejected");
            return Err(QuillError::not_enabled(format!(
                "{} not currently enabled.",
                sentence_case(feature.label())
            )));
        }

        let provider_id = settings.provider();
        info!(
            %feature,
            provider = %provider_id,
            %route,
            user = actor.user_id,
            "Dispatching route"
        );

        let call = RouteCall {
            feature,
            actor,
            target,
            route,
            args,
        };
        let provider = self.ctx.provider(provider_id);
        let result = provider.rest_endpoint_callback(&self.ctx, &call).await;
        if let Err(err) = &result {
            warn!(%feature, provider = %provider_id, code = %err.code(), "Route failed: {}", err);
        }
        result
    }

    fn authorize(&self, actor: &Actor, route: &Route, target: &Target) -> Result<()> {
        if actor.is_anonymous() || !actor.can(required_capability(route)) {
            return Err(QuillError::Forbidden(FORBIDDEN_MESSAGE.to_string()));
        }

        if let Target::Item(id) = target
            && let Some(item) = self.ctx.content.get_item(*id)?
            && !item.show_in_rest
        {
            debug!(id, post_type = %item.post_type, "Item not exposed to the API");
            return Err(QuillError::Forbidden(FORBIDDEN_MESSAGE.to_string()));
        }

        Ok(())
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Merged settings of every feature
    pub fn get_settings(&self, actor: &Actor) -> Result<Map<String, Value>> {
        self.require_options(actor)?;
        settings_snapshot(&self.ctx)
    }

    /// Save each feature in the payload. Unknown feature keys are skipped
    /// with a notice; settings errors never abort the save.
    pub async fn save_settings(&self, actor: &Actor, payload: &SettingsPayload) -> Result<SettingsResponse> {
        self.require_options(actor)?;
        let mode = payload.mode();
        let mut errors = Vec::new();

        for (key, incoming) in &payload.settings {
            let Ok(feature) = key.parse::<FeatureId>() else {
                warn!(key = %key, "Skipping unknown feature in settings payload");
                errors.push(SettingsError::new(
                    "invalid_feature",
                    format!("Unknown feature: {}", key),
                ));
                continue;
            };
            let Value::Object(incoming) = incoming else {
                errors.push(SettingsError::new(
                    "invalid_settings",
                    format!("Settings for {} must be an object.", feature.label()),
                ));
                continue;
            };

            let outcome = self.ctx.feature(feature).save_settings(incoming, mode).await?;
            errors.extend(outcome.errors);
        }

        Ok(SettingsResponse {
            settings: settings_snapshot(&self.ctx)?,
            errors,
        })
    }

    fn require_options(&self, actor: &Actor) -> Result<()> {
        if actor.can(caps::MANAGE_OPTIONS) {
            Ok(())
        } else {
            Err(QuillError::Forbidden(FORBIDDEN_MESSAGE.to_string()))
        }
    }
}

fn sentence_case(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.as_str().to_lowercase().chars())
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::storage::MemoryContent;
    use crate::types::ContentItem;

    fn dispatcher() -> (FeatureDispatcher, Arc<MemoryContent>) {
        let content = Arc::new(MemoryContent::new());
        let ctx = AppContext::builder()
            .content(content.clone())
            .taxonomies(content.clone())
            .build();
        (FeatureDispatcher::new(Arc::new(ctx)), content)
    }

    fn editor() -> Actor {
        Actor::new(2, ["editor"]).with_capabilities([caps::EDIT_POSTS])
    }

    #[test]
    fn test_feature_for_route() {
        assert_eq!(feature_for_route(&Route::Title), Some(FeatureId::TitleGeneration));
        assert_eq!(feature_for_route(&Route::Classify), Some(FeatureId::Classification));
        assert_eq!(feature_for_route(&Route::parse("bogus")), None);
    }

    #[test]
    fn test_settings_payload_mode() {
        let payload: SettingsPayload =
            serde_json::from_value(json!({ "settings": {}, "is_setup": true, "step": "enable_features" }))
                .unwrap();
        assert_eq!(payload.mode(), SaveMode::EnableOnly);

        let payload: SettingsPayload =
            serde_json::from_value(json!({ "settings": {}, "step": "enable_features" })).unwrap();
        assert_eq!(payload.mode(), SaveMode::Full);
    }

    #[test]
    fn test_sentence_case() {
        assert_eq!(sentence_case("Title Generation"), "Title generation");
        assert_eq!(sentence_case(""), "");
    }

    #[tokio::test]
    async fn test_anonymous_is_forbidden() {
        let (dispatcher, _) = dispatcher();
        let err = dispatcher
            .dispatch(&Actor::anonymous(), DispatchRequest::new(Route::Title, Target::Item(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, QuillError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_missing_capability_is_forbidden() {
        let (dispatcher, _) = dispatcher();
        let err = dispatcher
            .dispatch(
                &editor(),
                DispatchRequest::new(Route::GenerateImage, Target::Prompt("a cat".into())),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "rest_forbidden");
    }

    #[tokio::test]
    async fn test_hidden_item_is_forbidden() {
        let (dispatcher, content) = dispatcher();
        let mut item = ContentItem::new(7, "Hidden", "Body");
        item.show_in_rest = false;
        content.insert_item(item);

        let err = dispatcher
            .dispatch(&editor(), DispatchRequest::new(Route::Title, Target::Item(7)))
            .await
            .unwrap_err();
        assert!(matches!(err, QuillError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_disabled_feature_is_not_enabled() {
        let (dispatcher, content) = dispatcher();
        content.insert_item(ContentItem::new(7, "Post", "Body"));

        let err = dispatcher
            .dispatch(&editor(), DispatchRequest::new(Route::Title, Target::Item(7)))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Title generation not currently enabled.");
    }

    #[tokio::test]
    async fn test_unknown_route_without_feature() {
        let (dispatcher, _) = dispatcher();
        let err = dispatcher
            .dispatch(&editor(), DispatchRequest::new(Route::parse("mystery"), Target::Text))
            .await
            .unwrap_err();
        assert!(matches!(err, QuillError::InvalidParam(_)));
    }

    #[tokio::test]
    async fn test_browser_provider_round_trip() {
        let (dispatcher, content) = dispatcher();
        content.insert_item(ContentItem::new(7, "Post", "Some body text"));
        let admin = Actor::operator();

        let payload = SettingsPayload {
            settings: serde_json::from_value(json!({
                "feature_title_generation": { "status": "enabled", "provider": "chrome_ai" }
            }))
            .unwrap(),
            ..Default::default()
        };
        let saved = dispatcher.save_settings(&admin, &payload).await.unwrap();
        assert!(saved.errors.is_empty());

        let result = dispatcher
            .dispatch(&admin, DispatchRequest::new(Route::Title, Target::Item(7)))
            .await
            .unwrap();
        assert!(matches!(result, RouteResult::Browser(_)));
    }

    #[tokio::test]
    async fn test_settings_require_manage_options() {
        let (dispatcher, _) = dispatcher();
        assert!(dispatcher.get_settings(&editor()).is_err());

        let all = dispatcher.get_settings(&Actor::operator()).unwrap();
        assert_eq!(all.len(), FeatureId::ALL.len());
    }

    #[tokio::test]
    async fn test_save_settings_reports_unknown_feature() {
        let (dispatcher, _) = dispatcher();
        let payload = SettingsPayload {
            settings: serde_json::from_value(json!({ "feature_bogus": { "status": "enabled" } }))
                .unwrap(),
            ..Default::default()
        };
        let response = dispatcher
            .save_settings(&Actor::operator(), &payload)
            .await
            .unwrap();
        assert_eq!(response.errors[0].code, "invalid_feature");
    }

    #[tokio::test]
    async fn test_onboarding_save_only_toggles_status() {
        let (dispatcher, _) = dispatcher();
        let payload = SettingsPayload {
            settings: serde_json::from_value(json!({
                "feature_excerpt_generation": { "status": "1", "length": 10 }
            }))
            .unwrap(),
            is_setup: Some(json!(true)),
            step: Some("enable_features".into()),
        };
        let response = dispatcher
            .save_settings(&Actor::operator(), &payload)
            .await
            .unwrap();
        let excerpt = &response.settings["feature_excerpt_generation"];
        assert_eq!(excerpt["status"], "enabled");
        assert_eq!(excerpt["length"], 55);
    }
}
