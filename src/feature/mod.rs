//! Features
//!
//! A feature is a named capability switch: it owns its supported providers,
//! its settings document (including the active provider) and the access
//! decision for an actor.
//!
//! ## Modules
//!
//! - `catalog`: feature identities, provider mapping, defaults, prompt keys
//! - `settings`: default documents, read-time merge, merged view
//! - `access`: role/user/opt-out resolution
//! - `migration`: legacy flat documents to the nested shape

pub mod access;
pub mod catalog;
pub mod migration;
pub mod settings;

pub use access::{UserAccess, UserOverride, has_access};
pub use catalog::{FeatureId, LegacyLayout, prompt_keys};
pub use migration::migrate_document;
pub use settings::{FeatureSettings, as_u64, default_document, merge_settings, truthy};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::ai::prompt::{PromptEntry, parse_prompts, sanitize_prompts};
use crate::ai::provider::ProviderId;
use crate::constants::{excerpt, term_cleanup};
use crate::context::AppContext;
use crate::types::{Actor, Result, SettingsError};

/// Enablement of a feature for one actor, derived on every read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureState {
    Disabled,
    EnabledUnauthenticated,
    EnabledNoAccess,
    Active,
}

/// How a settings save is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    #[default]
    Full,
    /// Onboarding step: only `status` is toggled, credentials are not checked
    EnableOnly,
}

/// Result of a settings save
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveOutcome {
    pub settings: Value,
    pub errors: Vec<SettingsError>,
}

/// A feature bound to the application context
#[derive(Debug, Clone, Copy)]
pub struct Feature<'a> {
    id: FeatureId,
    ctx: &'a AppContext,
}

impl<'a> Feature<'a> {
    pub fn new(id: FeatureId, ctx: &'a AppContext) -> Self {
        Self { id, ctx }
    }

    pub fn id(&self) -> FeatureId {
        self.id
    }

    // =========================================================================
    // Reading
    // =========================================================================

    pub fn default_settings(&self) -> Map<String, Value> {
        default_document(self.id, self.ctx.default_roles())
    }

    fn persisted(&self) -> Result<Map<String, Value>> {
        Ok(self
            .ctx
            .settings
            .load(&self.id.option_name())?
            .and_then(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default())
    }

    /// Fresh merged settings
    pub fn get_settings(&self) -> Result<FeatureSettings> {
        let merged = merge_settings(&self.default_settings(), &self.persisted()?);
        Ok(FeatureSettings::new(self.id, merged))
    }

    /// Merged provider sub-document; `None` selects the active provider
    pub fn provider_settings(&self, provider: Option<ProviderId>) -> Result<Map<String, Value>> {
        let settings = self.get_settings()?;
        let id = provider.unwrap_or_else(|| settings.provider());
        Ok(settings.provider_doc(id).cloned().unwrap_or_default())
    }

    // =========================================================================
    // Enablement
    // =========================================================================

    pub fn state_for(&self, settings: &FeatureSettings, actor: &Actor) -> FeatureState {
        if !settings.is_enabled() {
            FeatureState::Disabled
        } else if !settings.is_authenticated(settings.provider()) {
            FeatureState::EnabledUnauthenticated
        } else if !has_access(actor, settings) {
            FeatureState::EnabledNoAccess
        } else {
            FeatureState::Active
        }
    }

    pub fn state(&self, actor: &Actor) -> Result<FeatureState> {
        let settings = self.get_settings()?;
        Ok(self.state_for(&settings, actor))
    }

    pub fn is_feature_enabled(&self, actor: &Actor) -> Result<bool> {
        Ok(self.state(actor)? == FeatureState::Active)
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Validate feature-level keys and run the active provider's
    /// sanitization. Returns the full document to persist.
    pub async fn sanitize_settings(
        &self,
        incoming: &Map<String, Value>,
    ) -> Result<(Map<String, Value>, Vec<SettingsError>)> {
        let current = self.get_settings()?;
        let mut out = current.as_map().clone();
        let mut errors = Vec::new();

        if let Some(status) = incoming.get("status") {
            out.insert("status".into(), status_value(truthy(status)));
        }

        let provider = incoming
            .get("provider")
            .and_then(Value::as_str)
            .and_then(|p| p.parse::<ProviderId>().ok())
            .filter(|id| self.id.supports(*id))
            .unwrap_or_else(|| current.provider());
        out.insert("provider".into(), json!(provider.as_str()));

        for key in ["role_based_access", "user_based_opt_out"] {
            if let Some(value) = incoming.get(key) {
                out.insert(key.into(), json!(truthy(value)));
            }
        }
        if let Some(roles) = incoming.get("roles").and_then(Value::as_array) {
            let roles: Vec<&str> = roles
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .collect();
            out.insert("roles".into(), json!(roles));
        }
        if incoming.contains_key("users") {
            let probe = FeatureSettings::new(self.id, incoming.clone());
            out.insert("users".into(), json!(access::user_overrides(&probe)));
        }

        for key in self.id.prompt_keys() {
            let entries = match incoming.get(*key) {
                Some(value) => parse_prompts(Some(value)),
                None => parse_prompts(current.get(key)),
            };
            let original = PromptEntry::original(prompt_keys::default_text(key).unwrap_or_default());
            out.insert(key.to_string(), json!(sanitize_prompts(&entries, &original)));
        }

        self.sanitize_specific(incoming, &mut out);

        let sub_doc = self
            .ctx
            .provider(provider)
            .sanitize_settings(self.ctx, self.id, incoming, &current, &mut errors)
            .await;
        let mut merged_sub = current.provider_doc(provider).cloned().unwrap_or_default();
        merged_sub.extend(sub_doc);
        out.insert(provider.as_str().to_string(), Value::Object(merged_sub));

        Ok((out, errors))
    }

    fn sanitize_specific(&self, incoming: &Map<String, Value>, out: &mut Map<String, Value>) {
        match self.id {
            FeatureId::ExcerptGeneration => {
                if let Some(length) = incoming.get("length").and_then(as_u64) {
                    let length = length.clamp(excerpt::MIN_LENGTH, excerpt::MAX_LENGTH);
                    out.insert("length".into(), json!(length));
                }
            }
            FeatureId::Classification => {
                for key in ["post_types", "post_statuses"] {
                    if let Some(list) = incoming.get(key).and_then(Value::as_array) {
                        let list: Vec<&str> = list.iter().filter_map(Value::as_str).collect();
                        out.insert(key.into(), json!(list));
                    }
                }
            }
            FeatureId::TermCleanup => {
                if let Some(taxonomies) = incoming.get("taxonomies").and_then(Value::as_object) {
                    let cleaned: Map<String, Value> = taxonomies
                        .iter()
                        .map(|(name, enabled)| (name.clone(), json!(truthy(enabled))))
                        .collect();
                    out.insert("taxonomies".into(), Value::Object(cleaned));
                }
                if let Some(threshold) = incoming.get("threshold").and_then(as_u64) {
                    out.insert("threshold".into(), json!(threshold.min(100)));
                }
                out.entry("threshold")
                    .or_insert_with(|| json!(term_cleanup::DEFAULT_THRESHOLD));
            }
            _ => {}
        }
    }

    /// Sanitize and persist. Settings errors never abort the save.
    pub async fn save_settings(&self, incoming: &Map<String, Value>, mode: SaveMode) -> Result<SaveOutcome> {
        let (doc, errors) = match mode {
            SaveMode::Full => self.sanitize_settings(incoming).await?,
            SaveMode::EnableOnly => {
                let mut doc = self.persisted()?;
                if let Some(status) = incoming.get("status") {
                    doc.insert("status".into(), status_value(truthy(status)));
                }
                (doc, Vec::new())
            }
        };

        let value = Value::Object(doc);
        self.ctx.settings.save(&self.id.option_name(), &value)?;
        info!(
            feature = %self.id,
            ?mode,
            errors = errors.len(),
            "Saved feature settings"
        );

        Ok(SaveOutcome {
            settings: self.get_settings()?.into_value(),
            errors,
        })
    }

    /// Drop the persisted document so reads fall back to defaults
    pub fn reset_settings(&self) -> Result<()> {
        self.ctx.settings.delete(&self.id.option_name())?;
        info!(feature = %self.id, "Reset feature settings");
        Ok(())
    }

    /// Convert a legacy document into the nested shape.
    ///
    /// The feature's own document is migrated in place; without one the
    /// legacy option key is read. Returns whether anything was written.
    pub fn migrate_settings(&self) -> Result<bool> {
        let own = self.persisted()?;
        let source = if !own.is_empty() {
            own
        } else if let Some(layout) = self.id.legacy_layout() {
            match self.ctx.settings.load(layout.option_key)? {
                Some(Value::Object(legacy)) => legacy,
                _ => return Ok(false),
            }
        } else {
            return Ok(false);
        };

        let (migrated, changed) = migrate_document(self.id, &source);
        if !changed {
            debug!(feature = %self.id, "Settings already migrated");
            return Ok(false);
        }

        self.ctx
            .settings
            .save(&self.id.option_name(), &Value::Object(migrated))?;
        info!(feature = %self.id, "Migrated legacy settings");
        Ok(true)
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Feature rows followed by the active provider's rows
    pub fn debug_information(&self) -> Result<Vec<(String, String)>> {
        let settings = self.get_settings()?;
        let provider = settings.provider();
        let mut rows = vec![
            (
                "Status".to_string(),
                if settings.is_enabled() { "enabled" } else { "disabled" }.to_string(),
            ),
            ("Provider".to_string(), provider.display_name().to_string()),
            (
                "Role-based access".to_string(),
                yes_no(settings.flag("role_based_access")),
            ),
            ("Allowed roles".to_string(), settings.string_list("roles").join(", ")),
            (
                "User-based opt-out".to_string(),
                yes_no(settings.flag("user_based_opt_out")),
            ),
        ];
        rows.extend(
            self.ctx
                .provider(provider)
                .debug_information(self.ctx, self.id, &settings),
        );
        Ok(rows)
    }
}

fn status_value(enabled: bool) -> Value {
    json!(if enabled { "enabled" } else { "disabled" })
}

fn yes_no(b: bool) -> String {
    if b { "yes" } else { "no" }.to_string()
}

/// Merged settings of every feature keyed by feature ID
pub fn settings_snapshot(ctx: &AppContext) -> Result<Map<String, Value>> {
    let mut all = Map::new();
    for id in FeatureId::ALL {
        all.insert(id.as_str().to_string(), ctx.feature(id).get_settings()?.into_value());
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> Actor {
        Actor::new(2, ["editor"])
    }

    async fn save(ctx: &AppContext, id: FeatureId, doc: Value) -> SaveOutcome {
        ctx.feature(id)
            .save_settings(doc.as_object().unwrap(), SaveMode::Full)
            .await
            .unwrap()
    }

    #[test]
    fn test_defaults_are_disabled() {
        let ctx = AppContext::in_memory();
        let state = ctx.feature(FeatureId::TitleGeneration).state(&editor()).unwrap();
        assert_eq!(state, FeatureState::Disabled);
    }

    #[test]
    fn test_unauthenticated_provider_not_enabled() {
        let ctx = AppContext::in_memory();
        ctx.settings
            .save(
                &FeatureId::TitleGeneration.option_name(),
                &json!({ "status": "enabled", "provider": "xai_grok" }),
            )
            .unwrap();
        let feature = ctx.feature(FeatureId::TitleGeneration);
        assert_eq!(feature.state(&editor()).unwrap(), FeatureState::EnabledUnauthenticated);
        assert!(!feature.is_feature_enabled(&editor()).unwrap());
    }

    #[test]
    fn test_browser_provider_active_without_credentials() {
        let ctx = AppContext::in_memory();
        ctx.settings
            .save(
                &FeatureId::ExcerptGeneration.option_name(),
                &json!({ "status": "enabled", "provider": "chrome_ai" }),
            )
            .unwrap();
        let feature = ctx.feature(FeatureId::ExcerptGeneration);
        assert_eq!(feature.state(&editor()).unwrap(), FeatureState::Active);
        assert_eq!(
            feature.state(&Actor::new(5, ["subscriber"])).unwrap(),
            FeatureState::EnabledNoAccess
        );
    }

    #[tokio::test]
    async fn test_save_records_auth_error_and_persists() {
        let ctx = AppContext::in_memory();
        let outcome = save(
            &ctx,
            FeatureId::TitleGeneration,
            json!({ "status": "1", "provider": "xai_grok", "xai_grok": { "api_key": "" } }),
        )
        .await;

        assert_eq!(outcome.settings["status"], "enabled");
        assert_eq!(outcome.settings["provider"], "xai_grok");
        assert_eq!(outcome.settings["xai_grok"]["authenticated"], false);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].message, "Please enter your xAI API key.");
    }

    #[tokio::test]
    async fn test_save_sanitizes_prompts_and_length() {
        let ctx = AppContext::in_memory();
        let outcome = save(
            &ctx,
            FeatureId::ExcerptGeneration,
            json!({
                "provider": "chrome_ai",
                "length": 9000,
                "generate_excerpt_prompt": [
                    { "title": "Blank", "prompt": "  " },
                    { "title": "Mine", "prompt": "Be brief.", "default": 1 }
                ],
            }),
        )
        .await;

        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.settings["length"], excerpt::MAX_LENGTH);
        let prompts = parse_prompts(outcome.settings.get("generate_excerpt_prompt"));
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].original);
        assert!(prompts[1].default);
    }

    #[tokio::test]
    async fn test_enable_only_skips_credentials() {
        let ctx = AppContext::in_memory();
        let outcome = ctx
            .feature(FeatureId::TitleGeneration)
            .save_settings(
                json!({ "status": true, "xai_grok": { "api_key": "k" } })
                    .as_object()
                    .unwrap(),
                SaveMode::EnableOnly,
            )
            .await
            .unwrap();
        assert_eq!(outcome.settings["status"], "enabled");
        assert_eq!(outcome.settings["xai_grok"]["api_key"], "");
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_reset_falls_back_to_defaults() {
        let ctx = AppContext::in_memory();
        let feature = ctx.feature(FeatureId::ImageGeneration);
        ctx.settings
            .save(&FeatureId::ImageGeneration.option_name(), &json!({ "status": "enabled" }))
            .unwrap();
        assert!(feature.get_settings().unwrap().is_enabled());

        feature.reset_settings().unwrap();
        assert!(!feature.get_settings().unwrap().is_enabled());
    }

    #[test]
    fn test_migrate_from_legacy_option() {
        let ctx = AppContext::in_memory();
        ctx.settings
            .save(
                "classifai_openai_dalle",
                &json!({ "api_key": "sk", "authenticated": true, "enable_image_gen": "1", "number": 2 }),
            )
            .unwrap();
        let feature = ctx.feature(FeatureId::ImageGeneration);

        assert!(feature.migrate_settings().unwrap());
        assert!(!feature.migrate_settings().unwrap());

        let settings = feature.get_settings().unwrap();
        assert!(settings.is_enabled());
        assert_eq!(settings.provider_u64(ProviderId::OpenaiDalle, "number"), Some(2));
        assert_eq!(settings.provider_str(ProviderId::OpenaiDalle, "size"), "1024x1024");
    }

    #[test]
    fn test_provider_settings_defaults_to_active() {
        let ctx = AppContext::in_memory();
        let doc = ctx
            .feature(FeatureId::Classification)
            .provider_settings(None)
            .unwrap();
        assert_eq!(doc["category_taxonomy"], "category");
    }
}
