//! Request Hooks
//!
//! Ordered transform lists run at fixed points of every route. All stages
//! are empty by default, so an unconfigured pipeline passes values through.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::ai::provider::{ProviderId, Route};
use crate::feature::FeatureId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    /// Prompt text after defaulting and placeholder substitution
    PromptBuilt,
    /// Content window after normalization and trimming
    ContentBuilt,
    /// Full upstream request body
    BodyBuilt,
    /// Parsed upstream response before result extraction
    ResponseReceived,
}

/// What a transform is running for
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub feature: FeatureId,
    pub provider: ProviderId,
    pub route: &'a Route,
    pub item_id: Option<u64>,
}

pub type Transform = Arc<dyn Fn(&HookContext<'_>, Value) -> Value + Send + Sync>;

#[derive(Clone, Default)]
pub struct Hooks {
    stages: HashMap<HookStage, Vec<Transform>>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self.stages.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("Hooks").field("stages", &counts).finish()
    }
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&mut self, stage: HookStage, transform: F)
    where
        F: Fn(&HookContext<'_>, Value) -> Value + Send + Sync + 'static,
    {
        self.stages.entry(stage).or_default().push(Arc::new(transform));
    }

    pub fn with<F>(mut self, stage: HookStage, transform: F) -> Self
    where
        F: Fn(&HookContext<'_>, Value) -> Value + Send + Sync + 'static,
    {
        self.add(stage, transform);
        self
    }

    pub fn len(&self, stage: HookStage) -> usize {
        self.stages.get(&stage).map_or(0, Vec::len)
    }

    pub fn apply(&self, stage: HookStage, ctx: &HookContext<'_>, value: Value) -> Value {
        match self.stages.get(&stage) {
            Some(transforms) => transforms.iter().fold(value, |acc, t| t(ctx, acc)),
            None => value,
        }
    }

    /// Run a text stage. A transform that returns a non-string keeps the
    /// previous text.
    pub fn apply_text(&self, stage: HookStage, ctx: &HookContext<'_>, text: String) -> String {
        let Some(transforms) = self.stages.get(&stage) else {
            return text;
        };
        transforms.iter().fold(text, |acc, t| {
            match t(ctx, Value::String(acc.clone())) {
                Value::String(next) => next,
                _ => acc,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(route: &Route) -> HookContext<'_> {
        HookContext {
            feature: FeatureId::TitleGeneration,
            provider: ProviderId::XaiGrok,
            route,
            item_id: Some(1),
        }
    }

    #[test]
    fn test_empty_hooks_pass_through() {
        let hooks = Hooks::new();
        let route = Route::Title;
        assert_eq!(hooks.apply(HookStage::BodyBuilt, &ctx(&route), json!({"a": 1})), json!({"a": 1}));
        assert_eq!(hooks.apply_text(HookStage::PromptBuilt, &ctx(&route), "p".into()), "p");
    }

    #[test]
    fn test_transforms_run_in_order() {
        let hooks = Hooks::new()
            .with(HookStage::PromptBuilt, |_, v| json!(format!("{}1", v.as_str().unwrap_or(""))))
            .with(HookStage::PromptBuilt, |_, v| json!(format!("{}2", v.as_str().unwrap_or(""))));
        let route = Route::Title;
        assert_eq!(hooks.apply_text(HookStage::PromptBuilt, &ctx(&route), "p".into()), "p12");
        assert_eq!(hooks.len(HookStage::PromptBuilt), 2);
        assert_eq!(hooks.len(HookStage::BodyBuilt), 0);
    }

    #[test]
    fn test_text_stage_ignores_non_string() {
        let hooks = Hooks::new().with(HookStage::ContentBuilt, |_, _| Value::Null);
        let route = Route::Excerpt;
        assert_eq!(hooks.apply_text(HookStage::ContentBuilt, &ctx(&route), "keep".into()), "keep");
    }

    #[test]
    fn test_body_transform_sees_context() {
        let hooks = Hooks::new().with(HookStage::BodyBuilt, |ctx, mut body| {
            body["provider"] = json!(ctx.provider.as_str());
            body
        });
        let route = Route::Title;
        let body = hooks.apply(HookStage::BodyBuilt, &ctx(&route), json!({}));
        assert_eq!(body["provider"], "xai_grok");
    }
}
