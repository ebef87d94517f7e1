//! Shared route flow for chat-completion backends.
//!
//! Title, excerpt, resize and descriptive-text routes are the same for every
//! text backend up to the wire format:
//!
//! 1. resolve the target item
//! 2. re-check that the feature is active for the actor
//! 3. build a [`ChatJob`] (prompt, content window, suggestion count)
//! 4. let the backend encode, send and decode it
//! 5. record the outcome in the diagnostics cache
//! 6. clean the returned choices

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::{Endpoint, ProviderId, Route, RouteCall, RouteResult, Target, clamp_suggestions};
use crate::ai::diagnostics;
use crate::ai::hooks::{HookContext, HookStage};
use crate::ai::prompt::{default_prompt, parse_prompts, substitute};
use crate::ai::request::{Credentials, RequestOptions};
use crate::constants::budget::{GROW_RATIO, PROMPT_RESERVE_TOKENS, SHRINK_RATIO, WORDS_PER_TITLE};
use crate::constants::{excerpt, suggestions};
use crate::constants::image::DESCRIPTIVE_TEXT_MAX_TOKENS;
use crate::context::AppContext;
use crate::feature::{FeatureId, FeatureSettings, FeatureState, prompt_keys};
use crate::types::{ContentItem, QuillError, Result};

const TRIPLE_QUOTE_PREAMBLE: &str = "You will be provided with content delimited by triple quotes. ";
const TEXT_TEMPERATURE: f32 = 0.9;
const VISION_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub enum UserContent {
    /// Content window; wrapped in triple quotes on the wire
    Text(String),
    ImageUrl(String),
}

/// Backend-neutral description of one completion request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatJob {
    pub system: String,
    pub user: UserContent,
    pub n: u32,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Route returns every choice rather than the first
    pub multiple: bool,
}

impl ChatJob {
    pub fn is_vision(&self) -> bool {
        matches!(self.user, UserContent::ImageUrl(_))
    }

    pub fn quoted_text(&self) -> Option<String> {
        match &self.user {
            UserContent::Text(text) => Some(format!("\"\"\"{}\"\"\"", text)),
            UserContent::ImageUrl(_) => None,
        }
    }
}

// =============================================================================
// Backend Seam
// =============================================================================

#[async_trait]
pub(crate) trait ChatBackend: Send + Sync {
    fn provider_id(&self) -> ProviderId;

    fn build_body(&self, endpoint: &Endpoint, job: &ChatJob) -> Value;

    async fn send(
        &self,
        ctx: &AppContext,
        settings: &FeatureSettings,
        endpoint: &Endpoint,
        job: &ChatJob,
        body: Value,
    ) -> Result<Value>;

    fn extract_choices(&self, response: &Value) -> Vec<String>;
}

/// Whether the shared text flow handles a route
pub(crate) fn is_text_route(route: &Route) -> bool {
    matches!(
        route,
        Route::Title | Route::Excerpt | Route::ResizeContent | Route::DescriptiveText
    )
}

pub(crate) async fn run_route<B>(backend: &B, ctx: &AppContext, call: &RouteCall<'_>) -> Result<RouteResult>
where
    B: ChatBackend + ?Sized,
{
    let id = backend.provider_id();
    if !is_text_route(&call.route) {
        debug!(provider = %id, route = %call.route, "Route not handled");
        return Ok(RouteResult::Empty);
    }

    let item = resolve_item(ctx, call)?;
    let settings = ensure_active(ctx, call, Some(id.service_name()))?;
    let endpoint = ctx.endpoint(id);
    let job = build_job(ctx, call, id, &endpoint, &settings, item.as_ref())?;

    let hook_ctx = HookContext {
        feature: call.feature,
        provider: id,
        route: &call.route,
        item_id: call.target.item_id(),
    };
    let body = ctx
        .hooks
        .apply(HookStage::BodyBuilt, &hook_ctx, backend.build_body(&endpoint, &job));

    info!(provider = %id, route = %call.route, n = job.n, "Dispatching completion request");
    let response = backend.send(ctx, &settings, &endpoint, &job, body).await;
    diagnostics::record(ctx.transients.as_ref(), id, &call.route, response.as_ref());

    let response = ctx
        .hooks
        .apply(HookStage::ResponseReceived, &hook_ctx, response?);
    finish(&job, backend.extract_choices(&response), id.service_name())
}

// =============================================================================
// Route Preparation
// =============================================================================

fn post_id_message(route: &Route) -> &'static str {
    match route {
        Route::Title => "Post ID is required to generate titles.",
        Route::ResizeContent => "Post ID is required to resize content.",
        Route::DescriptiveText => "A valid attachment ID is required to generate descriptive text.",
        Route::Classify => "Post ID is required to classify post.",
        _ => "A valid post ID is required to generate an excerpt.",
    }
}

/// Resolve the content item a route runs against.
///
/// Text targets are accepted for text routes when content was supplied.
pub(crate) fn resolve_item(ctx: &AppContext, call: &RouteCall<'_>) -> Result<Option<ContentItem>> {
    let missing = || QuillError::post_id_required(post_id_message(&call.route));
    match &call.target {
        Target::Item(id) if *id > 0 => ctx.content.get_item(*id)?.map(Some).ok_or_else(missing),
        Target::Text
            if call.route != Route::DescriptiveText && !call.args.content().trim().is_empty() =>
        {
            Ok(None)
        }
        _ => Err(missing()),
    }
}

/// Load fresh settings and fail with `NotEnabled` unless the feature is
/// active for the actor. `service` names the vendor in the message.
pub(crate) fn ensure_active(
    ctx: &AppContext,
    call: &RouteCall<'_>,
    service: Option<&str>,
) -> Result<FeatureSettings> {
    let feature = ctx.feature(call.feature);
    let settings = feature.get_settings()?;
    let state = feature.state_for(&settings, call.actor);
    if state != FeatureState::Active {
        debug!(feature = %call.feature, ?state, "Route rejected");
        let vendor = service.map(|s| format!("{} ", s)).unwrap_or_default();
        return Err(QuillError::not_enabled(format!(
            "{} is disabled or {}authentication failed. Please check your settings.",
            call.route.label(),
            vendor
        )));
    }
    Ok(settings)
}

/// Prompt text for a prompt key: configured default, else the shipped prompt
pub(crate) fn resolve_prompt(settings: &FeatureSettings, key: &str) -> String {
    let entries = parse_prompts(settings.get(key));
    default_prompt(&entries)
        .map(str::to_string)
        .or_else(|| prompt_keys::default_text(key).map(str::to_string))
        .unwrap_or_default()
}

/// Build the trimmed content window for a route.
///
/// The budget is the provider window minus the expected output and a fixed
/// reserve for the prompt wrapper. Supplied content wins over stored content.
pub fn get_content(
    ctx: &AppContext,
    endpoint: &Endpoint,
    hook_ctx: &HookContext<'_>,
    item: Option<&ContentItem>,
    return_words: usize,
    use_title: bool,
    supplied: &str,
) -> String {
    let counter = endpoint.counter();
    let budget = counter.content_budget(endpoint.max_tokens, return_words);

    let raw = if supplied.trim().is_empty() {
        item.map(|i| i.content.as_str()).unwrap_or("")
    } else {
        supplied
    };
    let rendered = ctx.normalizer.render(raw);

    let normalized = match item {
        Some(item) if use_title => ctx.normalizer.normalize(&item.title, &rendered),
        _ => ctx.normalizer.normalize_content(&rendered),
    };

    let content = counter.trim_content(normalized.trim(), budget);
    debug!(budget, chars = content.len(), "Built content window");
    ctx.hooks
        .apply_text(HookStage::ContentBuilt, hook_ctx, content)
}

pub(crate) fn build_job(
    ctx: &AppContext,
    call: &RouteCall<'_>,
    provider: ProviderId,
    endpoint: &Endpoint,
    settings: &FeatureSettings,
    item: Option<&ContentItem>,
) -> Result<ChatJob> {
    let hook_ctx = HookContext {
        feature: call.feature,
        provider,
        route: &call.route,
        item_id: call.target.item_id(),
    };
    let suggestion_count = || {
        clamp_suggestions(
            call.args
                .num
                .map(u64::from)
                .or_else(|| settings.provider_u64(provider, "number_of_suggestions")),
        )
    };
    let prompt = |key: &str| {
        ctx.hooks
            .apply_text(HookStage::PromptBuilt, &hook_ctx, resolve_prompt(settings, key))
    };

    let job = match &call.route {
        Route::Title => {
            let n = suggestion_count();
            let content = get_content(
                ctx,
                endpoint,
                &hook_ctx,
                item,
                n as usize * WORDS_PER_TITLE,
                false,
                call.args.content(),
            );
            ChatJob {
                system: format!("{}{}", TRIPLE_QUOTE_PREAMBLE, prompt(prompt_keys::TITLE)),
                user: UserContent::Text(content),
                n,
                temperature: TEXT_TEMPERATURE,
                max_tokens: None,
                multiple: true,
            }
        }
        Route::Excerpt => {
            let length = settings
                .u64("length")
                .unwrap_or(excerpt::DEFAULT_LENGTH)
                .clamp(excerpt::MIN_LENGTH, excerpt::MAX_LENGTH);
            let title = call
                .args
                .title
                .clone()
                .or_else(|| item.map(|i| i.title.clone()))
                .unwrap_or_default();

            let template = resolve_prompt(settings, prompt_keys::EXCERPT);
            let substituted = substitute(
                &template,
                &[("WORDS", &length.to_string()), ("TITLE", &title)],
            );
            let prompt = ctx
                .hooks
                .apply_text(HookStage::PromptBuilt, &hook_ctx, substituted);

            let content = get_content(
                ctx,
                endpoint,
                &hook_ctx,
                item,
                length as usize,
                false,
                call.args.content(),
            );
            ChatJob {
                system: format!("{}{}", TRIPLE_QUOTE_PREAMBLE, prompt),
                user: UserContent::Text(content),
                n: 1,
                temperature: TEXT_TEMPERATURE,
                max_tokens: None,
                multiple: false,
            }
        }
        Route::ResizeContent => {
            let key = if call.args.resize_type.as_deref() == Some("shrink") {
                prompt_keys::CONDENSE
            } else {
                prompt_keys::EXPAND
            };
            let source = match call.args.content().trim() {
                "" => item.map(|i| i.content.as_str()).unwrap_or(""),
                supplied => supplied,
            };
            let input_words = ctx
                .normalizer
                .normalize_content(&ctx.normalizer.render(source))
                .split_whitespace()
                .count();
            let ratio = if key == prompt_keys::CONDENSE {
                SHRINK_RATIO
            } else {
                GROW_RATIO
            };
            let content = get_content(
                ctx,
                endpoint,
                &hook_ctx,
                item,
                resize_output_words(endpoint, input_words, ratio),
                false,
                call.args.content(),
            );
            ChatJob {
                system: format!("{}{}", TRIPLE_QUOTE_PREAMBLE, prompt(key)),
                user: UserContent::Text(content),
                n: suggestion_count(),
                temperature: TEXT_TEMPERATURE,
                max_tokens: None,
                multiple: true,
            }
        }
        Route::DescriptiveText => {
            let url = descriptive_image_url(item)?;
            ChatJob {
                system: prompt(prompt_keys::DESCRIPTIVE_TEXT),
                user: UserContent::ImageUrl(url),
                n: 1,
                temperature: VISION_TEMPERATURE,
                max_tokens: Some(DESCRIPTIVE_TEXT_MAX_TOKENS),
                multiple: false,
            }
        }
        other => {
            return Err(QuillError::InvalidParam(format!(
                "Route {} has no completion request",
                other
            )));
        }
    };

    Ok(job)
}

/// Expected output words for a resize of `input_words`.
///
/// Input and output share the provider window, so the input counted here is
/// capped at what fits alongside its own resized output.
fn resize_output_words(endpoint: &Endpoint, input_words: usize, ratio: f64) -> usize {
    let counter = endpoint.counter();
    let window = (endpoint.max_tokens as i64 - PROMPT_RESERVE_TOKENS).max(0) as f64;
    let fitting_words = (window / (counter.tokens_per_word() * (1.0 + ratio))).floor() as usize;
    (input_words.min(fitting_words) as f64 * ratio).ceil() as usize
}

fn descriptive_image_url(item: Option<&ContentItem>) -> Result<String> {
    let attachment = item
        .and_then(|i| i.attachment.as_ref())
        .filter(|a| a.is_image())
        .ok_or_else(|| QuillError::InvalidImage("This attachment can't be processed.".to_string()))?;

    if attachment.metadata.is_none() {
        return Err(QuillError::NoValidMetadata("No valid metadata found.".to_string()));
    }

    attachment.acceptable_image_url().ok_or_else(|| {
        QuillError::InvalidImage(
            "Valid image size not found. Make sure the image is bigger than 512x512px."
                .to_string(),
        )
    })
}

// =============================================================================
// Wire Helpers
// =============================================================================

/// Chat Completions body shared by OpenAI, Azure OpenAI and xAI
pub(crate) fn openai_body(model: Option<&str>, job: &ChatJob) -> Value {
    let user = match &job.user {
        UserContent::Text(_) => json!(job.quoted_text()),
        UserContent::ImageUrl(url) => json!([{
            "type": "image_url",
            "image_url": { "url": url, "detail": "auto" }
        }]),
    };

    let mut body = json!({
        "messages": [
            { "role": "system", "content": job.system },
            { "role": "user", "content": user },
        ],
        "temperature": job.temperature,
        "stream": false,
    });

    if let Some(model) = model.filter(|m| !m.is_empty()) {
        body["model"] = json!(model);
    }
    if job.multiple {
        body["n"] = json!(job.n);
    }
    if let Some(max_tokens) = job.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

pub(crate) fn openai_choices(response: &Value) -> Vec<String> {
    response
        .get("choices")
        .and_then(Value::as_array)
        .map(|choices| {
            choices
                .iter()
                .filter_map(|c| c.pointer("/message/content").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Trim whitespace and surrounding quotes; collapse inner whitespace
pub fn clean_choice(raw: &str) -> String {
    raw.trim_matches(|c: char| c.is_whitespace() || c == '"' || c == '\'')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn finish(job: &ChatJob, choices: Vec<String>, service: &str) -> Result<RouteResult> {
    let mut cleaned: Vec<String> = choices.iter().map(|c| clean_choice(c)).collect();
    if cleaned.is_empty() {
        return Err(QuillError::no_choices(service));
    }

    if job.multiple {
        Ok(RouteResult::Suggestions(cleaned))
    } else {
        Ok(RouteResult::Text(cleaned.swap_remove(0)))
    }
}

// =============================================================================
// Settings and Debug Helpers
// =============================================================================

/// Provider sub-document defaults shared by the text backends
pub(crate) fn text_provider_defaults(feature: FeatureId, extra: &[(&str, Value)]) -> Map<String, Value> {
    let mut doc = Map::new();
    for (key, value) in extra {
        doc.insert(key.to_string(), value.clone());
    }
    doc.insert("authenticated".to_string(), json!(false));
    if feature.has_suggestion_count() {
        doc.insert("number_of_suggestions".to_string(), json!(suggestions::DEFAULT));
    }
    doc
}

/// Copy a clamped `number_of_suggestions` into `out` for features that use it
pub(crate) fn apply_suggestion_count(
    out: &mut Map<String, Value>,
    feature: FeatureId,
    incoming: &Map<String, Value>,
    current: &FeatureSettings,
    id: ProviderId,
) {
    if !feature.has_suggestion_count() {
        return;
    }
    let requested = incoming
        .get("number_of_suggestions")
        .and_then(crate::feature::as_u64)
        .or_else(|| current.provider_u64(id, "number_of_suggestions"));
    out.insert(
        "number_of_suggestions".to_string(),
        json!(clamp_suggestions(requested)),
    );
}

/// Missing-key error raised before any request is made
pub(crate) fn missing_key(service: &str) -> QuillError {
    QuillError::AuthRequired(format!("Please enter your {} API key.", service))
}

/// Verify a key by listing models
pub(crate) async fn verify_by_get(
    ctx: &AppContext,
    feature: FeatureId,
    credentials: Credentials,
    url: &str,
) -> Result<()> {
    ctx.request(credentials, feature)
        .get(url, RequestOptions::new())
        .await
        .map(|_| ())
}

fn prompt_table_value(settings: &FeatureSettings, key: &str) -> String {
    let entries = parse_prompts(settings.get(key));
    serde_json::to_string(&entries).unwrap_or_default()
}

/// Debug rows shared by the text backends
pub(crate) fn text_debug_information(
    ctx: &AppContext,
    id: ProviderId,
    feature: FeatureId,
    settings: &FeatureSettings,
    model: &str,
) -> Vec<(String, String)> {
    let yes_no = |b: bool| if b { "yes" } else { "no" }.to_string();
    let suggestions = || {
        clamp_suggestions(settings.provider_u64(id, "number_of_suggestions")).to_string()
    };
    let latest = |route: Route| diagnostics::formatted_latest(ctx.transients.as_ref(), id, &route);

    let mut rows = vec![
        ("Authenticated".to_string(), yes_no(settings.is_authenticated(id))),
        ("Model".to_string(), model.to_string()),
    ];

    match feature {
        FeatureId::TitleGeneration => {
            rows.push(("No. of titles".to_string(), suggestions()));
            rows.push((
                "Generate title prompt".to_string(),
                prompt_table_value(settings, prompt_keys::TITLE),
            ));
            rows.push(("Latest response".to_string(), latest(Route::Title)));
        }
        FeatureId::ExcerptGeneration => {
            rows.push((
                "Excerpt length".to_string(),
                settings
                    .u64("length")
                    .unwrap_or(excerpt::DEFAULT_LENGTH)
                    .to_string(),
            ));
            rows.push((
                "Generate excerpt prompt".to_string(),
                prompt_table_value(settings, prompt_keys::EXCERPT),
            ));
            rows.push(("Latest response".to_string(), latest(Route::Excerpt)));
        }
        FeatureId::ContentResizing => {
            rows.push(("No. of suggestions".to_string(), suggestions()));
            rows.push((
                "Expand text prompt".to_string(),
                prompt_table_value(settings, prompt_keys::EXPAND),
            ));
            rows.push((
                "Condense text prompt".to_string(),
                prompt_table_value(settings, prompt_keys::CONDENSE),
            ));
            rows.push(("Latest response".to_string(), latest(Route::ResizeContent)));
        }
        FeatureId::DescriptiveTextGenerator => {
            rows.push((
                "Descriptive text prompt".to_string(),
                prompt_table_value(settings, prompt_keys::DESCRIPTIVE_TEXT),
            ));
            rows.push(("Latest response".to_string(), latest(Route::DescriptiveText)));
        }
        _ => {}
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_job(multiple: bool) -> ChatJob {
        ChatJob {
            system: "sys".into(),
            user: UserContent::Text("body".into()),
            n: 3,
            temperature: TEXT_TEMPERATURE,
            max_tokens: None,
            multiple,
        }
    }

    #[test]
    fn test_resize_output_words_leaves_room_for_input() {
        let endpoint = Endpoint {
            max_tokens: 500,
            tokens_per_word: 1.0,
            ..Endpoint::builtin(ProviderId::XaiGrok)
        };

        // Short inputs are sized from their own length
        assert_eq!(resize_output_words(&endpoint, 100, GROW_RATIO), 150);
        assert_eq!(resize_output_words(&endpoint, 100, SHRINK_RATIO), 50);

        // Long inputs are capped so input and output both fit the window
        let grow = resize_output_words(&endpoint, 2000, GROW_RATIO);
        let budget = endpoint.counter().content_budget(endpoint.max_tokens, grow);
        assert!(budget > 0);
        assert!(budget as usize + grow <= 450);

        let tiny = Endpoint {
            max_tokens: 10,
            ..endpoint
        };
        assert_eq!(resize_output_words(&tiny, 2000, GROW_RATIO), 0);
    }

    #[test]
    fn test_clean_choice() {
        assert_eq!(clean_choice("  \"A Great Title\" "), "A Great Title");
        assert_eq!(clean_choice("'Quoted'"), "Quoted");
        assert_eq!(clean_choice("\n\"Line\n break\"\n"), "Line break");
    }

    #[test]
    fn test_openai_body_text() {
        let body = openai_body(Some("grok-2-1212"), &text_job(true));
        assert_eq!(body["model"], "grok-2-1212");
        assert_eq!(body["n"], 3);
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][1]["content"], "\"\"\"body\"\"\"");
        assert!(body.get("max_tokens").is_none());

        let single = openai_body(None, &text_job(false));
        assert!(single.get("n").is_none());
        assert!(single.get("model").is_none());
    }

    #[test]
    fn test_openai_body_vision() {
        let job = ChatJob {
            system: "Describe".into(),
            user: UserContent::ImageUrl("https://cdn.test/a.jpg".into()),
            n: 1,
            temperature: VISION_TEMPERATURE,
            max_tokens: Some(300),
            multiple: false,
        };
        assert!(job.is_vision());
        let body = openai_body(Some("grok-2-vision-1212"), &job);
        assert_eq!(body["messages"][1]["content"][0]["image_url"]["detail"], "auto");
        assert_eq!(body["max_tokens"], 300);
    }

    #[test]
    fn test_finish_shapes() {
        let choices = vec!["\"One\"".to_string(), "Two".to_string()];
        assert_eq!(
            finish(&text_job(true), choices.clone(), "xAI").unwrap(),
            RouteResult::Suggestions(vec!["One".into(), "Two".into()])
        );
        assert_eq!(
            finish(&text_job(false), choices, "xAI").unwrap(),
            RouteResult::Text("One".into())
        );

        let err = finish(&text_job(true), vec![], "xAI").unwrap_err();
        assert_eq!(err.code(), "no_choices");
        assert_eq!(err.to_string(), "No choices were returned from xAI.");
    }

    #[test]
    fn test_openai_choices_skips_missing_content() {
        let response = json!({"choices": [
            {"message": {"content": "a"}},
            {"message": {}},
            {"message": {"content": "b"}}
        ]});
        assert_eq!(openai_choices(&response), vec!["a", "b"]);
        assert!(openai_choices(&json!({"choices": []})).is_empty());
    }
}
