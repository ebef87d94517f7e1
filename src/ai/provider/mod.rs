//! Provider Abstraction
//!
//! A Provider is one upstream AI backend that can serve a subset of
//! Features. Every provider exposes the same four operations:
//!
//! - `default_settings`: per-feature provider sub-document defaults
//! - `sanitize_settings`: clean incoming settings and re-verify credentials
//! - `rest_endpoint_callback`: execute a named route for a target
//! - `debug_information`: key/value diagnostics table
//!
//! ## Modules
//!
//! - `chat`: shared route flow for chat-completion style backends
//! - one module per backend

mod azure;
mod chat;
mod chrome;
mod dalle;
mod embeddings;
mod gemini;
mod grok;
mod openai;
mod watson;

pub use azure::AzureOpenAiProvider;
pub use chat::{ChatJob, UserContent, clean_choice, get_content};
pub use chrome::ChromeAiProvider;
pub use dalle::DallEProvider;
pub use embeddings::EmbeddingsProvider;
pub use gemini::GeminiProvider;
pub use grok::GrokProvider;
pub use openai::OpenAiProvider;
pub use watson::WatsonNluProvider;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ai::tokenizer::TokenCounter;
use crate::context::AppContext;
use crate::feature::{FeatureId, FeatureSettings};
use crate::types::{Actor, QuillError, Result, SettingsError};

// =============================================================================
// Provider Identity
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    OpenaiChatgpt,
    AzureOpenai,
    GoogleaiGeminiApi,
    XaiGrok,
    ChromeAi,
    IbmWatsonNlu,
    OpenaiDalle,
    OpenaiEmbeddings,
}

impl ProviderId {
    pub const ALL: [ProviderId; 8] = [
        Self::OpenaiChatgpt,
        Self::AzureOpenai,
        Self::GoogleaiGeminiApi,
        Self::XaiGrok,
        Self::ChromeAi,
        Self::IbmWatsonNlu,
        Self::OpenaiDalle,
        Self::OpenaiEmbeddings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenaiChatgpt => "openai_chatgpt",
            Self::AzureOpenai => "azure_openai",
            Self::GoogleaiGeminiApi => "googleai_gemini_api",
            Self::XaiGrok => "xai_grok",
            Self::ChromeAi => "chrome_ai",
            Self::IbmWatsonNlu => "ibm_watson_nlu",
            Self::OpenaiDalle => "openai_dalle",
            Self::OpenaiEmbeddings => "openai_embeddings",
        }
    }

    /// Name shown in settings and debug tables
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OpenaiChatgpt => "OpenAI ChatGPT",
            Self::AzureOpenai => "Azure OpenAI",
            Self::GoogleaiGeminiApi => "Google AI (Gemini API)",
            Self::XaiGrok => "xAI Grok",
            Self::ChromeAi => "Chrome AI (experimental)",
            Self::IbmWatsonNlu => "IBM Watson NLU",
            Self::OpenaiDalle => "OpenAI DALL·E",
            Self::OpenaiEmbeddings => "OpenAI Embeddings",
        }
    }

    /// Vendor name used inside user-facing error messages
    pub fn service_name(&self) -> &'static str {
        match self {
            Self::OpenaiChatgpt | Self::OpenaiDalle | Self::OpenaiEmbeddings => "OpenAI",
            Self::AzureOpenai => "Azure OpenAI",
            Self::GoogleaiGeminiApi => "Google AI",
            Self::XaiGrok => "xAI",
            Self::ChromeAi => "Chrome AI",
            Self::IbmWatsonNlu => "IBM Watson",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| QuillError::InvalidParam(format!("Unknown provider: {}", s)))
    }
}

// =============================================================================
// Routes
// =============================================================================

/// Named operation a provider executes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Title,
    Excerpt,
    ResizeContent,
    DescriptiveText,
    Classify,
    GenerateImage,
    TermCleanup,
    /// Routes a provider does not know resolve to an empty result
    Unknown(String),
}

impl Route {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "title" => Self::Title,
            "excerpt" => Self::Excerpt,
            "resize_content" => Self::ResizeContent,
            "descriptive_text" => Self::DescriptiveText,
            "classify" => Self::Classify,
            "generate_image" | "image" => Self::GenerateImage,
            "term_cleanup" => Self::TermCleanup,
            _ => Self::Unknown(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Title => "title",
            Self::Excerpt => "excerpt",
            Self::ResizeContent => "resize_content",
            Self::DescriptiveText => "descriptive_text",
            Self::Classify => "classify",
            Self::GenerateImage => "generate_image",
            Self::TermCleanup => "term_cleanup",
            Self::Unknown(name) => name,
        }
    }

    /// Slug used in diagnostics cache keys
    pub fn diagnostics_slug(&self) -> &str {
        match self {
            Self::Title => "title_generation",
            Self::Excerpt => "excerpt_generation",
            Self::ResizeContent => "content_resizing",
            Self::DescriptiveText => "descriptive_text",
            Self::GenerateImage => "image_generation",
            Self::Classify => "classify",
            Self::TermCleanup => "term_cleanup",
            Self::Unknown(name) => name,
        }
    }

    /// Sentence-case label used in "... is disabled" messages
    pub fn label(&self) -> &str {
        match self {
            Self::Title => "Title generation",
            Self::Excerpt => "Excerpt generation",
            Self::ResizeContent => "Content resizing",
            Self::DescriptiveText => "Descriptive text generation",
            Self::Classify => "Classification",
            Self::GenerateImage => "Image generation",
            Self::TermCleanup => "Term cleanup",
            Self::Unknown(name) => name,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a route runs against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A stored content item
    Item(u64),
    /// Free text supplied in `RouteArgs::content`
    Text,
    /// Image prompt
    Prompt(String),
    /// Every term of one taxonomy
    Taxonomy(String),
}

impl Target {
    pub fn item_id(&self) -> Option<u64> {
        match self {
            Self::Item(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteArgs {
    /// Number of suggestions requested
    #[serde(default, alias = "n")]
    pub num: Option<u32>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// `grow` or `shrink`
    #[serde(default)]
    pub resize_type: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

impl RouteArgs {
    pub fn content(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// One full route invocation
#[derive(Debug, Clone)]
pub struct RouteCall<'a> {
    pub feature: FeatureId,
    pub actor: &'a Actor,
    pub target: Target,
    pub route: Route,
    pub args: RouteArgs,
}

// =============================================================================
// Route Results
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedImage {
    pub url: String,
}

/// Request a browser-side model runs instead of the server
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrowserPayload {
    pub prompt: String,
    pub content: String,
    pub func: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarTerm {
    pub term_id: u64,
    pub name: String,
    pub similar_term_id: u64,
    pub similar_name: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RouteResult {
    Text(String),
    Suggestions(Vec<String>),
    Terms {
        terms: BTreeMap<String, Vec<u64>>,
    },
    Images(Vec<GeneratedImage>),
    Browser(BrowserPayload),
    SimilarTerms(Vec<SimilarTerm>),
    /// Serializes as `null`
    Empty,
}

impl RouteResult {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

// =============================================================================
// Endpoint Configuration
// =============================================================================

/// Upstream location and budget for one provider; overridable per config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub vision_model: Option<String>,
    pub max_tokens: usize,
    pub tokens_per_word: f64,
}

impl Endpoint {
    pub fn builtin(id: ProviderId) -> Self {
        let (url, auth_url, model, vision_model, max_tokens, tokens_per_word) = match id {
            ProviderId::OpenaiChatgpt => (
                "https://api.openai.com/v1/chat/completions",
                Some("https://api.openai.com/v1/models"),
                Some("gpt-4o-mini"),
                Some("gpt-4o"),
                16385,
                1.25,
            ),
            // URL is assembled from the endpoint and deployment settings
            ProviderId::AzureOpenai => ("", None, None, None, 16385, 1.25),
            ProviderId::GoogleaiGeminiApi => (
                "https://generativelanguage.googleapis.com/v1beta/models",
                Some("https://generativelanguage.googleapis.com/v1beta/models"),
                Some("gemini-2.0-flash"),
                None,
                30720,
                1.4,
            ),
            ProviderId::XaiGrok => (
                "https://api.x.ai/v1/chat/completions",
                Some("https://api.x.ai/v1/models"),
                Some("grok-2-1212"),
                Some("grok-2-vision-1212"),
                131072,
                1.3,
            ),
            ProviderId::ChromeAi => ("", None, None, None, 6144, 1.25),
            // URL comes from the endpoint_url setting; max_tokens counts characters
            ProviderId::IbmWatsonNlu => ("", None, None, None, 50_000, 1.25),
            ProviderId::OpenaiDalle => (
                "https://api.openai.com/v1/images/generations",
                Some("https://api.openai.com/v1/models"),
                Some("dall-e-3"),
                None,
                4000,
                1.25,
            ),
            ProviderId::OpenaiEmbeddings => (
                "https://api.openai.com/v1/embeddings",
                Some("https://api.openai.com/v1/models"),
                Some("text-embedding-3-small"),
                None,
                8191,
                1.25,
            ),
        };

        Self {
            url: url.to_string(),
            auth_url: auth_url.map(str::to_string),
            model: model.map(str::to_string),
            vision_model: vision_model.map(str::to_string),
            max_tokens,
            tokens_per_word,
        }
    }

    pub fn counter(&self) -> TokenCounter {
        TokenCounter::new(self.tokens_per_word)
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("")
    }

    pub fn vision_model(&self) -> &str {
        self.vision_model.as_deref().unwrap_or_else(|| self.model())
    }
}

// =============================================================================
// Provider Trait
// =============================================================================

#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Provider sub-document defaults for one feature
    fn default_settings(&self, feature: FeatureId) -> Map<String, Value>;

    /// Clean the incoming provider sub-document and re-verify credentials.
    ///
    /// `incoming` and `current` are full feature documents. Credential
    /// failures are pushed onto `errors`; the returned sub-document is always
    /// usable and carries `authenticated = false` when verification failed.
    async fn sanitize_settings(
        &self,
        ctx: &AppContext,
        feature: FeatureId,
        incoming: &Map<String, Value>,
        current: &FeatureSettings,
        errors: &mut Vec<SettingsError>,
    ) -> Map<String, Value>;

    async fn rest_endpoint_callback(
        &self,
        ctx: &AppContext,
        call: &RouteCall<'_>,
    ) -> Result<RouteResult>;

    fn debug_information(
        &self,
        ctx: &AppContext,
        feature: FeatureId,
        settings: &FeatureSettings,
    ) -> Vec<(String, String)>;
}

pub type SharedProvider = Arc<dyn Provider>;

/// Create the provider implementation for an ID
pub fn create_provider(id: ProviderId) -> SharedProvider {
    match id {
        ProviderId::OpenaiChatgpt => Arc::new(OpenAiProvider),
        ProviderId::AzureOpenai => Arc::new(AzureOpenAiProvider),
        ProviderId::GoogleaiGeminiApi => Arc::new(GeminiProvider),
        ProviderId::XaiGrok => Arc::new(GrokProvider),
        ProviderId::ChromeAi => Arc::new(ChromeAiProvider),
        ProviderId::IbmWatsonNlu => Arc::new(WatsonNluProvider),
        ProviderId::OpenaiDalle => Arc::new(DallEProvider),
        ProviderId::OpenaiEmbeddings => Arc::new(EmbeddingsProvider),
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Provider sub-document of an incoming feature document
pub(crate) fn incoming_doc(incoming: &Map<String, Value>, id: ProviderId) -> Map<String, Value> {
    incoming
        .get(id.as_str())
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Incoming string, falling back to the stored value
pub(crate) fn pick_str(
    incoming: &Map<String, Value>,
    current: &FeatureSettings,
    id: ProviderId,
    key: &str,
) -> String {
    match incoming.get(key).and_then(Value::as_str) {
        Some(value) => value.trim().to_string(),
        None => current.provider_str(id, key).to_string(),
    }
}

/// Fold a verification outcome into `authenticated`.
///
/// Rate limiting proves the credentials were accepted, so HTTP 429 still
/// counts as authenticated. Every failure is reported as a settings error.
pub(crate) fn auth_outcome(
    id: ProviderId,
    outcome: Result<()>,
    errors: &mut Vec<SettingsError>,
) -> bool {
    match outcome {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(provider = %id, error = %err, "Credential verification failed");
            errors.push(SettingsError::from_auth_failure(&err));
            matches!(err, QuillError::Upstream { code: 429, .. })
        }
    }
}

/// Clamp a suggestion count into the accepted range
pub(crate) fn clamp_suggestions(value: Option<u64>) -> u32 {
    use crate::constants::suggestions::{DEFAULT, MAX, MIN};
    value
        .map(|v| (v.min(MAX as u64) as u32).max(MIN))
        .unwrap_or(DEFAULT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_roundtrip() {
        for id in ProviderId::ALL {
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
            assert_eq!(serde_json::to_value(id).unwrap(), id.as_str());
        }
        assert!("openai".parse::<ProviderId>().is_err());
    }

    #[test]
    fn test_route_parse() {
        assert_eq!(Route::parse("Title"), Route::Title);
        assert_eq!(Route::parse("resize-content"), Route::ResizeContent);
        assert_eq!(Route::parse("bogus"), Route::Unknown("bogus".into()));
        assert_eq!(Route::Title.diagnostics_slug(), "title_generation");
        assert_eq!(Route::ResizeContent.diagnostics_slug(), "content_resizing");
    }

    #[test]
    fn test_route_result_serialization() {
        let suggestions = RouteResult::Suggestions(vec!["A".into(), "B".into()]);
        assert_eq!(serde_json::to_string(&suggestions).unwrap(), r#"["A","B"]"#);

        let mut terms = BTreeMap::new();
        terms.insert("category".to_string(), vec![3, 4]);
        let value = serde_json::to_value(RouteResult::Terms { terms }).unwrap();
        assert_eq!(value["terms"]["category"][1], 4);

        assert_eq!(serde_json::to_string(&RouteResult::Empty).unwrap(), "null");
    }

    #[test]
    fn test_auth_outcome_rate_limit_counts_as_authenticated() {
        let mut errors = Vec::new();
        assert!(auth_outcome(
            ProviderId::XaiGrok,
            Err(QuillError::upstream(429, "Slow down")),
            &mut errors
        ));
        assert!(!auth_outcome(
            ProviderId::XaiGrok,
            Err(QuillError::upstream(401, "bad key")),
            &mut errors
        ));
        assert!(auth_outcome(ProviderId::XaiGrok, Ok(()), &mut errors));

        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.code == "classifai-auth"));
    }

    #[test]
    fn test_clamp_suggestions() {
        assert_eq!(clamp_suggestions(None), 1);
        assert_eq!(clamp_suggestions(Some(0)), 1);
        assert_eq!(clamp_suggestions(Some(3)), 3);
        assert_eq!(clamp_suggestions(Some(50)), 10);
    }

    #[test]
    fn test_endpoint_builtin() {
        let grok = Endpoint::builtin(ProviderId::XaiGrok);
        assert_eq!(grok.max_tokens, 131072);
        assert_eq!(grok.model(), "grok-2-1212");
        assert_eq!(grok.vision_model(), "grok-2-vision-1212");

        let gemini = Endpoint::builtin(ProviderId::GoogleaiGeminiApi);
        assert_eq!(gemini.vision_model(), "gemini-2.0-flash");
    }
}
