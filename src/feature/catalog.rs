//! Feature Catalog
//!
//! The closed set of features, the providers each one supports (first entry
//! is the fallback) and the feature-level default keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::ai::prompt::PromptEntry;
use crate::ai::provider::ProviderId;
use crate::constants::{excerpt, settings, term_cleanup};
use crate::types::{QuillError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureId {
    #[serde(rename = "feature_title_generation")]
    TitleGeneration,
    #[serde(rename = "feature_excerpt_generation")]
    ExcerptGeneration,
    #[serde(rename = "feature_content_resizing")]
    ContentResizing,
    #[serde(rename = "feature_descriptive_text_generator")]
    DescriptiveTextGenerator,
    #[serde(rename = "feature_classification")]
    Classification,
    #[serde(rename = "feature_image_generation")]
    ImageGeneration,
    #[serde(rename = "feature_term_cleanup")]
    TermCleanup,
}

impl FeatureId {
    pub const ALL: [FeatureId; 7] = [
        Self::TitleGeneration,
        Self::ExcerptGeneration,
        Self::ContentResizing,
        Self::DescriptiveTextGenerator,
        Self::Classification,
        Self::ImageGeneration,
        Self::TermCleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TitleGeneration => "feature_title_generation",
            Self::ExcerptGeneration => "feature_excerpt_generation",
            Self::ContentResizing => "feature_content_resizing",
            Self::DescriptiveTextGenerator => "feature_descriptive_text_generator",
            Self::Classification => "feature_classification",
            Self::ImageGeneration => "feature_image_generation",
            Self::TermCleanup => "feature_term_cleanup",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::TitleGeneration => "Title Generation",
            Self::ExcerptGeneration => "Excerpt Generation",
            Self::ContentResizing => "Content Resizing",
            Self::DescriptiveTextGenerator => "Descriptive Text Generator",
            Self::Classification => "Classification",
            Self::ImageGeneration => "Image Generation",
            Self::TermCleanup => "Term Cleanup",
        }
    }

    /// Supported providers in display order; the first is the fallback
    pub fn supported_providers(&self) -> &'static [ProviderId] {
        use ProviderId::*;
        match self {
            Self::TitleGeneration | Self::ExcerptGeneration | Self::ContentResizing => &[
                OpenaiChatgpt,
                AzureOpenai,
                GoogleaiGeminiApi,
                XaiGrok,
                ChromeAi,
            ],
            Self::DescriptiveTextGenerator => &[OpenaiChatgpt, XaiGrok],
            Self::Classification => &[IbmWatsonNlu],
            Self::ImageGeneration => &[OpenaiDalle],
            Self::TermCleanup => &[OpenaiEmbeddings],
        }
    }

    pub fn supports(&self, provider: ProviderId) -> bool {
        self.supported_providers().contains(&provider)
    }

    /// Features whose providers expose `number_of_suggestions`
    pub fn has_suggestion_count(&self) -> bool {
        matches!(self, Self::TitleGeneration | Self::ContentResizing)
    }

    /// Settings repository key of the feature document
    pub fn option_name(&self) -> String {
        format!(
            "{}{}",
            settings::OPTION_PREFIX,
            self.as_str().trim_start_matches("feature_")
        )
    }

    /// Feature-specific defaults layered under the common access keys
    pub(crate) fn specific_defaults(&self) -> Map<String, Value> {
        let prompt_list = |key: &str| {
            let original = prompt_keys::default_text(key).unwrap_or_default();
            json!([PromptEntry::original(original)])
        };

        let mut doc = Map::new();
        match self {
            Self::TitleGeneration => {
                doc.insert(prompt_keys::TITLE.into(), prompt_list(prompt_keys::TITLE));
            }
            Self::ExcerptGeneration => {
                doc.insert(prompt_keys::EXCERPT.into(), prompt_list(prompt_keys::EXCERPT));
                doc.insert("length".into(), json!(excerpt::DEFAULT_LENGTH));
            }
            Self::ContentResizing => {
                doc.insert(prompt_keys::CONDENSE.into(), prompt_list(prompt_keys::CONDENSE));
                doc.insert(prompt_keys::EXPAND.into(), prompt_list(prompt_keys::EXPAND));
            }
            Self::DescriptiveTextGenerator => {
                doc.insert(
                    prompt_keys::DESCRIPTIVE_TEXT.into(),
                    prompt_list(prompt_keys::DESCRIPTIVE_TEXT),
                );
            }
            Self::Classification => {
                doc.insert("post_types".into(), json!(["post"]));
                doc.insert("post_statuses".into(), json!(["publish"]));
            }
            Self::ImageGeneration => {}
            Self::TermCleanup => {
                doc.insert("taxonomies".into(), json!({ "category": true, "post_tag": false }));
                doc.insert("threshold".into(), json!(term_cleanup::DEFAULT_THRESHOLD));
            }
        }
        doc
    }

    /// Prompt-list keys owned by the feature
    pub(crate) fn prompt_keys(&self) -> &'static [&'static str] {
        match self {
            Self::TitleGeneration => &[prompt_keys::TITLE],
            Self::ExcerptGeneration => &[prompt_keys::EXCERPT],
            Self::ContentResizing => &[prompt_keys::CONDENSE, prompt_keys::EXPAND],
            Self::DescriptiveTextGenerator => &[prompt_keys::DESCRIPTIVE_TEXT],
            _ => &[],
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureId {
    type Err = QuillError;

    /// Accepts the full ID or the short form without `feature_`
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == wanted || id.as_str().trim_start_matches("feature_") == wanted)
            .ok_or_else(|| QuillError::InvalidParam(format!("Unknown feature: {}", s)))
    }
}

// =============================================================================
// Prompt Keys
// =============================================================================

pub mod prompt_keys {
    pub const TITLE: &str = "generate_title_prompt";
    pub const EXCERPT: &str = "generate_excerpt_prompt";
    pub const EXPAND: &str = "expand_text_prompt";
    pub const CONDENSE: &str = "condense_text_prompt";
    pub const DESCRIPTIVE_TEXT: &str = "descriptive_text_prompt";

    /// Shipped prompt text for a prompt key
    pub fn default_text(key: &str) -> Option<&'static str> {
        match key {
            TITLE => Some(
                "Write an SEO-friendly title for the following content that will encourage readers to clickthrough, staying within a range of 40 to 60 characters.",
            ),
            EXCERPT => Some(
                "Summarize the following message using a maximum of {{WORDS}} words. Ensure this summary pairs well with the following text: {{TITLE}}.",
            ),
            EXPAND => Some(
                "You are an assistant that helps edit text. Increase the length of the provided text while keeping its meaning and tone.",
            ),
            CONDENSE => Some(
                "You are an assistant that helps edit text. Decrease the length of the provided text while keeping its meaning and tone.",
            ),
            DESCRIPTIVE_TEXT => Some(
                "You are an assistant that generates descriptions of images for use as alt text. Describe the image in one short, factual sentence.",
            ),
            _ => None,
        }
    }
}

// =============================================================================
// Legacy Layouts
// =============================================================================

/// Where a feature's settings lived before they were nested by provider
#[derive(Debug, Clone, Copy)]
pub struct LegacyLayout {
    /// Repository key of the flat legacy document
    pub option_key: &'static str,
    pub provider: ProviderId,
    /// Flat enable flag, mapped onto `status`
    pub enable_key: &'static str,
    /// Prefix of the `<prefix>_roles`, `<prefix>_users` and
    /// `<prefix>_user_based_opt_out` keys
    pub access_prefix: &'static str,
    /// Legacy key → provider sub-document key
    pub provider_keys: &'static [(&'static str, &'static str)],
    /// Legacy key → feature-level key
    pub feature_keys: &'static [(&'static str, &'static str)],
    /// Nested legacy objects whose keys are lifted before mapping
    pub lifted: &'static [&'static str],
}

const CHATGPT_KEYS: &[(&str, &str)] = &[("api_key", "api_key"), ("authenticated", "authenticated")];

impl FeatureId {
    pub fn legacy_layout(&self) -> Option<LegacyLayout> {
        let layout = match self {
            Self::TitleGeneration => LegacyLayout {
                option_key: "classifai_openai_chatgpt",
                provider: ProviderId::OpenaiChatgpt,
                enable_key: "enable_titles",
                access_prefix: "title_generation",
                provider_keys: &[
                    ("api_key", "api_key"),
                    ("authenticated", "authenticated"),
                    ("number_titles", "number_of_suggestions"),
                ],
                feature_keys: &[],
                lifted: &[],
            },
            Self::ExcerptGeneration => LegacyLayout {
                option_key: "classifai_openai_chatgpt",
                provider: ProviderId::OpenaiChatgpt,
                enable_key: "enable_excerpt",
                access_prefix: "excerpt_generation",
                provider_keys: CHATGPT_KEYS,
                feature_keys: &[],
                lifted: &[],
            },
            Self::ContentResizing => LegacyLayout {
                option_key: "classifai_openai_chatgpt",
                provider: ProviderId::OpenaiChatgpt,
                enable_key: "enable_resize_content",
                access_prefix: "resize_content",
                provider_keys: &[
                    ("api_key", "api_key"),
                    ("authenticated", "authenticated"),
                    ("number_resize_content", "number_of_suggestions"),
                ],
                feature_keys: &[
                    ("shrink_text_prompt", "condense_text_prompt"),
                    ("grow_text_prompt", "expand_text_prompt"),
                ],
                lifted: &[],
            },
            Self::Classification => LegacyLayout {
                option_key: "classifai_watson_nlu",
                provider: ProviderId::IbmWatsonNlu,
                enable_key: "enable_content_classification",
                access_prefix: "content_classification",
                provider_keys: &[
                    ("watson_url", "endpoint_url"),
                    ("watson_username", "username"),
                    ("watson_password", "password"),
                    ("authenticated", "authenticated"),
                    ("category", "category"),
                    ("category_threshold", "category_threshold"),
                    ("category_taxonomy", "category_taxonomy"),
                    ("keyword", "keyword"),
                    ("keyword_threshold", "keyword_threshold"),
                    ("keyword_taxonomy", "keyword_taxonomy"),
                    ("concept", "concept"),
                    ("concept_threshold", "concept_threshold"),
                    ("concept_taxonomy", "concept_taxonomy"),
                    ("entity", "entity"),
                    ("entity_threshold", "entity_threshold"),
                    ("entity_taxonomy", "entity_taxonomy"),
                ],
                feature_keys: &[],
                lifted: &["credentials", "features"],
            },
            Self::ImageGeneration => LegacyLayout {
                option_key: "classifai_openai_dalle",
                provider: ProviderId::OpenaiDalle,
                enable_key: "enable_image_gen",
                access_prefix: "image_generation",
                provider_keys: &[
                    ("api_key", "api_key"),
                    ("authenticated", "authenticated"),
                    ("number", "number"),
                    ("size", "size"),
                ],
                feature_keys: &[],
                lifted: &[],
            },
            Self::DescriptiveTextGenerator | Self::TermCleanup => return None,
        };
        Some(layout)
    }
}
