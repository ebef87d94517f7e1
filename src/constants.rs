//! Global Constants
//!
//! Centralized constants for request shaping and defaults.
//! All magic numbers should be defined here with documentation.

/// HTTP/Network constants
pub mod network {
    /// Default timeout for upstream POST requests (seconds)
    pub const DEFAULT_POST_TIMEOUT_SECS: u64 = 60;

    /// Default timeout for upstream GET requests (seconds)
    pub const DEFAULT_GET_TIMEOUT_SECS: u64 = 30;

    /// User agent sent with every upstream request
    pub const USER_AGENT: &str = concat!("quillmind/", env!("CARGO_PKG_VERSION"));
}

/// Token budget constants
pub mod budget {
    /// Tokens reserved for the prompt wrapper in every content window
    pub const PROMPT_RESERVE_TOKENS: i64 = 50;

    /// Characters per token for the character-based estimate
    pub const CHARS_PER_TOKEN: usize = 4;

    /// Expected words per generated title
    pub const WORDS_PER_TITLE: usize = 15;

    /// Expected output length of an expanded text, relative to its input
    pub const GROW_RATIO: f64 = 1.5;

    /// Expected output length of a condensed text, relative to its input
    pub const SHRINK_RATIO: f64 = 0.5;
}

/// Suggestion count limits
pub mod suggestions {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 10;
    pub const DEFAULT: u32 = 1;
}

/// Excerpt length limits (words)
pub mod excerpt {
    pub const DEFAULT_LENGTH: u64 = 55;
    pub const MIN_LENGTH: u64 = 1;
    pub const MAX_LENGTH: u64 = 300;
}

/// Image constants
pub mod image {
    /// Smallest accepted edge for vision requests (px)
    pub const MIN_EDGE: u32 = 512;

    /// Largest accepted edge for vision requests (px)
    pub const MAX_EDGE: u32 = 2000;

    /// Completion budget for descriptive text
    pub const DESCRIPTIVE_TEXT_MAX_TOKENS: u32 = 300;

    pub const DEFAULT_SIZE: &str = "1024x1024";
    pub const SIZES: &[&str] = &["256x256", "512x512", "1024x1024", "1792x1024", "1024x1792"];
    pub const QUALITIES: &[&str] = &["standard", "hd"];
    pub const STYLES: &[&str] = &["vivid", "natural"];
    pub const FORMATS: &[&str] = &["url", "b64_json"];
}

/// Diagnostics cache constants
pub mod diagnostics {
    /// Key prefix for every cached latest response
    pub const NAMESPACE: &str = "quillmind";

    /// Latest responses expire after 30 days
    pub const LATEST_RESPONSE_TTL_SECS: u64 = 30 * 24 * 60 * 60;
}

/// Settings persistence constants
pub mod settings {
    /// Option key prefix for feature settings documents
    pub const OPTION_PREFIX: &str = "quillmind_";

    /// Post meta key holding the last classification failure
    pub const CLASSIFICATION_ERROR_META: &str = "_classifai_error";
}

/// IBM Watson NLU constants
pub mod watson {
    pub const API_VERSION: &str = "2022-08-10";

    /// Maximum characters sent per analyze call
    pub const MAX_CHARS: usize = 50_000;

    pub const DEFAULT_THRESHOLD: u64 = 70;

    pub const CATEGORY_TAXONOMY: &str = "category";
    pub const KEYWORD_TAXONOMY: &str = "post_tag";
    pub const CONCEPT_TAXONOMY: &str = "watson-concept";
    pub const ENTITY_TAXONOMY: &str = "watson-entity";
}

/// Term cleanup constants
pub mod term_cleanup {
    /// Similarity percentage above which two terms are reported
    pub const DEFAULT_THRESHOLD: u64 = 75;
}

/// HTTP server constants
pub mod server {
    pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
    pub const DEFAULT_NAMESPACE: &str = "quillmind/v1";
}
