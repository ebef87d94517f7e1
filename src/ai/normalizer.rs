//! Content Normalization
//!
//! Turns rich post markup into plain prompt text: render filters run first,
//! then shortcode wrappers are unwrapped, script/style blocks and tags are
//! dropped, common entities decoded and whitespace collapsed.

use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};

/// Innermost `[tag attrs]inner[/tag]` pair; the inner text holds no brackets
static SHORTCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([\w-]+)[^\[\]]*\]([^\[\]]*)\[/([\w-]+)\]").expect("valid shortcode regex")
});
static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>")
        .expect("valid script regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Pure text transform applied before normalization
pub type RenderFilter = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Clone, Default)]
pub struct ContentNormalizer {
    filters: Vec<RenderFilter>,
}

impl std::fmt::Debug for ContentNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentNormalizer")
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl ContentNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a render filter; filters run in insertion order
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Run the render filters over raw stored content
    pub fn render(&self, raw: &str) -> String {
        self.filters
            .iter()
            .fold(raw.to_string(), |acc, filter| filter(&acc))
    }

    /// Replace `[tag]inner[/tag]` with its inner text, innermost pairs first.
    /// Pairs whose closing tag does not match are left as written.
    pub fn strip_shortcodes(&self, content: &str) -> String {
        let mut current = content.to_string();
        loop {
            let next = SHORTCODE_RE
                .replace_all(&current, |caps: &Captures<'_>| {
                    if caps[1] == caps[3] {
                        caps[2].to_string()
                    } else {
                        caps[0].to_string()
                    }
                })
                .into_owned();
            if next == current {
                return next;
            }
            current = next;
        }
    }

    /// Normalized body prefixed with the item title
    pub fn normalize(&self, title: &str, raw_content: &str) -> String {
        let body = self.normalize_content(raw_content);
        let title = clean_text(title);

        if title.is_empty() {
            body
        } else if body.is_empty() {
            title
        } else {
            format!("{}.\n\n{}", title.trim_end_matches('.'), body)
        }
    }

    /// Normalized body without a title
    pub fn normalize_content(&self, raw_content: &str) -> String {
        clean_text(&self.strip_shortcodes(raw_content))
    }
}

fn clean_text(markup: &str) -> String {
    let without_blocks = SCRIPT_STYLE_RE.replace_all(markup, " ");
    let without_tags = TAG_RE.replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE_RE.replace_all(&decoded, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#39;", "'")
        .replace("&#8217;", "\u{2019}")
        .replace("&hellip;", "\u{2026}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
