//! Prompt Lists
//!
//! Features keep an ordered list of named prompts. Exactly one entry is the
//! shipped original; at most one entry is the default used at request time.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(
        default,
        deserialize_with = "deserialize_flag",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub original: bool,
    #[serde(
        default,
        deserialize_with = "deserialize_flag",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub default: bool,
}

impl PromptEntry {
    /// The shipped prompt for a feature
    pub fn original(prompt: impl Into<String>) -> Self {
        Self {
            title: "Default".to_string(),
            prompt: prompt.into(),
            original: true,
            default: false,
        }
    }

    pub fn custom(title: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            prompt: prompt.into(),
            original: false,
            default: false,
        }
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }
}

/// Accepts `true`, `1`, `"1"`, `"yes"`; everything else is false
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(crate::feature::truthy(&Value::deserialize(deserializer)?))
}

/// Parse a stored prompt list, skipping malformed entries
pub fn parse_prompts(value: Option<&Value>) -> Vec<PromptEntry> {
    value
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| serde_json::from_value(e.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Prompt text used at request time.
///
/// The flagged default wins, otherwise the first entry. Empty text falls
/// through to `None` so callers can use the feature's built-in prompt.
pub fn default_prompt(entries: &[PromptEntry]) -> Option<&str> {
    entries
        .iter()
        .find(|e| e.default)
        .or_else(|| entries.first())
        .map(|e| e.prompt.as_str())
        .filter(|p| !p.trim().is_empty())
}

/// Clean an incoming prompt list.
///
/// - entries with empty prompt text are dropped unless original
/// - the original entry is restored when missing
/// - only the first default flag survives
/// - with no default flagged, the original becomes default
pub fn sanitize_prompts(incoming: &[PromptEntry], original: &PromptEntry) -> Vec<PromptEntry> {
    let mut out: Vec<PromptEntry> = incoming
        .iter()
        .filter(|e| e.original || !e.prompt.trim().is_empty())
        .map(|e| PromptEntry {
            title: e.title.trim().to_string(),
            prompt: e.prompt.trim().to_string(),
            original: e.original,
            default: e.default,
        })
        .collect();

    match out.iter_mut().find(|e| e.original) {
        Some(existing) if existing.prompt.is_empty() => existing.prompt = original.prompt.clone(),
        Some(_) => {}
        None => out.insert(0, PromptEntry { default: false, ..original.clone() }),
    }

    let mut seen_default = false;
    for entry in &mut out {
        if entry.default {
            if seen_default {
                entry.default = false;
            }
            seen_default = true;
        }
    }

    if !seen_default && let Some(entry) = out.iter_mut().find(|e| e.original) {
        entry.default = true;
    }

    out
}

/// Replace `{{NAME}}` placeholders
pub fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{{{}}}}}", name), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ORIGINAL: &str = "Write an SEO-friendly title.";

    #[test]
    fn test_parse_legacy_flags() {
        let entries = parse_prompts(Some(&json!([
            {"title": "Default", "prompt": ORIGINAL, "original": 1},
            {"title": "Short", "prompt": "Be brief.", "default": "1"},
            "garbage"
        ])));
        assert_eq!(entries.len(), 2);
        assert!(entries[0].original);
        assert!(entries[1].default);
    }

    #[test]
    fn test_default_prompt_selection() {
        let entries = vec![
            PromptEntry::original(ORIGINAL),
            PromptEntry::custom("Short", "Be brief.").as_default(),
        ];
        assert_eq!(default_prompt(&entries), Some("Be brief."));
        assert_eq!(default_prompt(&entries[..1]), Some(ORIGINAL));
        assert_eq!(default_prompt(&[]), None);
    }

    #[test]
    fn test_sanitize_restores_original_and_default() {
        let incoming = vec![
            PromptEntry::custom("Empty", "   "),
            PromptEntry::custom("Kept", "Use puns."),
        ];
        let out = sanitize_prompts(&incoming, &PromptEntry::original(ORIGINAL));

        assert_eq!(out.len(), 2);
        assert!(out[0].original);
        assert!(out[0].default);
        assert_eq!(out[1].prompt, "Use puns.");
        assert!(!out[1].default);
    }

    #[test]
    fn test_sanitize_single_default() {
        let incoming = vec![
            PromptEntry::original(ORIGINAL),
            PromptEntry::custom("A", "a").as_default(),
            PromptEntry::custom("B", "b").as_default(),
        ];
        let out = sanitize_prompts(&incoming, &PromptEntry::original(ORIGINAL));
        assert_eq!(out.iter().filter(|e| e.default).count(), 1);
        assert!(out[1].default);
        assert!(!out[0].default);
    }

    #[test]
    fn test_substitute() {
        let out = substitute(
            "Summarize in {{WORDS}} words for {{TITLE}}.",
            &[("WORDS", "55"), ("TITLE", "Rust")],
        );
        assert_eq!(out, "Summarize in 55 words for Rust.");
    }
}
