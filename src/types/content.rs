//! Content Items and Terms
//!
//! Minimal views of the host platform's posts, attachments and taxonomy terms.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::image;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_post_type")]
    pub post_type: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_true")]
    pub show_in_rest: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, Value>,
}

fn default_post_type() -> String {
    "post".to_string()
}

fn default_status() -> String {
    "publish".to_string()
}

fn default_true() -> bool {
    true
}

impl ContentItem {
    pub fn new(id: u64, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            content: content.into(),
            post_type: default_post_type(),
            status: default_status(),
            show_in_rest: true,
            attachment: None,
            meta: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_post_type(mut self, post_type: impl Into<String>) -> Self {
        self.post_type = post_type.into();
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.post_type = "attachment".to_string();
        self.attachment = Some(attachment);
        self
    }
}

// =============================================================================
// Attachments
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub mime_type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ImageMeta>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Pick an image URL whose dimensions fall inside the accepted window.
    ///
    /// Without a size table the full-size URL is used as-is. With one, the
    /// full-size image wins when it fits, otherwise the largest fitting
    /// intermediate size.
    pub fn acceptable_image_url(&self) -> Option<String> {
        let meta = self.metadata.as_ref()?;

        if meta.sizes.is_empty() {
            return (!self.url.is_empty()).then(|| self.url.clone());
        }

        if fits_window(meta.width, meta.height) && !self.url.is_empty() {
            return Some(self.url.clone());
        }

        meta.sizes
            .values()
            .filter(|s| fits_window(s.width, s.height) && !s.url.is_empty())
            .max_by_key(|s| u64::from(s.width) * u64::from(s.height))
            .map(|s| s.url.clone())
    }
}

fn fits_window(width: u32, height: u32) -> bool {
    let range = image::MIN_EDGE..=image::MAX_EDGE;
    range.contains(&width) && range.contains(&height)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMeta {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub sizes: BTreeMap<String, ImageSize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSize {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

// =============================================================================
// Terms
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: u64,
    pub taxonomy: String,
    pub name: String,
    #[serde(default)]
    pub parent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(url: &str, w: u32, h: u32) -> ImageSize {
        ImageSize {
            url: url.to_string(),
            width: w,
            height: h,
        }
    }

    fn attachment(width: u32, height: u32, sizes: Vec<(&str, ImageSize)>) -> Attachment {
        Attachment {
            mime_type: "image/jpeg".to_string(),
            url: "https://cdn.test/full.jpg".to_string(),
            metadata: Some(ImageMeta {
                width,
                height,
                sizes: sizes.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            }),
        }
    }

    #[test]
    fn test_full_size_within_window() {
        let a = attachment(1200, 800, vec![("thumb", size("https://cdn.test/t.jpg", 150, 150))]);
        assert_eq!(a.acceptable_image_url().as_deref(), Some("https://cdn.test/full.jpg"));
    }

    #[test]
    fn test_largest_fitting_size() {
        let a = attachment(
            4000,
            3000,
            vec![
                ("medium", size("https://cdn.test/m.jpg", 600, 600)),
                ("large", size("https://cdn.test/l.jpg", 1600, 1200)),
                ("thumb", size("https://cdn.test/t.jpg", 150, 150)),
            ],
        );
        assert_eq!(a.acceptable_image_url().as_deref(), Some("https://cdn.test/l.jpg"));
    }

    #[test]
    fn test_no_size_fits() {
        let a = attachment(300, 300, vec![("thumb", size("https://cdn.test/t.jpg", 150, 150))]);
        assert_eq!(a.acceptable_image_url(), None);
    }

    #[test]
    fn test_missing_metadata() {
        let mut a = attachment(800, 800, vec![]);
        a.metadata = None;
        assert_eq!(a.acceptable_image_url(), None);
    }

    #[test]
    fn test_content_item_defaults_from_json() {
        let item: ContentItem = serde_json::from_str(r#"{"id": 3, "title": "Hello"}"#).unwrap();
        assert_eq!(item.post_type, "post");
        assert_eq!(item.status, "publish");
        assert!(item.show_in_rest);
    }
}
