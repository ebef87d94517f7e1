//! Core domain types shared across the crate.

pub mod actor;
pub mod content;
pub mod error;

pub use actor::{Actor, ActorDirectory, caps};
pub use content::{Attachment, ContentItem, ImageMeta, ImageSize, Term};
pub use error::{ErrorData, ErrorEnvelope, QuillError, Result, ResultExt, SettingsError};
