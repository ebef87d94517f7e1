//! Acting User
//!
//! The identity on whose behalf a route or settings call runs. Capabilities
//! are opaque strings answered by the hosting platform; this crate only asks
//! "does the current actor have capability X".

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Capability names checked by the dispatcher
pub mod caps {
    pub const EDIT_POSTS: &str = "edit_posts";
    pub const UPLOAD_FILES: &str = "upload_files";
    pub const MANAGE_OPTIONS: &str = "manage_options";
    pub const MANAGE_TERMS: &str = "manage_categories";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// `0` means anonymous
    #[serde(default)]
    pub user_id: u64,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Feature IDs this user opted out of
    #[serde(default)]
    pub opted_out: BTreeSet<String>,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(user_id: u64, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            user_id,
            roles: roles.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Local operator used by the CLI: administrator with every capability
    pub fn operator() -> Self {
        Self::new(1, ["administrator"]).with_capabilities([
            caps::EDIT_POSTS,
            caps::UPLOAD_FILES,
            caps::MANAGE_OPTIONS,
            caps::MANAGE_TERMS,
        ])
    }

    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.capabilities.extend(caps.into_iter().map(Into::into));
        self
    }

    pub fn with_opt_out(mut self, feature_id: impl Into<String>) -> Self {
        self.opted_out.insert(feature_id.into());
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id == 0
    }

    pub fn can(&self, capability: &str) -> bool {
        !self.is_anonymous() && self.capabilities.contains(capability)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_opted_out(&self, feature_id: &str) -> bool {
        self.opted_out.contains(feature_id)
    }
}

// =============================================================================
// Actor Directory
// =============================================================================

/// Static bearer-token lookup used by the HTTP surface
#[derive(Debug, Clone, Default)]
pub struct ActorDirectory {
    by_token: HashMap<String, Actor>,
}

impl ActorDirectory {
    pub fn new(entries: impl IntoIterator<Item = (String, Actor)>) -> Self {
        Self {
            by_token: entries.into_iter().collect(),
        }
    }

    /// Resolve an `Authorization` header value. Unknown or missing tokens
    /// resolve to the anonymous actor.
    pub fn resolve(&self, authorization: Option<&str>) -> Actor {
        authorization
            .and_then(|h| {
                h.strip_prefix("Bearer ")
                    .or_else(|| h.strip_prefix("bearer "))
            })
            .map(str::trim)
            .and_then(|token| self.by_token.get(token))
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_has_no_capabilities() {
        let actor = Actor::anonymous().with_capabilities([caps::EDIT_POSTS]);
        assert!(actor.is_anonymous());
        assert!(!actor.can(caps::EDIT_POSTS));
    }

    #[test]
    fn test_operator_capabilities() {
        let actor = Actor::operator();
        assert!(actor.can(caps::MANAGE_OPTIONS));
        assert!(actor.has_role("administrator"));
    }

    #[test]
    fn test_directory_resolve() {
        let editor = Actor::new(7, ["editor"]);
        let dir = ActorDirectory::new([("secret-token".to_string(), editor.clone())]);

        assert_eq!(dir.resolve(Some("Bearer secret-token")), editor);
        assert!(dir.resolve(Some("Bearer wrong")).is_anonymous());
        assert!(dir.resolve(None).is_anonymous());
        assert!(dir.resolve(Some("secret-token")).is_anonymous());
    }
}
