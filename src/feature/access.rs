//! Access Control
//!
//! Decides whether an actor may use a feature. Evaluated in a fixed order:
//!
//! 1. anonymous actors never have access
//! 2. with `role_based_access` off, access is granted
//! 3. with it on, access requires a role listed in `roles`
//! 4. an explicit entry in `users` overrides the role result
//! 5. with `user_based_opt_out` on, the actor's opt-out removes access
//!
//! The decision is derived on every call and never stored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::settings::{FeatureSettings, as_u64};
use crate::types::Actor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserAccess {
    Allow,
    Deny,
}

/// Explicit per-user override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOverride {
    pub user_id: u64,
    pub access: UserAccess,
}

impl UserOverride {
    /// Legacy entries are bare user IDs and mean allow
    fn parse(value: &Value) -> Option<Self> {
        if let Some(user_id) = as_u64(value) {
            return Some(Self {
                user_id,
                access: UserAccess::Allow,
            });
        }
        serde_json::from_value(value.clone()).ok()
    }
}

pub fn user_overrides(settings: &FeatureSettings) -> Vec<UserOverride> {
    settings
        .get("users")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(UserOverride::parse).collect())
        .unwrap_or_default()
}

pub fn has_access(actor: &Actor, settings: &FeatureSettings) -> bool {
    if actor.is_anonymous() {
        return false;
    }

    let mut granted = if settings.flag("role_based_access") {
        settings
            .string_list("roles")
            .iter()
            .any(|role| actor.has_role(role))
    } else {
        true
    };

    if let Some(entry) = user_overrides(settings)
        .into_iter()
        .find(|o| o.user_id == actor.user_id)
    {
        granted = entry.access == UserAccess::Allow;
    }

    if granted
        && settings.flag("user_based_opt_out")
        && actor.has_opted_out(settings.feature().as_str())
    {
        granted = false;
    }

    granted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureId;
    use serde_json::{Map, json};

    fn settings(doc: Value) -> FeatureSettings {
        let map: Map<String, Value> = doc.as_object().cloned().unwrap_or_default();
        FeatureSettings::new(FeatureId::TitleGeneration, map)
    }

    #[test]
    fn test_anonymous_denied() {
        let s = settings(json!({ "role_based_access": false }));
        assert!(!has_access(&Actor::anonymous(), &s));
    }

    #[test]
    fn test_role_gate() {
        let s = settings(json!({ "role_based_access": true, "roles": ["editor"] }));
        assert!(has_access(&Actor::new(2, ["editor"]), &s));
        assert!(!has_access(&Actor::new(3, ["author"]), &s));
    }

    #[test]
    fn test_role_gate_off_grants() {
        let s = settings(json!({ "role_based_access": "no", "roles": [] }));
        assert!(has_access(&Actor::new(3, ["subscriber"]), &s));
    }

    #[test]
    fn test_explicit_grant_beats_empty_roles() {
        let s = settings(json!({
            "role_based_access": true,
            "roles": [],
            "users": [{ "user_id": 7, "access": "allow" }],
        }));
        assert!(has_access(&Actor::new(7, ["subscriber"]), &s));
        assert!(!has_access(&Actor::new(8, ["subscriber"]), &s));
    }

    #[test]
    fn test_legacy_user_entry_allows() {
        let s = settings(json!({ "role_based_access": true, "roles": [], "users": [7, "9"] }));
        assert!(has_access(&Actor::new(7, Vec::<String>::new()), &s));
        assert!(has_access(&Actor::new(9, Vec::<String>::new()), &s));
    }

    #[test]
    fn test_explicit_deny_beats_role() {
        let s = settings(json!({
            "role_based_access": true,
            "roles": ["editor"],
            "users": [{ "user_id": 2, "access": "deny" }],
        }));
        assert!(!has_access(&Actor::new(2, ["editor"]), &s));
    }

    #[test]
    fn test_opt_out_beats_explicit_grant() {
        let s = settings(json!({
            "role_based_access": true,
            "roles": [],
            "users": [{ "user_id": 7, "access": "allow" }],
            "user_based_opt_out": true,
        }));
        let actor = Actor::new(7, ["editor"]).with_opt_out("feature_title_generation");
        assert!(!has_access(&actor, &s));

        let off = settings(json!({
            "role_based_access": false,
            "user_based_opt_out": false,
        }));
        assert!(has_access(&actor, &off));
    }
}
