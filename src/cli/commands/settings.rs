//! Settings Command
//!
//! Inspect and change feature settings as the local operator.
//!
//! Usage:
//!   quillmind settings show [feature] [-f json]
//!   quillmind settings save <feature> <json|@file> [--onboarding]
//!   quillmind settings reset <feature>
//!   quillmind settings migrate [feature]

use serde_json::{Map, Value};

use crate::cli::util::{CommandContext, Output, parse_feature, print_json};
use crate::dispatch::SettingsPayload;
use crate::feature::FeatureId;
use crate::types::{Actor, QuillError, Result, ResultExt};

pub fn show(cmd: &CommandContext, feature: Option<&str>, format: &str) -> Result<()> {
    let features = match feature {
        Some(f) => vec![parse_feature(f)?],
        None => FeatureId::ALL.to_vec(),
    };

    if format == "json" {
        let mut all = Map::new();
        for id in &features {
            all.insert(
                id.as_str().to_string(),
                cmd.ctx.feature(*id).get_settings()?.into_value(),
            );
        }
        return print_json(&all);
    }

    let out = Output::new();
    for id in features {
        let feature = cmd.ctx.feature(id);
        let state = feature.state(&Actor::operator())?;
        out.section(&format!("{} ({})", id.label(), id));
        let mut rows = vec![("State".to_string(), format!("{:?}", state))];
        rows.extend(feature.debug_information()?);
        out.rows(&rows);
    }
    Ok(())
}

/// Save one feature document. `source` is inline JSON or `@path`.
pub async fn save(cmd: &CommandContext, feature: &str, source: &str, onboarding: bool) -> Result<()> {
    let feature = parse_feature(feature)?;
    let raw = match source.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context_fn(|| format!("Reading {}", path))?,
        None => source.to_string(),
    };
    let doc: Value = serde_json::from_str(&raw)?;
    if !doc.is_object() {
        return Err(QuillError::InvalidParam(
            "Settings must be a JSON object".to_string(),
        ));
    }

    let mut settings = Map::new();
    settings.insert(feature.as_str().to_string(), doc);
    let payload = SettingsPayload {
        settings,
        is_setup: onboarding.then_some(Value::Bool(true)),
        step: onboarding.then(|| "enable_features".to_string()),
    };

    let response = cmd
        .dispatcher()
        .save_settings(&Actor::operator(), &payload)
        .await?;

    let out = Output::new();
    for error in &response.errors {
        out.warning(&format!("{}: {}", error.code, error.message));
    }
    out.success(&format!("Saved {}", feature.label()));
    Ok(())
}

pub fn reset(cmd: &CommandContext, feature: &str) -> Result<()> {
    let feature = parse_feature(feature)?;
    cmd.ctx.feature(feature).reset_settings()?;
    Output::new().success(&format!("Reset {} to defaults", feature.label()));
    Ok(())
}

pub fn migrate(cmd: &CommandContext, feature: Option<&str>) -> Result<()> {
    let features = match feature {
        Some(f) => vec![parse_feature(f)?],
        None => FeatureId::ALL.to_vec(),
    };

    let out = Output::new();
    for id in features {
        if cmd.ctx.feature(id).migrate_settings()? {
            out.success(&format!("Migrated {}", id.label()));
        } else {
            out.info(&format!("{}: nothing to migrate", id.label()));
        }
    }
    Ok(())
}
