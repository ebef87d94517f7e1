//! CLI Common Utilities
//!
//! Shared initialization and output helpers for CLI commands.

use std::path::Path;

use console::style;
use serde::Serialize;

use crate::config::{Config, ConfigLoader};
use crate::context::{SharedContext, shared_from_config};
use crate::dispatch::FeatureDispatcher;
use crate::feature::FeatureId;
use crate::types::{Actor, ActorDirectory, QuillError, Result};

/// Command execution context
///
/// Loaded configuration plus the application context built from it.
#[derive(Clone)]
pub struct CommandContext {
    pub config: Config,
    pub ctx: SharedContext,
}

impl CommandContext {
    /// Load config (an explicit file replaces the layered lookup) and build
    /// the application context
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        let ctx = shared_from_config(&config)?;
        Ok(Self { config, ctx })
    }

    pub fn dispatcher(&self) -> FeatureDispatcher {
        FeatureDispatcher::new(self.ctx.clone())
    }

    pub fn actors(&self) -> ActorDirectory {
        ActorDirectory::new(self.config.actor_entries())
    }

    /// Actor for a CLI invocation: a configured token, or the local operator
    pub fn actor(&self, token: Option<&str>) -> Actor {
        match token {
            Some(token) => self.actors().resolve(Some(&format!("Bearer {}", token))),
            None => Actor::operator(),
        }
    }
}

/// Parse a feature argument (`feature_title_generation` or `title-generation`)
pub fn parse_feature(value: &str) -> Result<FeatureId> {
    value.parse::<FeatureId>().map_err(|_| {
        let known: Vec<&str> = FeatureId::ALL.iter().map(|f| f.as_str()).collect();
        QuillError::InvalidParam(format!(
            "Unknown feature '{}'. Valid values: {}",
            value,
            known.join(", ")
        ))
    })
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Styled Output
// =============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Aligned key/value rows
    pub fn rows(&self, rows: &[(String, String)]) {
        let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in rows {
            println!("  {:width$}  {}", style(key).dim(), value, width = width);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feature() {
        assert_eq!(parse_feature("title-generation").unwrap(), FeatureId::TitleGeneration);
        assert_eq!(
            parse_feature("feature_term_cleanup").unwrap(),
            FeatureId::TermCleanup
        );
        let err = parse_feature("nope").unwrap_err();
        assert!(err.to_string().contains("feature_classification"));
    }

    #[test]
    fn test_command_context_actor_defaults_to_operator() {
        let mut config = Config::default();
        config.storage.in_memory = true;
        let cmd = CommandContext {
            ctx: shared_from_config(&config).unwrap(),
            config,
        };
        assert_eq!(cmd.actor(None), Actor::operator());
        assert!(cmd.actor(Some("unknown")).is_anonymous());
    }
}
