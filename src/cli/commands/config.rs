//! Config Command
//!
//! Manage quillmind configuration.
//!
//! Usage:
//!   quillmind config show [-g] [-f json|yaml]
//!   quillmind config path
//!   quillmind config init [-g] [--force]

use crate::cli::util::Output;
use crate::config::ConfigLoader;
use crate::types::Result;

/// Show the effective configuration, or the raw global file with `global`
pub fn show(global: bool, format: &str) -> Result<()> {
    if global {
        match ConfigLoader::global_config_path() {
            Some(path) if path.exists() => {
                println!("# Global Config: {}\n", path.display());
                println!("{}", std::fs::read_to_string(&path)?);
            }
            Some(_) => {
                println!("No global config found.");
                println!("Run 'quillmind config init --global' to create one.");
            }
            None => println!("Cannot determine global config directory."),
        }
        return Ok(());
    }

    let config = ConfigLoader::load()?;
    println!("{}", ConfigLoader::render(&config, format)?);
    Ok(())
}

/// Show configuration paths and whether each exists
pub fn path() -> Result<()> {
    let exists = |p: &std::path::Path| if p.exists() { "" } else { " (not found)" };

    match ConfigLoader::global_config_path() {
        Some(global) => println!("Global:   {}{}", global.display(), exists(&global)),
        None => println!("Global:   (unavailable)"),
    }
    let project = ConfigLoader::project_config_path();
    println!("Project:  {}{}", project.display(), exists(&project));
    let db = ConfigLoader::default_database_path();
    println!("Database: {}{}", db.display(), exists(&db));
    Ok(())
}

pub fn init(global: bool, force: bool) -> Result<()> {
    let path = ConfigLoader::init(global, force)?;
    Output::new().success(&format!(
        "Initialized {} configuration",
        if global { "global" } else { "project" }
    ));
    println!("  Config: {}", path.display());
    Ok(())
}
