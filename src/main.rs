use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quillmind::cli::CommandContext;
use quillmind::cli::commands::{self, generate::GenerateOptions};

#[derive(Parser)]
#[command(name = "quillmind")]
#[command(version, about = "AI features for content: titles, excerpts, tags, images and more")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use this config file instead of the global/project lookup
    #[arg(long, short, env = "QUILLMIND_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long, help = "Bind address (default: server.bind)")]
        bind: Option<String>,
    },

    /// Run a route through the dispatcher
    Generate {
        #[arg(help = "Route: title, excerpt, resize-content, descriptive-text, classify, image, term-cleanup")]
        route: String,
        #[arg(long, help = "Feature ID (default: the route's feature)")]
        feature: Option<String>,
        #[arg(long, help = "Content item ID")]
        id: Option<u64>,
        #[arg(long, help = "Free text to run against instead of a stored item")]
        content: Option<String>,
        #[arg(long, help = "Title used by excerpt generation")]
        title: Option<String>,
        #[arg(long, help = "Image prompt")]
        prompt: Option<String>,
        #[arg(long, help = "Taxonomy for term cleanup")]
        taxonomy: Option<String>,
        #[arg(short = 'n', long, help = "Number of suggestions")]
        num: Option<u32>,
        #[arg(long, help = "grow or shrink")]
        resize_type: Option<String>,
        #[arg(long, help = "Image size, e.g. 1024x1024")]
        size: Option<String>,
        #[arg(long, help = "Image quality: standard, hd")]
        quality: Option<String>,
        #[arg(long, help = "Image style: vivid, natural")]
        style: Option<String>,
        #[arg(long, help = "Act as the actor configured for this token")]
        token: Option<String>,
        #[arg(long, help = "Print the raw JSON result")]
        json: bool,
    },

    /// Inspect and change feature settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show merged settings and state
    Show {
        feature: Option<String>,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json"
        )]
        format: String,
    },
    /// Save a feature's settings document
    Save {
        feature: String,
        #[arg(help = "JSON document, or @path to read it from a file")]
        settings: String,
        #[arg(long, help = "Only toggle status, skip credential checks")]
        onboarding: bool,
    },
    /// Delete a feature's persisted settings
    Reset { feature: String },
    /// Convert legacy flat settings to the nested shape
    Migrate { feature: Option<String> },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'g', long, help = "Show global config file only")]
        global: bool,
        #[arg(
            short = 'f',
            long,
            default_value = "text",
            help = "Output format: text, json, yaml"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

fn main() -> ExitCode {
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", console::style("Error:").red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Config commands work without building the application context
    if let Commands::Config { action } = &cli.command {
        match action {
            ConfigAction::Show { global, format } => commands::config::show(*global, format)?,
            ConfigAction::Path => commands::config::path()?,
            ConfigAction::Init { global, force } => commands::config::init(*global, *force)?,
        }
        return Ok(());
    }

    let cmd = CommandContext::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::serve::run(&cmd, bind))?;
        }
        Commands::Generate {
            route,
            feature,
            id,
            content,
            title,
            prompt,
            taxonomy,
            num,
            resize_type,
            size,
            quality,
            style,
            token,
            json,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::generate::run(
                &cmd,
                GenerateOptions {
                    route,
                    feature,
                    id,
                    content,
                    title,
                    prompt,
                    taxonomy,
                    num,
                    resize_type,
                    size,
                    quality,
                    style,
                    token,
                    json,
                },
            ))?;
        }
        Commands::Settings { action } => match action {
            SettingsAction::Show { feature, format } => {
                commands::settings::show(&cmd, feature.as_deref(), &format)?;
            }
            SettingsAction::Save {
                feature,
                settings,
                onboarding,
            } => {
                let rt = Runtime::new()?;
                rt.block_on(commands::settings::save(&cmd, &feature, &settings, onboarding))?;
            }
            SettingsAction::Reset { feature } => {
                commands::settings::reset(&cmd, &feature)?;
            }
            SettingsAction::Migrate { feature } => {
                commands::settings::migrate(&cmd, feature.as_deref())?;
            }
        },
        Commands::Config { .. } => {}
    }

    Ok(())
}
