mod status;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use showcase_actions::{ActionRegistry, Context, ShowcaseApi};
use showcase_config::{AppConfig, ConfigLoader};
use showcase_db::ShowcaseStore;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "showcase",
    version,
    about = "Showcase - curated collections of portal datasets"
)]
struct Cli {
    /// Config file (yml, yaml or toml). Defaults to ~/.config/showcase/config.*
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Portal database, overriding the config file
    #[arg(long, global = true, env = "SHOWCASE_DATABASE")]
    database: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "showcase_db=trace". RUST_LOG wins when set.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the showcase tables and print what changed
    Init {
        /// Also install the portal tables (package, user, group) when missing
        #[arg(long)]
        portal: bool,
    },
    /// Show showcase tables, applied migrations and row counts
    Status,
    /// List the available actions
    Actions,
    /// Call an action with a JSON data dict
    Call {
        /// Action name, e.g. ckanext_showcase_list
        action: String,

        /// JSON object passed to the action
        #[arg(short, long, default_value = "{}")]
        data: String,

        /// Act as this user (name or id)
        #[arg(short, long, conflicts_with = "site")]
        user: Option<String>,

        /// Skip authorization, as the site itself
        #[arg(long)]
        site: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    init_tracing(level, cli.json_logs || config.log.json);

    match cli.command {
        Commands::Init { portal } => {
            let store = open_store(&config)?;
            let report = if portal {
                store
                    .install_portal_schema()
                    .context("failed to install portal schema")?
            } else {
                store.opening_report().clone()
            };
            if !report.changed() {
                info!("showcase tables already up to date");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Status => {
            let store = open_store(&config)?;
            status::print_status(&config.database.resolved_path(), &store)?;
        }
        Commands::Actions => {
            for line in action_lines(&ActionRegistry::with_defaults()) {
                println!("{line}");
            }
        }
        Commands::Call {
            action,
            data,
            user,
            site,
        } => {
            let data: Value =
                serde_json::from_str(&data).context("--data must be a JSON object")?;
            let context = match (site, user) {
                (true, _) => Context::site(),
                (false, Some(user)) => Context::user(user),
                (false, None) => Context::anonymous(),
            };

            let api = ShowcaseApi::new(Arc::new(open_store(&config)?), config.portal.clone());
            let result = api
                .call(&context, &action, data)
                .with_context(|| format!("{action} failed"))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ConfigLoader::default_dir().load()?,
    };
    if let Some(database) = &cli.database {
        config.database.path = Some(database.clone());
    }
    Ok(config)
}

fn action_lines(registry: &ActionRegistry) -> Vec<String> {
    registry
        .iter()
        .map(|action| format!("{:<46} {}", action.name(), action.description()))
        .collect()
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_store(config: &AppConfig) -> Result<ShowcaseStore> {
    let path = config.database.resolved_path();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
            debug!("created {}", parent.display());
        }
    }

    let timeout = Duration::from_millis(config.database.busy_timeout_ms);
    ShowcaseStore::open_with_timeout(&path, timeout)
        .with_context(|| format!("failed to open {}", path.display()))
}
