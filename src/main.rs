mod auth;
mod compact;
mod config;
mod error;
mod filters;
mod gmail;
mod labels;
mod models;
mod service;
mod sync;

use crate::config::Config;
use crate::filters::{RuleSet, Subset};
use crate::gmail::GmailClient;
use crate::labels::{LabelDirectory, LabelPolicy};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gmf", version)]
#[command(about = "Keep Gmail filters in sync with a YAML file", long_about = None)]
struct Cli {
    /// Do not make any changes in Gmail
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,

    /// Path to the settings file
    #[arg(short, long, default_value = "settings.toml", global = true)]
    config: PathBuf,

    /// Forget the stored OAuth token and exit
    #[arg(long)]
    reset_token: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print custom filters, then filters managed by gmf, as YAML
    Download,

    /// Replace the filters managed by gmf with the ones in a YAML file
    Apply {
        /// The YAML file with filters to apply
        #[arg(short, long)]
        filters: Option<PathBuf>,
    },

    /// Check a YAML file without contacting Gmail
    Validate {
        /// The YAML file with filters to check
        #[arg(short, long)]
        filters: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    let config = Config::load(&cli.config);

    // Handle token reset
    if cli.reset_token {
        auth::RingStorage.clear_token().await?;
        println!("Token cleared. Run again without --reset-token to re-authenticate.");
        return Ok(());
    }

    let Some(command) = cli.command else {
        bail!("No command given, see --help");
    };

    match command {
        Commands::Validate { filters } => {
            let path = filters.unwrap_or_else(|| config.filters_file.clone());
            validate(&path)
        }
        Commands::Download => {
            let client = connect(&config).await?;
            let policy = LabelPolicy {
                auto_create: false,
                dry_run: true,
            };
            let labels = LabelDirectory::load(&client, policy).await?;
            let current = RuleSet::load_remote(&client).await?;
            download(&current, &labels)
        }
        Commands::Apply { filters } => {
            let path = filters.unwrap_or_else(|| config.filters_file.clone());
            // Validate the whole file before touching Gmail.
            let desired = read_rules(&path)?;

            let client = connect(&config).await?;
            let policy = LabelPolicy {
                auto_create: config.auto_create_labels,
                dry_run: cli.dry_run,
            };
            let mut labels = LabelDirectory::load(&client, policy).await?;
            let mut current = RuleSet::load_remote(&client).await?;
            info!(
                "Applying {} filters from {} ({} managed, {} custom in Gmail)",
                desired.len(),
                path.display(),
                current.managed().count(),
                current.custom().count()
            );

            let report =
                sync::reconcile(&mut current, desired, &mut labels, &client, cli.dry_run).await?;
            println!("{}", report.summary());
            Ok(())
        }
    }
}

fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn connect(config: &Config) -> Result<GmailClient> {
    let secret = auth::Authenticator::load_secret(&config.client_secret).await?;
    let authenticator = auth::Authenticator::authenticate(secret).await?;

    GmailClient::connect(authenticator, config.user_id.clone())
}

fn read_rules(path: &Path) -> Result<RuleSet> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    RuleSet::from_yaml(&text).with_context(|| format!("Invalid filters in {}", path.display()))
}

fn download(current: &RuleSet, labels: &LabelDirectory) -> Result<()> {
    println!("# Custom filters:");
    println!();
    print!("{}", current.export(Subset::Custom, labels)?);
    println!();
    println!();
    println!("# Known filters:");
    println!();
    print!("{}", current.export(Subset::Managed, labels)?);
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let rules = compact::parse_document(&text)
        .with_context(|| format!("Invalid filters in {}", path.display()))?;
    info!("{} filters in {} are valid", rules.len(), path.display());

    let records = rules
        .iter()
        .map(compact::CompactRule::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    if !records.is_empty() {
        print!("{}", serde_yaml::to_string(&Value::Sequence(records))?);
    }
    Ok(())
}
