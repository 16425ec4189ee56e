//! Administrative CLI for Vellum.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vellum_core::config::{AppConfig, EngineConfig};
use vellum_kv::{KeyRange, KvRegistry};

#[derive(Parser)]
#[command(name = "vellum")]
#[command(about = "Administrative CLI for the Vellum key-value store")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "VELLUM_CONFIG",
        default_value = "config/vellum.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Key-value store commands
    Kv {
        /// Database name
        #[arg(long)]
        db: String,
        #[command(subcommand)]
        command: KvCommands,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum KvCommands {
    /// Print the value stored at a key as JSON
    Get { key: String },
    /// Store a value (parsed as JSON, otherwise stored as a string)
    Set { key: String, value: String },
    /// Remove a key
    Del { key: String },
    /// List keys in ascending order
    Keys {
        /// Only keys starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
        /// Strip the prefix from the listed keys
        #[arg(long, default_value_t = false, requires = "prefix")]
        strip: bool,
        /// Maximum number of keys
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Remove every key of the database
    Clear,
    /// Delete the database
    Destroy,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Load, validate and print the effective configuration
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays parseable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(Path::new(&cli.config))?;

    match cli.command {
        Commands::Kv { db, command } => handle_kv_command(&config, &db, command).await,
        Commands::Config { command } => handle_config_command(&config, command),
    }
}

/// Defaults, then the optional config file, then `VELLUM_` environment variables.
fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
    if path.exists() {
        tracing::debug!(config_path = %path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path.display());
    }
    extract_config(figment.merge(Env::prefixed("VELLUM_").ignore(&["config"]).split("__")))
}

fn extract_config(figment: Figment) -> Result<AppConfig> {
    let config: AppConfig = figment
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

/// Parse a command-line value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

async fn handle_kv_command(config: &AppConfig, db: &str, command: KvCommands) -> Result<()> {
    let registry = vellum_kv::from_config(&config.kv)
        .await
        .context("failed to initialize key-value store")?;
    let result = run_kv_command(&registry, db, command).await;

    registry.close_all();
    registry.engine().wait_for_release(db).await;
    result
}

async fn run_kv_command(registry: &KvRegistry, db: &str, command: KvCommands) -> Result<()> {
    let handle = registry
        .open(db)
        .await
        .with_context(|| format!("failed to open database {db}"))?;

    match command {
        KvCommands::Get { key } => {
            let value: serde_json::Value = handle
                .get(&key)
                .await?
                .with_context(|| format!("key not found: {key}"))?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        KvCommands::Set { key, value } => {
            handle.set(&key, &parse_value(&value)).await?;
            println!("Stored {key}");
        }
        KvCommands::Del { key } => {
            handle.del(&key).await?;
            println!("Removed {key}");
        }
        KvCommands::Keys {
            prefix,
            strip,
            limit,
        } => {
            let keys = match prefix.as_deref() {
                Some(prefix) if strip => handle.keys_with_prefix(prefix, limit).await?,
                Some(prefix) => handle.keys(&KeyRange::prefix(prefix), limit).await?,
                None => handle.keys(&KeyRange::all(), limit).await?,
            };
            for key in keys {
                println!("{key}");
            }
        }
        KvCommands::Clear => {
            handle.clear().await?;
            println!("Cleared {db}");
        }
        KvCommands::Destroy => {
            handle.destroy().await?;
            println!("Destroyed {db}");
        }
    }
    Ok(())
}

fn handle_config_command(config: &AppConfig, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Check => {
            match &config.kv.engine {
                EngineConfig::Memory => println!("Engine:           memory"),
                EngineConfig::Sqlite { path } => {
                    println!("Engine:           sqlite ({})", path.display())
                }
            }
            println!("Schema version:   {}", config.kv.schema_version);
            match config.gc.unavailable_reason() {
                None => println!("Chunk GC:         available"),
                Some(reason) => println!("Chunk GC:         unavailable ({reason})"),
            }
            println!();
            println!("{}", serde_json::to_string_pretty(config)?);
        }
    }
    Ok(())
}
