//! Client Cache CLI
//!
//! Inspect and edit a file-backed client cache from the command line.
//!
//! The durable tier is a JSON document under `--dir`; the volatile tier is
//! an in-memory store that lives for a single invocation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use client_cache::cache::rolling_hash;
use client_cache::{
    CacheValue, ClearScope, ClientCache, CompressionCodec, FileStorage, MemoryStorage,
    StorageOptions, StorageOptionsPatch, StorageType, WriteOutcome,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Client Cache - two-tier key/value cache with change detection
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the durable store
    #[arg(long, env = "CACHE_DIR", default_value = ".client-cache")]
    dir: PathBuf,

    /// YAML file with storage options
    #[arg(long, env = "CACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Key namespace (overrides the config file)
    #[arg(long, env = "CACHE_PREFIX")]
    prefix: Option<String>,

    /// Compress stored values
    #[arg(long, env = "CACHE_COMPRESS")]
    compress: bool,

    /// Compression codec, e.g. lz4, zstd-base64, snappy-base64url
    #[arg(long, env = "CACHE_CODEC")]
    codec: Option<CompressionCodec>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value stored under a key
    Get {
        key: String,
        /// durable, volatile or both
        #[arg(long)]
        tier: Option<StorageType>,
    },
    /// Store a value; JSON input is stored as JSON, anything else as text
    Set {
        key: String,
        value: String,
        #[arg(long)]
        tier: Option<StorageType>,
    },
    /// Delete a key
    Remove {
        key: String,
        #[arg(long)]
        tier: Option<StorageType>,
    },
    /// Clear stored entries
    Clear {
        #[arg(long)]
        tier: Option<StorageType>,
        /// Only delete keys under the configured prefix
        #[arg(long)]
        prefix_only: bool,
    },
    /// Print the change-detection hash of a text
    Hash { text: String },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    init_logging(&args);

    let options = load_options(&args)?;
    let command = match args.command {
        Command::Hash { text } => {
            println!("{}", rolling_hash(&text));
            return Ok(ExitCode::SUCCESS);
        }
        command => command,
    };

    info!(
        version = client_cache::VERSION,
        dir = %args.dir.display(),
        prefix = %options.storage_prefix,
        "Opening client cache"
    );

    let durable = FileStorage::open(&args.dir)
        .with_context(|| format!("failed to open durable store in {}", args.dir.display()))?;
    let volatile = MemoryStorage::named("volatile");
    let cache = ClientCache::with_options(Arc::new(durable), Arc::new(volatile), options)?;

    match command {
        Command::Get { key, tier } => match cache.get(&key, tier)? {
            Some(value) => println!("{value}"),
            None => {
                eprintln!("{key}: not found");
                return Ok(ExitCode::FAILURE);
            }
        },
        Command::Set { key, value, tier } => {
            let value = parse_value(&value);
            debug!(key = %key, kind = value.kind(), "Parsed input value");
            match cache.set(&key, value, tier)?.await? {
                WriteOutcome::Written => println!("written"),
                WriteOutcome::Unchanged => println!("unchanged"),
            }
        }
        Command::Remove { key, tier } => {
            cache.remove(&key, tier)?;
        }
        Command::Clear { tier, prefix_only } => {
            if prefix_only {
                cache.configure(StorageOptionsPatch::new().clear_scope(ClearScope::Prefix))?;
            }
            cache.remove_all(tier)?;
        }
        Command::Hash { .. } => {}
    }

    let stats = cache.stats();
    debug!(
        hits = stats.hits,
        misses = stats.misses,
        writes = stats.writes,
        unchanged = stats.unchanged,
        "Cache statistics"
    );

    Ok(ExitCode::SUCCESS)
}

/// Read options from the config file, then apply command-line overrides
fn load_options(args: &Args) -> Result<StorageOptions> {
    let base = match &args.config {
        Some(path) => StorageOptions::from_yaml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => StorageOptions::default(),
    };

    let mut patch = StorageOptionsPatch::new();
    if let Some(prefix) = &args.prefix {
        patch = patch.storage_prefix(prefix.clone());
    }
    if args.compress {
        patch = patch.use_compression(true);
    }
    if let Some(codec) = args.codec {
        patch = patch.codec(codec);
    }

    let options = base.merged(&patch);
    options.validate()?;
    Ok(options)
}

/// JSON input becomes the matching value; anything else is taken as text
fn parse_value(raw: &str) -> CacheValue {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(CacheValue::from_json)
        .unwrap_or_else(|| CacheValue::from(raw))
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // stdout carries command output
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
