//! soss: encrypted sync of local files with an S3-compatible bucket
//!
//! Commands:
//!   upload <paths...>    - encrypt and upload files or directory trees
//!   download <keys...>   - download and decrypt objects under keys/prefixes
//!   list                 - list object keys under a prefix
//!   secret               - generate the local passphrase file
//!   version              - print version information

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use soss_core::config::{default_config_path, expand_tilde, SossConfig};
use soss_core::{SossError, SossResult, TransferReport};
use soss_secrets::{default_secret_path, Secret};
use soss_storage::{Credentials, RemoteStore};
use soss_transfer::{DownloadRequest, Orchestrator, ProgressFn, TransferOptions, UploadRequest};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "soss",
    version,
    about = "SOSS: Secure Object Storage Sync",
    long_about = "soss: encrypt files locally and sync them with an S3-compatible bucket"
)]
struct Cli {
    /// Path to the configuration file (YAML, or TOML with a .toml extension)
    #[arg(long, short = 'c', env = "SOSS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// S3 endpoint URL (overrides storage.endpoint)
    #[arg(long, short = 'e', global = true)]
    endpoint: Option<String>,

    /// Bucket name (overrides storage.bucket)
    #[arg(long, short = 'b', global = true)]
    bucket: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "SOSS_LOG", global = true)]
    log: Option<String>,

    /// Log format (json, text)
    #[arg(long, env = "SOSS_LOG_FORMAT", global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt and upload files or directory trees
    ///
    /// Credentials are read from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY
    /// (or SOSS_ACCESS_KEY_ID and SOSS_SECRET_ACCESS_KEY, or the legacy
    /// OSS_ACCESS_KEY_ID and OSS_ACCESS_KEY_SECRET).
    #[command(visible_aliases = ["up", "u"])]
    Upload {
        /// Local files and directories
        targets: Vec<PathBuf>,
        #[command(flatten)]
        key: KeyArgs,
        /// Prefix added to every object key
        #[arg(long, short = 'p', default_value = "")]
        prefix: String,
        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// Download and decrypt objects under keys or key prefixes
    #[command(visible_aliases = ["down", "d"])]
    Download {
        /// Object keys or key prefixes
        targets: Vec<String>,
        #[command(flatten)]
        key: KeyArgs,
        /// Directory objects are written under, as <output_dir>/<key>
        #[arg(
            long = "output_dir",
            short = 'o',
            alias = "output-dir",
            default_value = "./download"
        )]
        output_dir: PathBuf,
        #[command(flatten)]
        transfer: TransferArgs,
    },

    /// List object keys under a prefix
    #[command(visible_aliases = ["ls", "l"])]
    List {
        /// Key prefix to list (default: whole bucket)
        #[arg(long, short = 'p', default_value = "")]
        prefix: String,
    },

    /// Generate a random passphrase and store it in the secret file
    #[command(visible_alias = "sec")]
    Secret {
        /// Replace an existing secret file (the old one is kept as a backup)
        #[arg(long, short = 'f')]
        force: bool,
        /// Secret file location (default: secret.path or ~/.soss/.secret)
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Show version information
    #[command(visible_alias = "v")]
    Version,
}

#[derive(clap::Args, Debug)]
struct KeyArgs {
    /// Passphrase used to encrypt (upload) or decrypt (download)
    #[arg(
        long = "encrypt_key",
        short = 'k',
        visible_alias = "decrypt_key",
        alias = "key",
        conflicts_with = "use_secret"
    )]
    key: Option<String>,
    /// Read the passphrase from the secret file instead of -k
    #[arg(long, short = 's')]
    use_secret: bool,
}

#[derive(clap::Args, Debug)]
struct TransferArgs {
    /// Compress content before encryption (must match between upload and download)
    #[arg(long, short = 'z')]
    compress: bool,
    /// Show a progress bar
    #[arg(long)]
    progress: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_deref()
        .map(expand_tilde)
        .unwrap_or_else(default_config_path);
    let loaded = SossConfig::load(&config_path);

    let (level, format) = log_settings(&cli, &loaded);
    init_logging(&level, format);

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => fail(e.into()),
    };

    if let Some(endpoint) = cli.endpoint {
        config.storage.endpoint = endpoint;
    }
    if let Some(bucket) = cli.bucket {
        config.storage.bucket = bucket;
    }

    let result = match cli.command {
        Commands::Upload {
            targets,
            key,
            prefix,
            transfer,
        } => cmd_upload(&config, targets, &key, prefix, &transfer).await,
        Commands::Download {
            targets,
            key,
            output_dir,
            transfer,
        } => cmd_download(&config, targets, &key, output_dir, &transfer).await,
        Commands::List { prefix } => cmd_list(&config, &prefix).await,
        Commands::Secret { force, path } => cmd_secret(&config, force, path.as_deref()).await,
        Commands::Version => {
            cmd_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        fail(e);
    }
}

/// Log a fatal error once and exit nonzero.
fn fail(e: anyhow::Error) -> ! {
    tracing::error!("{e:#}");
    std::process::exit(1);
}

/// Log level and format: CLI flags win over the config file. A config that
/// failed to load contributes defaults so its error can still be logged.
fn log_settings(cli: &Cli, loaded: &SossResult<SossConfig>) -> (String, LogFormat) {
    let log = loaded
        .as_ref()
        .map(|config| config.log.clone())
        .unwrap_or_default();
    let level = cli.log.clone().unwrap_or(log.level);
    let format = cli.log_format.unwrap_or(if log.format == "json" {
        LogFormat::Json
    } else {
        LogFormat::Text
    });
    (level, format)
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Shared setup ──────────────────────────────────────────────────────────────

/// Connect to the configured bucket and verify it answers before any transfer.
async fn connect(config: &SossConfig) -> Result<RemoteStore> {
    let creds = Credentials::from_env()?;
    let store = RemoteStore::connect(&config.storage, &creds)?;
    store.check_health().await.with_context(|| {
        format!(
            "bucket {} at {} is not reachable",
            config.storage.bucket, config.storage.endpoint
        )
    })?;
    info!(
        endpoint = %config.storage.endpoint,
        bucket = %config.storage.bucket,
        "storage reachable"
    );
    Ok(store)
}

fn secret_path(config: &SossConfig, override_path: Option<&Path>) -> PathBuf {
    override_path
        .map(expand_tilde)
        .or_else(|| config.secret.path.as_deref().map(expand_tilde))
        .unwrap_or_else(default_secret_path)
}

async fn resolve_passphrase(config: &SossConfig, key: &KeyArgs) -> Result<SecretString> {
    if key.use_secret {
        let path = secret_path(config, None);
        let secret = Secret::load(&path)
            .await
            .with_context(|| format!("loading passphrase from {}", path.display()))?;
        return Ok(secret.into_key());
    }
    match &key.key {
        Some(k) => Ok(SecretString::from(k.clone())),
        None => anyhow::bail!("a passphrase is required: pass -k <key> or --use-secret"),
    }
}

fn build_orchestrator(
    config: &SossConfig,
    store: RemoteStore,
    transfer: &TransferArgs,
    label: &str,
) -> (Orchestrator, Option<ProgressBar>) {
    let mut options = TransferOptions::from(&config.transfer);
    options.compress |= transfer.compress;

    let mut orch = Orchestrator::new(store, options);
    let pb = transfer.progress.then(|| make_progress_bar(0, label));
    if let Some(pb) = &pb {
        let pb_clone = pb.clone();
        let progress: ProgressFn = Arc::new(move |done, total, msg| {
            pb_clone.set_length(total);
            pb_clone.set_position(done);
            pb_clone.set_message(msg.to_string());
        });
        orch = orch.with_progress(progress);
    }

    // Ctrl-C stops dispatching; in-flight transfers finish.
    let token = orch.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling remaining transfers");
            token.cancel();
        }
    });

    (orch, pb)
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style =
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

// ── `soss upload` / `soss download` ───────────────────────────────────────────

async fn cmd_upload(
    config: &SossConfig,
    targets: Vec<PathBuf>,
    key: &KeyArgs,
    prefix: String,
    transfer: &TransferArgs,
) -> Result<()> {
    let passphrase = resolve_passphrase(config, key).await?;
    let store = connect(config).await?;
    let (orch, pb) = build_orchestrator(config, store, transfer, "upload");

    let result = orch
        .upload(UploadRequest {
            passphrase,
            prefix,
            targets,
        })
        .await;
    finish_batch(result, pb)
}

async fn cmd_download(
    config: &SossConfig,
    targets: Vec<String>,
    key: &KeyArgs,
    output_dir: PathBuf,
    transfer: &TransferArgs,
) -> Result<()> {
    let passphrase = resolve_passphrase(config, key).await?;
    let store = connect(config).await?;
    let (orch, pb) = build_orchestrator(config, store, transfer, "download");

    let result = orch
        .download(DownloadRequest {
            passphrase,
            output_dir: expand_tilde(&output_dir),
            targets,
        })
        .await;
    finish_batch(result, pb)
}

/// Print the batch summary; a batch with failed items is an error.
fn finish_batch(
    result: SossResult<TransferReport>,
    pb: Option<ProgressBar>,
) -> Result<()> {
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    match result {
        Ok(report) => {
            print_summary(&report);
            Ok(())
        }
        Err(SossError::PartialFailure(report)) => {
            print_summary(&report);
            for failure in &report.failed {
                eprintln!("  failed: {} ({}): {}", failure.target, failure.kind, failure.message);
            }
            Err(SossError::PartialFailure(report).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_summary(report: &TransferReport) {
    println!(
        "{} complete: {} succeeded, {} failed, {}",
        report.direction,
        report.succeeded.len(),
        report.failed.len(),
        fmt_bytes(report.bytes()),
    );
    for outcome in &report.succeeded {
        println!("  {} → {}", outcome.source, outcome.destination);
    }
}

// ── `soss list` ───────────────────────────────────────────────────────────────

async fn cmd_list(config: &SossConfig, prefix: &str) -> Result<()> {
    let store = connect(config).await?;
    let objects = store.list(prefix).await?;
    for object in &objects {
        println!("{:>10}  {}", fmt_bytes(object.size), object.key);
    }
    info!(prefix, count = objects.len(), "listed");
    Ok(())
}

// ── `soss secret` ─────────────────────────────────────────────────────────────

async fn cmd_secret(config: &SossConfig, force: bool, path: Option<&Path>) -> Result<()> {
    let secret = Secret::generate(secret_path(config, path));
    let backup = secret
        .save(force)
        .await
        .context("error generating secret")?;

    println!("secret generated: {}", secret.path().display());
    if let Some(backup) = backup {
        println!("previous secret:  {}", backup.display());
    }
    Ok(())
}

// ── `soss version` ────────────────────────────────────────────────────────────

fn cmd_version() {
    println!(
        "soss {} ({}/{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
