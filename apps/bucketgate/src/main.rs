//! BucketGate CLI - command-line adapter for the object-storage gateway.
//!
//! Each invocation builds one [`GatewayCore`] over the configured backend,
//! runs a single operation, and prints the outcome as one JSON line on
//! stdout: `{"message": ...}` on success, `{"error": ..., "kind": ...}` on
//! failure (with a non-zero exit code).
//!
//! # Usage
//!
//! ```text
//! bucketgate upload ./report.pdf
//! bucketgate upload ./report.pdf --name reports/2024.pdf
//! bucketgate list --long
//! bucketgate stat reports/2024.pdf
//! bucketgate delete reports/2024.pdf
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BUCKETGATE_PREFIX` | `test-files/` | Key prefix for every object |
//! | `BUCKETGATE_TIMEOUT_SECS` | `50` | Per-operation deadline |
//! | `BUCKETGATE_BACKEND` | `local` | `local` or `memory` |
//! | `BUCKETGATE_DATA_DIR` | `./data` | Root directory of the local backend |
//! | `BUCKETGATE_PAGE_SIZE` | `1000` | Listing page size |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod commands;

use std::sync::Arc;

use anyhow::{Context, Result};
use bucketgate_core::{BackendKind, GatewayConfig, GatewayCore, StorageBackend};
use bucketgate_storage::{InMemoryBackend, LocalFsBackend};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::Command;

/// Version reported in startup logs.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "bucketgate", version, about = "Upload, delete and list objects under a fixed key prefix")]
struct Cli {
    /// Backend to use (overrides `BUCKETGATE_BACKEND`).
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Local backend root directory (overrides `BUCKETGATE_DATA_DIR`).
    #[arg(long, global = true)]
    data_dir: Option<String>,

    /// Key prefix (overrides `BUCKETGATE_PREFIX`).
    #[arg(long, global = true)]
    prefix: Option<String>,

    /// Operation deadline in seconds (overrides `BUCKETGATE_TIMEOUT_SECS`).
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Apply command-line overrides on top of the environment configuration.
    fn apply(&self, mut config: GatewayConfig) -> GatewayConfig {
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir.clone_from(dir);
        }
        if let Some(prefix) = &self.prefix {
            config.key_prefix.clone_from(prefix);
        }
        if let Some(secs) = self.timeout_secs.filter(|s| *s > 0) {
            config.timeout_secs = secs;
        }
        config
    }
}

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config
/// value. Logs go to stderr so stdout carries only command output.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Construct the configured backend.
async fn build_backend(config: &GatewayConfig) -> Result<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config.backend {
        BackendKind::Local => Arc::new(
            LocalFsBackend::open(&config.data_dir)
                .await
                .with_context(|| format!("failed to open data directory {}", config.data_dir))?
                .with_page_size(config.page_size),
        ),
        BackendKind::Memory => Arc::new(InMemoryBackend::new(config.page_size)),
    };
    Ok(backend)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.apply(GatewayConfig::from_env());

    init_tracing(&config.log_level)?;

    debug!(
        backend = %config.backend,
        key_prefix = %config.key_prefix,
        timeout_secs = config.timeout_secs,
        version = VERSION,
        "starting BucketGate CLI",
    );

    let backend = build_backend(&config).await?;
    let core = GatewayCore::from_config(backend, &config).context("invalid gateway configuration")?;

    let outcome = commands::run(&core, &cli.command).await;
    let (line, ok) = commands::render(&outcome);
    println!("{line}");

    if let Err(err) = &outcome {
        debug!(kind = commands::error_kind(err), "command failed");
    }
    if ok {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
