//! Subcommands and their JSON rendering.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bucketgate_core::{GatewayCore, GatewayError, UploadRequest};
use clap::Subcommand;
use serde_json::{Value, json};

/// One gateway operation.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a local file.
    Upload {
        /// File to upload.
        file: PathBuf,
        /// Logical name to store it under (defaults to the file name).
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete an object. Succeeds if it does not exist.
    Delete {
        /// Logical name of the object.
        name: String,
    },
    /// List every object under the prefix.
    List {
        /// Include size and modification time.
        #[arg(long)]
        long: bool,
    },
    /// Show one object's metadata.
    Stat {
        /// Logical name of the object.
        name: String,
    },
}

/// Execute `command` against `core`, returning the success payload.
pub async fn run(core: &GatewayCore, command: &Command) -> Result<Value> {
    match command {
        Command::Upload { file, name } => {
            let logical_name = match name {
                Some(name) => name.clone(),
                None => file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_owned)
                    .with_context(|| format!("cannot derive an object name from {}", file.display()))?,
            };
            let mut content = tokio::fs::File::open(file)
                .await
                .with_context(|| format!("failed to open {}", file.display()))?;
            let size = content
                .metadata()
                .await
                .with_context(|| format!("failed to stat {}", file.display()))?
                .len();

            let receipt = core
                .upload(UploadRequest::new(&logical_name, &mut content).with_size_hint(size))
                .await?;
            Ok(json!({ "message": "success", "object": receipt }))
        }
        Command::Delete { name } => {
            core.delete(name).await?;
            Ok(json!({ "message": "success" }))
        }
        Command::List { long: false } => {
            let names = core.list().await?;
            Ok(json!({ "message": names }))
        }
        Command::List { long: true } => {
            let entries = core.list_entries().await?;
            Ok(json!({ "message": entries }))
        }
        Command::Stat { name } => match core.stat(name).await? {
            Some(info) => Ok(json!({ "message": info })),
            None => Ok(json!({ "message": null })),
        },
    }
}

/// Stable kind name of a failed command: the gateway error kind, or
/// `CommandError` for failures outside the gateway.
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<GatewayError>()
        .map_or("CommandError", |e| e.kind().as_str())
}

/// Render an outcome as one JSON line, and whether it was a success.
pub fn render(outcome: &Result<Value>) -> (String, bool) {
    match outcome {
        Ok(value) => (value.to_string(), true),
        Err(err) => {
            let body = json!({ "error": format!("{err:#}"), "kind": error_kind(err) });
            (body.to_string(), false)
        }
    }
}
