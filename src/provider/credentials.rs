//! Management API credentials.
//!
//! Credentials live in a local JSON file next to the config document.
//! When absent, the file is produced by the provider's own CLI client,
//! which the operator must have logged in with beforehand. The same file
//! is uploaded to the manager VM so it can manage the worker pool.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::error::{DeployError, Result};

/// The local file containing the management API credentials.
pub const CREDENTIALS_FILE: &str = "client_credentials.json";

/// CLI command that exports credentials to stdout.
const EXPORT_COMMAND: &[&str] = &["farm-cloud", "auth", "export"];

#[derive(Debug, Clone, Deserialize)]
pub struct ApiCredentials {
    /// Base URL of the management API.
    #[serde(rename = "managementEndpoint")]
    pub management_endpoint: String,
    /// Bearer token for the management API.
    pub token: String,
}

impl ApiCredentials {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&contents)
            .map_err(|err| DeployError::Config(format!("unable to parse credentials file: {err}")))
    }
}

/// Create the credentials file using the provider CLI if it doesn't
/// exist yet.
pub async fn ensure_credentials_file(cancel: &CancellationToken) -> Result<()> {
    if let Ok(meta) = std::fs::metadata(CREDENTIALS_FILE) {
        if meta.len() > 0 {
            tracing::debug!(credentials_file = CREDENTIALS_FILE, "credentials file exists");
            return Ok(());
        }
    }

    tracing::info!(
        credentials_file = CREDENTIALS_FILE,
        command = EXPORT_COMMAND.join(" "),
        "creating credentials file"
    );

    let credentials = run_export_command(EXPORT_COMMAND, cancel).await?;
    std::fs::write(CREDENTIALS_FILE, credentials)?;
    Ok(())
}

/// Run the export command and return its stdout. Both pipes are drained
/// concurrently; the child may fill either one in any order without
/// stalling the other.
pub async fn run_export_command(command: &[&str], cancel: &CancellationToken) -> Result<Vec<u8>> {
    let mut child = tokio::process::Command::new(command[0])
        .args(&command[1..])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            DeployError::Config(format!("unable to run {}: {err}", command.join(" ")))
        })?;

    let mut stdout = child.stdout.take().expect("stdout was piped");
    let mut stderr = child.stderr.take().expect("stderr was piped");

    let mut credentials = Vec::new();
    let mut errors = String::new();
    let status = tokio::select! {
        _ = cancel.cancelled() => return Err(DeployError::Cancelled),
        result = async {
            let (out, err) = tokio::join!(
                stdout.read_to_end(&mut credentials),
                stderr.read_to_string(&mut errors),
            );
            out?;
            err?;
            child.wait().await
        } => result?,
    };

    if !status.success() {
        if errors.contains("login") {
            return Err(DeployError::Config(
                "not logged in; run 'farm-cloud auth login' before deploying".to_string(),
            ));
        }
        return Err(DeployError::Config(format!(
            "credentials export failed ({status}): {}",
            errors.trim()
        )));
    }

    Ok(credentials)
}
