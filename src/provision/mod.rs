//! Ensure-or-create provisioning steps, one module per resource kind.
//!
//! Each resource follows the same ask-then-ensure pattern: resolve a
//! desired name (CLI override, then persisted config, then interactive
//! prompt), create the resource when required, and persist the
//! provider-assigned identity back to the config before moving on.

pub mod compute;
pub mod group;
pub mod network;
pub mod storage;
pub mod subscription;
pub mod vm;

use crate::error::{DeployError, Result};
use crate::prompt::Prompt;

/// Outcome of name resolution for a provisionable resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub name: String,
    /// Whether an ensure/create call is still required. A persisted name
    /// means the resource was provisioned by an earlier run.
    pub must_create: bool,
}

/// Resolve a resource name. Priority: CLI override, persisted config
/// value, interactive prompt with a default.
pub async fn resolve_name(
    prompter: &dyn Prompt,
    kind: &str,
    cli_override: Option<&str>,
    persisted: &str,
    default_name: &str,
) -> Result<ResolvedName> {
    if let Some(name) = cli_override.filter(|name| !name.is_empty()) {
        tracing::debug!(kind, name, "using name from CLI arguments");
        return Ok(ResolvedName {
            name: name.to_string(),
            must_create: true,
        });
    }

    if !persisted.is_empty() {
        tracing::info!(kind, name = persisted, "name known, not creating a new one");
        return Ok(ResolvedName {
            name: persisted.to_string(),
            must_create: false,
        });
    }

    let name = prompter
        .read_line_with_default(&format!("Desired {kind} name"), default_name)
        .await?;
    if name.is_empty() {
        return Err(DeployError::Prompt(format!("no {kind} name given")));
    }
    Ok(ResolvedName {
        name,
        must_create: true,
    })
}
