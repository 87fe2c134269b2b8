//! Resource group ask/ensure.
//!
//! Creation failures are not fatal: the persisted name is reset so the
//! caller can loop back to the prompt with a clean slate.

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::prompt::Prompt;
use crate::provider::types::Scope;
use crate::provider::CloudApi;
use crate::provision::ResolvedName;

/// Ask for a resource group, potentially overridden by a CLI arg. Offers
/// the groups currently visible in the subscription when prompting.
pub async fn ask_group_name(
    api: &dyn CloudApi,
    prompter: &dyn Prompt,
    config: &DeployConfig,
    cli_override: Option<&str>,
    default_name: &str,
) -> Result<ResolvedName> {
    if let Some(name) = cli_override.filter(|name| !name.is_empty()) {
        tracing::debug!(resource_group = name, "creating resource group from CLI");
        return Ok(ResolvedName {
            name: name.to_string(),
            must_create: true,
        });
    }
    if !config.resource_group.is_empty() {
        tracing::info!(
            resource_group = config.resource_group,
            "resource group known, not creating a new one"
        );
        return Ok(ResolvedName {
            name: config.resource_group.clone(),
            must_create: false,
        });
    }

    let available = api.list_resource_groups(&config.subscription_id).await?;
    let name = match available.len() {
        0 => {
            let name = prompter
                .read_line_with_default("Desired resource group", default_name)
                .await?;
            if name.is_empty() {
                return Err(DeployError::Prompt("no resource group given".to_string()));
            }
            name
        }
        1 => {
            tracing::info!(
                resource_group = available[0].name,
                "using the only available resource group"
            );
            available[0].name.clone()
        }
        count => {
            tracing::info!(group_count = count, "multiple resource groups available");
            let names: Vec<String> = available.iter().map(|group| group.name.clone()).collect();
            let (name, _existing) = prompter
                .choose(&names, "Resource group number or new name")
                .await?;
            name
        }
    };

    // Creation is create-or-update, so an existing choice is fine.
    Ok(ResolvedName {
        name,
        must_create: true,
    })
}

/// Create the resource group and persist its name. Returns false when
/// creation fails, with the persisted name reset so a fresh
/// [`ask_group_name`] starts clean.
pub async fn ensure_group(
    api: &dyn CloudApi,
    config: &mut DeployConfig,
    group_name: &str,
) -> Result<bool> {
    config.resource_group = group_name.to_string();
    let scope = Scope::from_config(config);

    tracing::info!(
        resource_group = group_name,
        location = scope.location,
        "creating resource group"
    );
    match api.create_resource_group(&scope, group_name).await {
        Ok(group) => {
            config.resource_group = group.name;
            tracing::info!(resource_group = config.resource_group, "resource group created");
            config.save()?;
            Ok(true)
        }
        Err(err) => {
            tracing::warn!(
                resource_group = group_name,
                error = %err,
                "unable to create resource group, please pick a different name"
            );
            config.resource_group = String::new();
            Ok(false)
        }
    }
}
