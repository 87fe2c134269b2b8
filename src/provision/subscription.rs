//! Subscription and location identities. These can't be created, only
//! chosen from what the account already has.

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::prompt::Prompt;
use crate::provider::CloudApi;

/// Resolve the subscription ID and persist it.
pub async fn ensure_subscription(
    api: &dyn CloudApi,
    prompter: &dyn Prompt,
    config: &mut DeployConfig,
    cli_override: Option<&str>,
) -> Result<()> {
    if let Some(id) = cli_override.filter(|id| !id.is_empty()) {
        tracing::info!(subscription_id = id, "taking subscription ID from CLI arguments");
        config.subscription_id = id.to_string();
        config.save()?;
        return Ok(());
    }
    if !config.subscription_id.is_empty() {
        tracing::info!(
            subscription_id = config.subscription_id,
            "taking subscription ID from config file"
        );
        return Ok(());
    }

    tracing::info!("fetching subscriptions");
    let available = api.list_subscriptions().await?;
    config.subscription_id = match available.len() {
        0 => {
            return Err(DeployError::Config(
                "your account has no subscriptions; create one first".to_string(),
            ))
        }
        1 => {
            tracing::info!(subscription_id = available[0].id, "using your only subscription");
            available[0].id.clone()
        }
        count => {
            tracing::info!(subscription_count = count, "multiple subscriptions found");
            let names: Vec<String> = available
                .iter()
                .map(|sub| format!("{} ({})", sub.display_name, sub.id))
                .collect();
            let index = pick_index(prompter, &names, "Subscription number").await?;
            available[index].id.clone()
        }
    };
    config.save()?;
    Ok(())
}

/// Resolve the physical region and persist it.
pub async fn ensure_location(
    api: &dyn CloudApi,
    prompter: &dyn Prompt,
    config: &mut DeployConfig,
    cli_override: Option<&str>,
) -> Result<()> {
    if let Some(location) = cli_override.filter(|location| !location.is_empty()) {
        tracing::info!(location, "taking location from CLI arguments");
        config.location = location.to_string();
        config.save()?;
        return Ok(());
    }
    if !config.location.is_empty() {
        tracing::info!(location = config.location, "taking location from config file");
        return Ok(());
    }

    let available = api.list_locations(&config.subscription_id).await?;
    config.location = match available.len() {
        0 => {
            return Err(DeployError::Config(
                "your account has no locations available".to_string(),
            ))
        }
        1 => {
            tracing::info!(location = available[0].name, "using the only available location");
            available[0].name.clone()
        }
        count => {
            tracing::info!(location_count = count, "multiple locations available");
            let names: Vec<String> = available
                .iter()
                .map(|location| format!("{} ({})", location.display_name, location.name))
                .collect();
            let index = pick_index(prompter, &names, "Location number").await?;
            available[index].name.clone()
        }
    };
    config.save()?;
    Ok(())
}

/// Print a numbered menu and read a 1-based choice.
async fn pick_index(prompter: &dyn Prompt, names: &[String], prompt: &str) -> Result<usize> {
    println!("Available options:");
    for (idx, name) in names.iter().enumerate() {
        println!("    {:2}: {}", idx + 1, name);
    }
    let choice = prompter.read_nonneg_int(prompt, false).await?;
    let choice = choice as usize;
    if choice < 1 || choice > names.len() {
        return Err(DeployError::Prompt(format!(
            "option {choice} is not available"
        )));
    }
    Ok(choice - 1)
}
