//! Storage account ask/ensure, access keys, and file shares.
//!
//! Storage account names are globally unique, so availability is checked
//! before creation and any failure loops back to the prompt instead of
//! aborting the run.

use crate::config::{DeployConfig, StorageCredentials};
use crate::error::{DeployError, Result};
use crate::prompt::Prompt;
use crate::provider::types::{FileShare, Scope, ShareOutcome};
use crate::provider::CloudApi;
use crate::provision::{resolve_name, ResolvedName};
use crate::UNIX_GROUP_NAME;

/// SMB share quota, in gigabytes.
const DEFAULT_QUOTA_GB: u32 = 5 * 1024;

/// Shares mounted on both the manager and the workers, with the file
/// mode their content should get.
pub const DEFAULT_SHARES: &[(&str, u16)] = &[
    ("farm-resources", 0o775),
    ("farm-input", 0o660),
    ("farm-output", 0o660),
];

pub async fn ask_account_name(
    prompter: &dyn Prompt,
    config: &DeployConfig,
    cli_override: Option<&str>,
    default_name: &str,
) -> Result<ResolvedName> {
    resolve_name(
        prompter,
        "storage account",
        cli_override,
        &config.storage_account,
        default_name,
    )
    .await
}

/// Whether the desired account name is still available.
pub async fn check_availability(
    api: &dyn CloudApi,
    config: &DeployConfig,
    account_name: &str,
) -> Result<bool> {
    tracing::info!(
        storage_account = account_name,
        resource_group = config.resource_group,
        "checking storage account name availability"
    );
    let result = api
        .check_storage_name(&config.subscription_id, account_name)
        .await?;
    if !result.available {
        tracing::error!(
            storage_account = account_name,
            reason = result.reason.as_deref().unwrap_or("unknown"),
            message = result.message.as_deref().unwrap_or(""),
            "storage account name not available"
        );
    }
    Ok(result.available)
}

/// Create the storage account and persist its name.
pub async fn create_and_save(
    api: &dyn CloudApi,
    config: &mut DeployConfig,
    account_name: &str,
) -> Result<()> {
    let scope = Scope::from_config(config);
    tracing::info!(
        storage_account = account_name,
        resource_group = scope.resource_group,
        location = scope.location,
        "creating storage account"
    );
    let account = api.create_storage_account(&scope, account_name).await?;

    config.storage_account = account.name;
    tracing::info!(storage_account = config.storage_account, "storage account created");
    config.save()?;
    Ok(())
}

/// Fetch the account access key and keep it in memory for mount options
/// and template substitution. Never persisted.
pub async fn fetch_credentials(api: &dyn CloudApi, config: &mut DeployConfig) -> Result<()> {
    let scope = Scope::from_config(config);
    tracing::info!(
        storage_account = config.storage_account,
        resource_group = scope.resource_group,
        "obtaining storage key"
    );

    let keys = api.storage_account_keys(&scope, &config.storage_account).await?;
    let first_key = keys.first().ok_or_else(|| {
        DeployError::Provider("this storage account has no access keys".to_string())
    })?;
    if keys.len() > 1 {
        tracing::warn!(key_count = keys.len(), "multiple storage keys found, using the first");
    }
    if first_key.value.is_empty() {
        return Err(DeployError::Provider(format!(
            "storage key {} has no value",
            first_key.key_name
        )));
    }

    config.storage_credentials = Some(StorageCredentials {
        username: config.storage_account.clone(),
        password: first_key.value.clone(),
    });
    Ok(())
}

/// Ensure all SMB shares exist. Returns the mount-table (fstab) fragment
/// for mounting them on a remote machine.
pub async fn ensure_file_shares(api: &dyn CloudApi, config: &DeployConfig) -> Result<String> {
    let credentials = config.storage_credentials()?;

    let mut fstab = String::new();
    for (share_name, file_mode) in DEFAULT_SHARES {
        let share = FileShare {
            name: share_name.to_string(),
            quota_gb: DEFAULT_QUOTA_GB,
        };
        tracing::info!(share = share.name, "ensuring SMB share exists");
        match api.ensure_file_share(credentials, &share).await? {
            ShareOutcome::Created => tracing::info!(share = share.name, "SMB share created"),
            ShareOutcome::AlreadyExists => {
                tracing::debug!(share = share.name, "SMB share already exists")
            }
        }

        fstab.push_str(&fstab_line(api, config, share_name, *file_mode)?);
        fstab.push('\n');
    }
    Ok(fstab)
}

/// The /etc/fstab line for one share.
pub fn fstab_line(
    api: &dyn CloudApi,
    config: &DeployConfig,
    share_name: &str,
    file_mode: u16,
) -> Result<String> {
    let options = mount_options(config, file_mode)?;
    Ok(format!(
        "//{}/{} /mnt/{} cifs {} 0 0",
        api.storage_host(&config.storage_account),
        share_name,
        share_name,
        options,
    ))
}

/// Mount options for an SMB share, including the in-memory credentials.
pub fn mount_options(config: &DeployConfig, file_mode: u16) -> Result<String> {
    let credentials = config.storage_credentials()?;
    Ok(mount_options_for(
        &credentials.username,
        &credentials.password,
        file_mode,
    ))
}

/// As [`mount_options`], for an arbitrary account and key. The pool
/// start command passes placeholders here so the real key never enters
/// the command until submission.
pub fn mount_options_for(username: &str, password: &str, file_mode: u16) -> String {
    format!(
        "vers=3.0,username={},password={},dir_mode=0770,file_mode=0{:o},gid={},forcegid,sec=ntlmssp,mfsymlinks",
        username, password, file_mode, UNIX_GROUP_NAME,
    )
}
