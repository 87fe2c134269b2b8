//! Compute account and worker pool.

use std::time::Duration;

use crate::config::{DeployConfig, PoolConfig};
use crate::error::{DeployError, Result};
use crate::prompt::Prompt;
use crate::provider::types::{NetworkStack, PoolSpec, Scope};
use crate::provider::CloudApi;
use crate::provision::{resolve_name, storage, ResolvedName};
use crate::UNIX_GROUP_NAME;

/// Pool submission is quick; don't wait longer than this.
const POOL_CREATE_DEADLINE: Duration = Duration::from_secs(60);

const DEFAULT_POOL_VM_SIZE: &str = "Standard_F16s";

pub async fn ask_account_name(
    prompter: &dyn Prompt,
    config: &DeployConfig,
    cli_override: Option<&str>,
    default_name: &str,
) -> Result<ResolvedName> {
    resolve_name(
        prompter,
        "compute account",
        cli_override,
        &config.compute_account,
        default_name,
    )
    .await
}

/// Create the compute account and persist its name. Failure is fatal to
/// the run; compute account names are not collision-prone.
pub async fn create_and_save(
    api: &dyn CloudApi,
    config: &mut DeployConfig,
    account_name: &str,
) -> Result<()> {
    let scope = Scope::from_config(config);
    tracing::info!(
        compute_account = account_name,
        resource_group = scope.resource_group,
        location = scope.location,
        "creating compute account"
    );
    let account = api.create_compute_account(&scope, account_name).await?;

    config.compute_account = account.name;
    tracing::info!(compute_account = config.compute_account, "compute account created");
    config.save()?;
    Ok(())
}

/// Ask for the pool parameters once and persist them.
pub async fn ask_pool_parameters_and_save(
    prompter: &dyn Prompt,
    config: &mut DeployConfig,
    default_pool_name: &str,
) -> Result<()> {
    if let Some(pool) = &config.pool {
        if !pool.pool_id.is_empty() && !pool.vm_size.is_empty() {
            tracing::info!(
                pool_id = pool.pool_id,
                vm_size = pool.vm_size,
                target_dedicated_nodes = pool.target_dedicated_nodes,
                target_low_priority_nodes = pool.target_low_priority_nodes,
                "worker pool config loaded"
            );
            return Ok(());
        }
    }

    let pool_id = prompter
        .read_line_with_default("Desired worker pool ID", default_pool_name)
        .await?;
    if pool_id.is_empty() {
        return Err(DeployError::Prompt("no worker pool ID given".to_string()));
    }

    let vm_size = prompter
        .read_line(&format!("Desired pool node VM size [{DEFAULT_POOL_VM_SIZE}]"))
        .await?;
    let vm_size = if vm_size.is_empty() {
        DEFAULT_POOL_VM_SIZE.to_string()
    } else {
        vm_size
    };

    let target_dedicated_nodes = prompter
        .read_nonneg_int("Target dedicated node count [0]", true)
        .await?;
    let target_low_priority_nodes = prompter
        .read_nonneg_int("Target low-priority node count [0]", true)
        .await?;

    config.pool = Some(PoolConfig {
        pool_id,
        vm_size,
        target_dedicated_nodes,
        target_low_priority_nodes,
    });
    config.save()?;
    Ok(())
}

/// Build the pool submission from the persisted parameters and the VM's
/// network stack. The start command carries `{STORAGE_ACCOUNT}` and
/// `{STORAGE_KEY}` placeholders so the key is substituted only right
/// before submission.
pub fn pool_spec(
    api: &dyn CloudApi,
    config: &DeployConfig,
    net_stack: &NetworkStack,
) -> Result<PoolSpec> {
    let pool = config
        .pool
        .as_ref()
        .ok_or_else(|| DeployError::Config("worker pool parameters not set".to_string()))?;

    // The options are built from the placeholders directly; deriving
    // them from the expanded string would mangle keys that contain the
    // account name as a substring.
    let start_command = format!(
        "bash -exc 'sudo mkdir -p /mnt/farm-resources; \
         sudo groupadd --force {group}; \
         grep \" /mnt/farm-resources \" -q /proc/mounts || \
         sudo mount -t cifs //{host}/farm-resources /mnt/farm-resources -o {options}; \
         bash -ex /mnt/farm-resources/farm-worker-startup.sh'",
        group = UNIX_GROUP_NAME,
        host = api.storage_host("{STORAGE_ACCOUNT}"),
        options = storage::mount_options_for("{STORAGE_ACCOUNT}", "{STORAGE_KEY}", 0o775),
    );

    Ok(PoolSpec {
        id: pool.pool_id.clone(),
        vm_size: pool.vm_size.clone(),
        max_tasks_per_node: 1,
        target_dedicated_nodes: pool.target_dedicated_nodes,
        target_low_priority_nodes: pool.target_low_priority_nodes,
        subnet_id: net_stack.subnet_id()?.to_string(),
        start_command,
    })
}

/// Substitute the live storage credentials into the start command.
pub fn substitute_storage_credentials(spec: &mut PoolSpec, config: &DeployConfig) -> Result<()> {
    let credentials = config.storage_credentials()?;
    spec.start_command = spec
        .start_command
        .replace("{STORAGE_ACCOUNT}", &credentials.username)
        .replace("{STORAGE_KEY}", &credentials.password);
    Ok(())
}

/// Start the worker pool unless a pool with the same ID already exists.
pub async fn create_pool_if_absent(
    api: &dyn CloudApi,
    config: &DeployConfig,
    net_stack: &NetworkStack,
) -> Result<()> {
    let mut spec = pool_spec(api, config, net_stack)?;
    substitute_storage_credentials(&mut spec, config)?;

    let scope = Scope::from_config(config);
    tracing::info!(pool_id = spec.id, "fetching worker pools");

    let submit = async {
        let existing = api.list_pools(&scope, &config.compute_account).await?;
        for pool_id in &existing {
            tracing::info!(found_id = pool_id, "found existing worker pool");
        }
        if existing.contains(&spec.id) {
            tracing::debug!(pool_id = spec.id, "worker pool exists");
            return Ok(());
        }

        api.create_pool(&scope, &config.compute_account, &spec).await?;
        tracing::info!(pool_id = spec.id, "created worker pool");
        Ok(())
    };

    tokio::time::timeout(POOL_CREATE_DEADLINE, submit)
        .await
        .map_err(|_| DeployError::Timeout("creating worker pool".to_string()))?
}
