//! Manager VM choose/ensure and readiness polling.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::prompt::Prompt;
use crate::provider::types::{NetworkStack, Scope, VmInfo, VmParams};
use crate::provider::CloudApi;
use crate::provision::network;
use crate::ADMIN_USERNAME;

const MANAGER_VM_SIZE: &str = "Standard_DS1_v2";

/// Interval between readiness polls.
const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Status codes that must both be present before the VM counts as ready.
const STATUS_PROVISIONED: &str = "ProvisioningState/succeeded";
const STATUS_RUNNING: &str = "PowerState/running";

/// Let the operator pick a VM name, new or existing. A CLI override or
/// persisted name skips the prompt; this then only determines whether
/// that VM already exists.
pub async fn choose_vm(
    api: &dyn CloudApi,
    prompter: &dyn Prompt,
    config: &mut DeployConfig,
    cli_override: Option<&str>,
) -> Result<(String, bool)> {
    let scope = Scope::from_config(config);
    tracing::info!(
        resource_group = scope.resource_group,
        location = scope.location,
        "fetching VM list"
    );
    let vm_names: Vec<String> = api
        .list_vms(&scope)
        .await?
        .into_iter()
        .filter(|vm| vm.location == scope.location)
        .map(|vm| vm.name)
        .collect();
    tracing::info!(vm_count = vm_names.len(), names = ?vm_names, "retrieved list of existing VMs");

    if let Some(name) = cli_override.filter(|name| !name.is_empty()) {
        config.vm_name = name.to_string();
        config.save()?;
        let exists = vm_names.iter().any(|existing| existing == name);
        return Ok((name.to_string(), exists));
    }
    if !config.vm_name.is_empty() {
        let exists = vm_names.iter().any(|existing| *existing == config.vm_name);
        return Ok((config.vm_name.clone(), exists));
    }

    let (vm_name, exists) = if vm_names.is_empty() {
        (prompter.read_line("Desired name for new VM").await?, false)
    } else {
        prompter
            .choose(&vm_names, "Desired VM name, can be new or an existing name")
            .await?
    };
    if vm_name.is_empty() {
        return Err(DeployError::Prompt("no VM name given".to_string()));
    }

    config.vm_name = vm_name.clone();
    config.save()?;
    Ok((vm_name, exists))
}

/// Return the existing VM's info and network stack, or create a new VM
/// together with a fresh network stack.
pub async fn ensure_vm(
    api: &dyn CloudApi,
    config: &DeployConfig,
    vm_name: &str,
    is_existing: bool,
) -> Result<(VmInfo, NetworkStack)> {
    let scope = Scope::from_config(config);

    if !is_existing {
        tracing::info!(
            resource_group = scope.resource_group,
            vm_name,
            "creating new VM"
        );
        return create_vm(api, config, vm_name).await;
    }

    tracing::info!(resource_group = scope.resource_group, vm_name, "retrieving existing VM");
    let vm = api.get_vm(&scope, vm_name).await?;
    let nic_id = vm
        .nic_ids
        .first()
        .ok_or_else(|| DeployError::Provider(format!("VM {vm_name} has no network interface")))?;
    let stack = network::get_network_stack(api, nic_id).await?;
    Ok((vm, stack))
}

async fn create_vm(
    api: &dyn CloudApi,
    config: &DeployConfig,
    vm_name: &str,
) -> Result<(VmInfo, NetworkStack)> {
    let ssh_public_key = load_ssh_public_key()?;
    let admin_password = random_password(32);

    // The network stack must be fully provisioned before the VM that
    // references it.
    let net_stack = network::create_network_stack(api, config, vm_name).await?;

    let scope = Scope::from_config(config);
    tracing::info!(
        resource_group = scope.resource_group,
        location = scope.location,
        vm_name,
        "creating virtual machine"
    );
    let vm = api
        .create_vm(
            &scope,
            &VmParams {
                name: vm_name.to_string(),
                size: MANAGER_VM_SIZE.to_string(),
                admin_username: ADMIN_USERNAME.to_string(),
                admin_password,
                ssh_public_key,
                nic_id: net_stack.interface.id.clone(),
            },
        )
        .await?;

    Ok((vm, net_stack))
}

/// Poll the VM until it is both provisioned and powered on, or the run
/// is cancelled.
pub async fn wait_for_ready(
    api: &dyn CloudApi,
    config: &DeployConfig,
    vm_name: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let scope = Scope::from_config(config);
    loop {
        tracing::info!(
            resource_group = scope.resource_group,
            vm_name,
            "checking VM status"
        );
        let statuses = api.vm_statuses(&scope, vm_name).await?;
        let provisioned = statuses.iter().any(|code| code == STATUS_PROVISIONED);
        let running = statuses.iter().any(|code| code == STATUS_RUNNING);
        if provisioned && running {
            tracing::info!(vm_name, statuses = ?statuses, "VM is ready");
            return Ok(());
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(DeployError::Cancelled),
            _ = tokio::time::sleep(READY_POLL_INTERVAL) => {}
        }
    }
}

/// The public half of the operator's SSH key, installed on the new VM.
fn load_ssh_public_key() -> Result<String> {
    let home = std::env::var("HOME")
        .map_err(|_| DeployError::Config("HOME is not set".to_string()))?;
    for name in ["id_ed25519.pub", "id_rsa.pub"] {
        let path = std::path::Path::new(&home).join(".ssh").join(name);
        match std::fs::read_to_string(&path) {
            Ok(key) => return Ok(key.trim().to_string()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Err(DeployError::Config(
        "no SSH public key found in ~/.ssh (tried id_ed25519.pub, id_rsa.pub)".to_string(),
    ))
}

/// Random alphanumeric password for the VM admin account; never used
/// interactively, key auth is installed alongside.
fn random_password(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
        .collect()
}
