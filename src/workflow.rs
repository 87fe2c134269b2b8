//! Workflow driver: sequences the whole deployment.
//!
//! Every step is ensure-or-create and persists its result immediately, so
//! the run can be repeated after any failure and picks up where it left
//! off. Provisioning steps are strictly sequential; the only concurrency
//! is the signal handler and the remote I/O tasks inside the SSH layer.

use std::path::PathBuf;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::prompt::Prompt;
use crate::provider::CloudApi;
use crate::provision::{compute, group, storage, subscription, vm};
use crate::remote::{Artifact, RemoteInstaller, INSTALL_SCRIPT, MANAGER_SERVICE_UNIT};
use crate::render::{RenderContext, TemplateRenderer};
use crate::INSTALL_SCRIPT_NAME;

/// Optional identity overrides from the command line. Any omitted value
/// falls back to the persisted config, then an interactive prompt.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub subscription: Option<String>,
    pub location: Option<String>,
    pub resource_group: Option<String>,
    pub storage_account: Option<String>,
    pub compute_account: Option<String>,
    pub vm_name: Option<String>,
}

pub struct Driver<'a> {
    pub api: &'a dyn CloudApi,
    pub prompter: &'a dyn Prompt,
    pub installer: &'a dyn RemoteInstaller,
    pub renderer: &'a TemplateRenderer,
    /// Management API credentials file, uploaded to the manager VM.
    pub credentials_path: PathBuf,
    pub cancel: CancellationToken,
}

impl Driver<'_> {
    pub async fn run(&self, config: &mut DeployConfig, overrides: &Overrides) -> Result<()> {
        let started = Instant::now();

        subscription::ensure_subscription(
            self.api,
            self.prompter,
            config,
            overrides.subscription.as_deref(),
        )
        .await?;
        subscription::ensure_location(
            self.api,
            self.prompter,
            config,
            overrides.location.as_deref(),
        )
        .await?;

        if config.default_name.is_empty() {
            config.default_name = self
                .prompter
                .read_line("Default name for subcomponents")
                .await?;
            config.save()?;
        }
        let default_name = config.default_name.clone();

        // Resource group: keep prompting until a name can be created (or
        // an existing one is reused).
        loop {
            let resolved = group::ask_group_name(
                self.api,
                self.prompter,
                config,
                overrides.resource_group.as_deref(),
                &default_name,
            )
            .await?;
            if !resolved.must_create {
                break;
            }
            if group::ensure_group(self.api, config, &resolved.name).await? {
                break;
            }
            if overrides.resource_group.is_some() {
                return Err(DeployError::NameUnavailable(resolved.name));
            }
        }

        compute::ask_pool_parameters_and_save(self.prompter, config, &default_name).await?;

        // Manager VM and its network stack.
        let (vm_name, vm_exists) =
            vm::choose_vm(self.api, self.prompter, config, overrides.vm_name.as_deref()).await?;
        let (vm_info, net_stack) = vm::ensure_vm(self.api, config, &vm_name, vm_exists).await?;
        tracing::info!(
            vm_name = vm_info.name,
            public_address = net_stack.public_ip.ip_address,
            fqdn = net_stack.fqdn(),
            private_address = net_stack.private_ip,
            vnet = net_stack.vnet.name,
            "found network info"
        );
        vm::wait_for_ready(self.api, config, &vm_name, &self.cancel).await?;

        // Storage account: names are globally unique, so an unavailable
        // or failed name loops back to the prompt.
        loop {
            let resolved = storage::ask_account_name(
                self.prompter,
                config,
                overrides.storage_account.as_deref(),
                &default_name,
            )
            .await?;
            if !resolved.must_create {
                break;
            }
            if !storage::check_availability(self.api, config, &resolved.name).await? {
                if overrides.storage_account.is_some() {
                    return Err(DeployError::NameUnavailable(resolved.name));
                }
                continue;
            }
            match storage::create_and_save(self.api, config, &resolved.name).await {
                Ok(()) => break,
                Err(err) if overrides.storage_account.is_none() => {
                    tracing::warn!(
                        storage_account = resolved.name,
                        error = %err,
                        "unable to create storage account, please pick a different name"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        storage::fetch_credentials(self.api, config).await?;

        let resolved = compute::ask_account_name(
            self.prompter,
            config,
            overrides.compute_account.as_deref(),
            &default_name,
        )
        .await?;
        if resolved.must_create {
            compute::create_and_save(self.api, config, &resolved.name).await?;
        }

        // Collect the generated files (and bits of files).
        let fstab = storage::ensure_file_shares(self.api, config).await?;
        let render_context = RenderContext::new(config, &net_stack, &fstab);
        let manager_yaml = self.renderer.render("farm-manager.yaml", &render_context)?;
        let worker_cfg = self.renderer.render("farm-worker.cfg", &render_context)?;
        let worker_startup = self
            .renderer
            .render("farm-worker-startup.sh", &render_context)?;

        let artifacts = vec![
            Artifact::new("fstab-smb", fstab.as_bytes()),
            Artifact::new("farm-manager.service", MANAGER_SERVICE_UNIT.as_bytes()),
            Artifact::new("default-farm-manager.yaml", manager_yaml),
            Artifact::new("farm-worker.cfg", worker_cfg),
            Artifact::new("farm-worker-startup.sh", worker_startup),
            Artifact::new(INSTALL_SCRIPT_NAME, INSTALL_SCRIPT.as_bytes()),
            Artifact::new(
                "client_credentials.json",
                std::fs::read(&self.credentials_path)?,
            ),
        ];
        self.installer
            .install(&net_stack.public_ip.ip_address, &artifacts)
            .await?;

        compute::create_pool_if_absent(self.api, config, &net_stack).await?;

        tracing::info!(
            duration = ?started.elapsed(),
            url = format!("https://{}/setup", net_stack.fqdn()),
            "deployment complete"
        );
        Ok(())
    }
}
