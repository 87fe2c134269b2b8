//! farm-deploy binary. Provisions the entire render farm stack in one run
//! and can be re-run safely; finished steps are skipped.

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use farm_deploy::config::{DeployConfig, CONFIG_FILE};
use farm_deploy::provider::credentials::{ensure_credentials_file, ApiCredentials, CREDENTIALS_FILE};
use farm_deploy::provider::rest::RestApi;
use farm_deploy::prompt::StdinPrompter;
use farm_deploy::remote::{SshAuth, SshInstaller};
use farm_deploy::render::TemplateRenderer;
use farm_deploy::workflow::{Driver, Overrides};

#[derive(Parser, Debug)]
#[command(name = "farm-deploy", version, about = "Deploy a render farm manager and worker pool")]
struct Args {
    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Enable debug-level logging
    #[arg(long, conflicts_with = "quiet")]
    debug: bool,

    /// Subscription ID to deploy into
    #[arg(long)]
    subscription: Option<String>,

    /// Physical location of the resources
    #[arg(long)]
    location: Option<String>,

    /// Name of the resource group to use or create
    #[arg(long)]
    group: Option<String>,

    /// Name of the storage account to use or create
    #[arg(long = "storage-account", visible_alias = "sa")]
    storage_account: Option<String>,

    /// Name of the compute account to use or create
    #[arg(long = "compute-account", visible_alias = "ca")]
    compute_account: Option<String>,

    /// Name of the manager virtual machine to use or create
    #[arg(long)]
    vm: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.quiet {
        "warn"
    } else if args.debug {
        "debug"
    } else {
        "info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();

    let cancel = CancellationToken::new();
    tokio::spawn(handle_signals(cancel.clone()));

    if let Err(err) = run(args, cancel).await {
        tracing::error!(error = %err, "deployment failed");
        std::process::exit(1);
    }
}

async fn run(args: Args, cancel: CancellationToken) -> farm_deploy::error::Result<()> {
    // Fail early when there is no way to reach the manager VM later.
    let ssh_auth = SshAuth::load()?;

    ensure_credentials_file(&cancel).await?;
    let credentials = ApiCredentials::load(CREDENTIALS_FILE)?;
    let api = RestApi::new(&credentials, cancel.clone())?;

    let mut config = DeployConfig::load(CONFIG_FILE)?;
    let prompter = StdinPrompter::new(cancel.clone());
    let installer = SshInstaller::new(ssh_auth);
    let renderer = TemplateRenderer::load()?;

    let overrides = Overrides {
        subscription: args.subscription,
        location: args.location,
        resource_group: args.group,
        storage_account: args.storage_account,
        compute_account: args.compute_account,
        vm_name: args.vm,
    };
    let driver = Driver {
        api: &api,
        prompter: &prompter,
        installer: &installer,
        renderer: &renderer,
        credentials_path: PathBuf::from(CREDENTIALS_FILE),
        cancel,
    };
    driver.run(&mut config, &overrides).await
}

/// Ctrl+C or SIGTERM cancels in-flight work, waits a moment for it to
/// wind down, then forces the exit.
async fn handle_signals(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("installing SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    tracing::warn!("interrupted, shutting down");
    cancel.cancel();
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    std::process::exit(2);
}
