//! farm-deploy: one-shot provisioning of a render-farm management stack.
//!
//! The tool walks an operator through creating (or reusing) a resource
//! group, storage account, compute account and manager VM on a cloud
//! provider, pushes templated configuration to the VM over SSH, and
//! finally starts a batch worker pool. Already-provisioned identities are
//! persisted in a local config file, so the whole run is idempotent:
//! rerunning the tool after a failure skips everything that succeeded.

pub mod config;
pub mod error;
pub mod prompt;
pub mod provider;
pub mod provision;
pub mod remote;
pub mod render;
pub mod workflow;

pub use error::{DeployError, Result};

/// Admin account created on the manager VM. The SSH setup phase and the
/// install script both assume this name.
pub const ADMIN_USERNAME: &str = "farmadmin";

/// Unix group shared by the manager service and the mounted file shares.
/// When changing this, also change the install script.
pub const UNIX_GROUP_NAME: &str = "farm";

/// The VM installation script; named the same locally and remotely.
pub const INSTALL_SCRIPT_NAME: &str = "farm-manager-setup-vm.sh";
