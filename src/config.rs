//! Persistent deployment configuration.
//!
//! The config file is the durable record of what has already been
//! provisioned: any empty field means "not yet created". Every successful
//! creation step writes its identity back here and saves immediately, so
//! a crash never loses completed work. Saving is atomic (write to a
//! sibling temp file, then rename) so the file on disk is never
//! half-written.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default location of the config document, relative to the working
/// directory the operator runs the tool from.
pub const CONFIG_FILE: &str = "farm_deploy.yaml";

/// Worker pool parameters, prompted for once and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Name of the worker pool.
    #[serde(rename = "poolID")]
    pub pool_id: String,
    /// Machine size for pool nodes, like "Standard_F16s".
    #[serde(rename = "vmSize")]
    pub vm_size: String,

    #[serde(rename = "targetDedicatedNodes")]
    pub target_dedicated_nodes: i32,
    #[serde(rename = "targetLowPriorityNodes")]
    pub target_low_priority_nodes: i32,
}

/// Everything you need to mount a file share from a storage account.
/// Held in memory only; the access key is never written to the config
/// document.
#[derive(Debug, Clone)]
pub struct StorageCredentials {
    /// The storage account name.
    pub username: String,
    /// The storage account access key.
    pub password: String,
}

/// The deployment configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployConfig {
    /// File this config was read from, so it can be saved after
    /// modification.
    #[serde(skip)]
    path: PathBuf,

    /// Presented as the default choice when asking for component names.
    #[serde(rename = "defaultName", default, skip_serializing_if = "String::is_empty")]
    pub default_name: String,

    /// ID of the provider subscription that owns all resources.
    #[serde(rename = "subscriptionID", default, skip_serializing_if = "String::is_empty")]
    pub subscription_id: String,
    /// Physical region of the resources, such as "westeurope".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,

    /// Resource group that contains the farm infrastructure.
    #[serde(rename = "resourceGroup", default, skip_serializing_if = "String::is_empty")]
    pub resource_group: String,
    /// Storage account that holds the farm file shares.
    #[serde(rename = "storageAccountName", default, skip_serializing_if = "String::is_empty")]
    pub storage_account: String,
    /// Compute account that hosts the worker pool.
    #[serde(rename = "computeAccountName", default, skip_serializing_if = "String::is_empty")]
    pub compute_account: String,
    /// Virtual machine that runs the farm manager.
    #[serde(rename = "virtualMachine", default, skip_serializing_if = "String::is_empty")]
    pub vm_name: String,

    /// Secret that authorises workers to register with the manager.
    /// Shouldn't change once generated: the manager config on the VM is
    /// not overwritten if it already exists.
    #[serde(
        rename = "workerRegistrationSecret",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub worker_registration_secret: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolConfig>,

    /// Set after the storage account exists and its keys were fetched.
    #[serde(skip)]
    pub storage_credentials: Option<StorageCredentials>,
}

impl DeployConfig {
    /// Load the config document, or return defaults when the file does
    /// not exist yet. An existing-but-unparsable file is an error.
    ///
    /// Generates the worker registration secret on first load and
    /// persists it immediately, so reruns keep using the same secret.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_yaml::from_str::<DeployConfig>(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => DeployConfig::default(),
            Err(err) => return Err(err.into()),
        };
        config.path = path;

        if config.worker_registration_secret.is_empty() {
            tracing::info!(path = %config.path.display(), "generating random worker secret");
            config.worker_registration_secret = generate_worker_secret();
            config.save()?;
        }

        Ok(config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store the config document atomically.
    pub fn save(&self) -> Result<()> {
        tracing::debug!(path = %self.path.display(), "saving configuration");
        let staged = self.stage_save()?;
        self.commit_save(&staged)
    }

    /// First half of an atomic save: write the full serialized document
    /// to a sibling temp file and return its path. The destination is
    /// untouched until [`commit_save`](Self::commit_save) runs.
    pub fn stage_save(&self) -> Result<PathBuf> {
        if self.path.as_os_str().is_empty() {
            return Err(crate::DeployError::Config(
                "unable to save config file, path unknown".to_string(),
            ));
        }
        let mut staged = self.path.clone().into_os_string();
        staged.push("~");
        let staged = PathBuf::from(staged);

        let contents = serde_yaml::to_string(self)?;
        std::fs::write(&staged, contents)?;
        Ok(staged)
    }

    /// Second half of an atomic save: replace the destination with the
    /// staged file. Tolerates the destination not existing yet.
    pub fn commit_save(&self, staged: &Path) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        std::fs::rename(staged, &self.path)?;
        Ok(())
    }

    /// Full provider resource path of the storage account.
    pub fn storage_account_id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/storage/storageAccounts/{}",
            self.subscription_id, self.resource_group, self.storage_account,
        )
    }

    /// The storage credentials, which must have been fetched earlier in
    /// the run.
    pub fn storage_credentials(&self) -> Result<&StorageCredentials> {
        self.storage_credentials.as_ref().ok_or_else(|| {
            crate::DeployError::Config("storage credentials not loaded yet".to_string())
        })
    }
}

/// 64 bytes from the OS random source, URL-safe base64 without padding.
fn generate_worker_secret() -> String {
    let mut random_bytes = [0u8; 64];
    rand::rngs::OsRng.fill_bytes(&mut random_bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes)
}
