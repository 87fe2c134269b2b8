//! Resource types exchanged with the cloud provider.

use serde::{Deserialize, Serialize};

/// Identifies where resources live: subscription, resource group and
/// region. Threaded through every provider call instead of a long
/// argument list.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub subscription_id: String,
    pub resource_group: String,
    pub location: String,
}

impl Scope {
    pub fn from_config(config: &crate::config::DeployConfig) -> Self {
        Self {
            subscription_id: config.subscription_id.clone(),
            resource_group: config.resource_group.clone(),
            location: config.location.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub name: String,
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageAccount {
    pub name: String,
}

/// One storage account access key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageKey {
    #[serde(rename = "keyName")]
    pub key_name: String,
    pub value: String,
}

/// Result of a storage account name availability check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameAvailability {
    #[serde(rename = "nameAvailable")]
    pub available: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeAccount {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicIp {
    pub id: String,
    pub name: String,
    /// Statically allocated address, known once creation completes.
    #[serde(rename = "ipAddress")]
    pub ip_address: String,
    /// Fully-qualified public domain name assigned by the provider.
    pub fqdn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualNetwork {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpConfiguration {
    #[serde(rename = "privateIPAddress", default)]
    pub private_ip: Option<String>,
    #[serde(rename = "subnetID")]
    pub subnet_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub id: String,
    pub name: String,
    #[serde(rename = "ipConfigurations", default)]
    pub ip_configurations: Vec<IpConfiguration>,
    #[serde(rename = "publicIPID", default)]
    pub public_ip_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmInfo {
    pub id: String,
    pub name: String,
    pub location: String,
    /// Network interfaces attached to the VM, primary first.
    #[serde(rename = "networkInterfaceIDs", default)]
    pub nic_ids: Vec<String>,
}

/// Parameters for creating the manager VM.
#[derive(Debug, Clone)]
pub struct VmParams {
    pub name: String,
    pub size: String,
    pub admin_username: String,
    pub admin_password: String,
    pub ssh_public_key: String,
    pub nic_id: String,
}

/// Everything needed to submit the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSpec {
    pub id: String,
    #[serde(rename = "vmSize")]
    pub vm_size: String,
    #[serde(rename = "maxTasksPerNode")]
    pub max_tasks_per_node: i32,
    #[serde(rename = "targetDedicatedNodes")]
    pub target_dedicated_nodes: i32,
    #[serde(rename = "targetLowPriorityNodes")]
    pub target_low_priority_nodes: i32,
    #[serde(rename = "subnetID")]
    pub subnet_id: String,
    /// Command every node runs on startup; mounts the resources share
    /// and launches the worker.
    #[serde(rename = "startCommand")]
    pub start_command: String,
}

/// A file share to ensure on the storage account.
#[derive(Debug, Clone)]
pub struct FileShare {
    pub name: String,
    pub quota_gb: u32,
}

/// Outcome of an idempotent share creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Created,
    AlreadyExists,
}

/// The network resources belonging to one VM. Ephemeral: only the VM
/// name that references the stack is persisted.
#[derive(Debug, Clone)]
pub struct NetworkStack {
    pub vnet: VirtualNetwork,
    pub public_ip: PublicIp,
    pub private_ip: String,
    pub interface: NetworkInterface,
}

impl NetworkStack {
    /// The fully-qualified domain name of the public address.
    pub fn fqdn(&self) -> &str {
        &self.public_ip.fqdn
    }

    /// ID of the subnet the VM's NIC is attached to.
    pub fn subnet_id(&self) -> crate::error::Result<&str> {
        self.interface
            .ip_configurations
            .first()
            .map(|ip_config| ip_config.subnet_id.as_str())
            .ok_or_else(|| {
                crate::DeployError::Provider(format!(
                    "NIC {} has no IP configurations",
                    self.interface.id
                ))
            })
    }
}
