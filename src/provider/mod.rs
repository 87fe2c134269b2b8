//! The provider seam.
//!
//! Everything the workflow needs from the cloud management API is behind
//! the [`CloudApi`] trait: listing and creating resources, waiting for
//! creation to complete, and fetching secrets. The trait methods return
//! only once the resource is fully provisioned; polling/waiting semantics
//! live inside the implementation. Tests substitute a mock.

pub mod credentials;
pub mod rest;
pub mod types;

use async_trait::async_trait;

use crate::config::StorageCredentials;
use crate::error::Result;
use types::{
    ComputeAccount, FileShare, NameAvailability, NetworkInterface, PoolSpec, PublicIp,
    ResourceGroup, Scope, ShareOutcome, StorageAccount, StorageKey, Subscription, VirtualNetwork,
    VmInfo, VmParams,
};

#[async_trait]
pub trait CloudApi: Send + Sync {
    // Identity.
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>>;
    async fn list_locations(&self, subscription_id: &str) -> Result<Vec<types::Location>>;

    // Resource groups.
    async fn list_resource_groups(&self, subscription_id: &str) -> Result<Vec<ResourceGroup>>;
    /// Create-or-update; calling it for an existing group is not an error.
    async fn create_resource_group(&self, scope: &Scope, name: &str) -> Result<ResourceGroup>;

    // Storage.
    async fn check_storage_name(&self, subscription_id: &str, name: &str)
        -> Result<NameAvailability>;
    async fn create_storage_account(&self, scope: &Scope, name: &str) -> Result<StorageAccount>;
    async fn storage_account_keys(&self, scope: &Scope, account: &str) -> Result<Vec<StorageKey>>;
    /// Hostname serving the account's file shares, used for mount lines.
    fn storage_host(&self, account: &str) -> String;
    async fn ensure_file_share(
        &self,
        credentials: &StorageCredentials,
        share: &FileShare,
    ) -> Result<ShareOutcome>;

    // Compute account and worker pool.
    async fn create_compute_account(&self, scope: &Scope, name: &str) -> Result<ComputeAccount>;
    async fn list_pools(&self, scope: &Scope, compute_account: &str) -> Result<Vec<String>>;
    async fn create_pool(&self, scope: &Scope, compute_account: &str, spec: &PoolSpec)
        -> Result<()>;

    // Network.
    async fn create_public_ip(&self, scope: &Scope, name: &str, dns_label: &str)
        -> Result<PublicIp>;
    async fn create_virtual_network(&self, scope: &Scope, name: &str) -> Result<VirtualNetwork>;
    async fn create_network_interface(
        &self,
        scope: &Scope,
        name: &str,
        subnet_id: &str,
        public_ip_id: &str,
    ) -> Result<NetworkInterface>;
    async fn get_network_interface(&self, nic_id: &str) -> Result<NetworkInterface>;
    async fn get_public_ip(&self, public_ip_id: &str) -> Result<PublicIp>;
    async fn get_virtual_network_of_subnet(&self, subnet_id: &str) -> Result<VirtualNetwork>;

    // Virtual machines.
    async fn list_vms(&self, scope: &Scope) -> Result<Vec<VmInfo>>;
    async fn get_vm(&self, scope: &Scope, name: &str) -> Result<VmInfo>;
    /// Raw status codes from the instance view, e.g.
    /// `ProvisioningState/succeeded` and `PowerState/running`.
    async fn vm_statuses(&self, scope: &Scope, name: &str) -> Result<Vec<String>>;
    async fn create_vm(&self, scope: &Scope, params: &VmParams) -> Result<VmInfo>;
}
