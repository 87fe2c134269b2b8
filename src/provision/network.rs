//! Network stack provisioning for the manager VM.
//!
//! The stack is built strictly in dependency order: public IP, then
//! virtual network, then the NIC referencing both. Each create is awaited
//! to completion before the next starts.

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::provider::types::{NetworkInterface, NetworkStack, Scope};
use crate::provider::CloudApi;

/// Create a virtual network, a public IP, and a NIC, all named after the
/// VM they will serve.
pub async fn create_network_stack(
    api: &dyn CloudApi,
    config: &DeployConfig,
    basename: &str,
) -> Result<NetworkStack> {
    let scope = Scope::from_config(config);

    tracing::info!(
        resource_group = scope.resource_group,
        location = scope.location,
        ip_name = format!("{basename}-ip"),
        dns_label = basename,
        "creating public IP"
    );
    let public_ip = api
        .create_public_ip(&scope, &format!("{basename}-ip"), basename)
        .await?;
    tracing::info!(
        public_ip = public_ip.ip_address,
        fqdn = public_ip.fqdn,
        "public IP created"
    );

    tracing::info!(
        resource_group = scope.resource_group,
        vnet_name = format!("{basename}-vnet"),
        "creating virtual network"
    );
    let vnet = api
        .create_virtual_network(&scope, &format!("{basename}-vnet"))
        .await?;

    let subnet = vnet.subnets.first().ok_or_else(|| {
        DeployError::Provider(format!("virtual network {} has no subnet", vnet.name))
    })?;

    tracing::info!(
        resource_group = scope.resource_group,
        nic_name = format!("{basename}-nic"),
        vnet = vnet.name,
        subnet = subnet.name,
        "creating network interface"
    );
    let interface = api
        .create_network_interface(&scope, &format!("{basename}-nic"), &subnet.id, &public_ip.id)
        .await?;

    let private_ip = find_private_ip(&interface)?;
    Ok(NetworkStack {
        vnet,
        public_ip,
        private_ip,
        interface,
    })
}

/// Reconstruct the network stack of an existing VM from its NIC
/// reference.
pub async fn get_network_stack(api: &dyn CloudApi, nic_id: &str) -> Result<NetworkStack> {
    let interface = api.get_network_interface(nic_id).await?;

    let public_ip_id = interface.public_ip_id.as_deref().ok_or_else(|| {
        DeployError::Provider(format!("NIC {} has no public IP", interface.id))
    })?;
    let public_ip = api.get_public_ip(public_ip_id).await?;

    let subnet_id = interface
        .ip_configurations
        .first()
        .map(|ip_config| ip_config.subnet_id.clone())
        .ok_or_else(|| {
            DeployError::Provider(format!("NIC {} has no IP configurations", interface.id))
        })?;
    let vnet = api.get_virtual_network_of_subnet(&subnet_id).await?;

    let private_ip = find_private_ip(&interface)?;
    Ok(NetworkStack {
        vnet,
        public_ip,
        private_ip,
        interface,
    })
}

fn find_private_ip(interface: &NetworkInterface) -> Result<String> {
    interface
        .ip_configurations
        .iter()
        .find_map(|ip_config| {
            ip_config
                .private_ip
                .as_ref()
                .filter(|address| !address.is_empty())
                .cloned()
        })
        .ok_or_else(|| {
            DeployError::Provider(format!(
                "NIC {} has no private IP address",
                interface.id
            ))
        })
}
