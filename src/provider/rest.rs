//! Thin HTTP client for the management API.
//!
//! Each method is a direct wrapper around one or two REST calls; the only
//! logic of note is [`RestApi::wait_provisioned`], which polls a resource
//! until the provider reports it fully provisioned. Requests race against
//! the shared cancellation token.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::credentials::ApiCredentials;
use super::types::*;
use super::CloudApi;
use crate::config::StorageCredentials;
use crate::error::{DeployError, Result};

/// Interval between provisioning-state polls.
const PROVISION_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Give up waiting for a single resource after this long.
const PROVISION_DEADLINE: Duration = Duration::from_secs(300);

pub struct RestApi {
    client: reqwest::Client,
    endpoint: String,
    /// Domain under which storage accounts expose their file shares.
    storage_domain: String,
    token: String,
    cancel: CancellationToken,
}

/// List responses come wrapped in a `value` envelope.
#[derive(Deserialize)]
struct Listing<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
struct ProvisioningState {
    #[serde(rename = "provisioningState", default)]
    provisioning_state: String,
}

#[derive(Deserialize)]
struct KeyListing {
    keys: Vec<StorageKey>,
}

#[derive(Deserialize)]
struct InstanceView {
    statuses: Vec<String>,
}

#[derive(Deserialize)]
struct PoolListing {
    value: Vec<PoolId>,
}

#[derive(Deserialize)]
struct PoolId {
    id: String,
}

impl RestApi {
    pub fn new(credentials: &ApiCredentials, cancel: CancellationToken) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        let endpoint = credentials.management_endpoint.trim_end_matches('/').to_string();
        let storage_domain = storage_domain(&endpoint)?;

        Ok(Self {
            client,
            endpoint,
            storage_domain,
            token: credentials.token.clone(),
            cancel,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// Send a request, racing the cancellation token, and fail on any
    /// non-success status.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let request = request.bearer_auth(&self.token);
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(DeployError::Cancelled),
            response = request.send() => response?,
        };
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DeployError::Provider(format!(
                "{status}: {}",
                body.trim()
            )));
        }
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.client.get(self.url(path))).await?;
        Ok(response.json().await?)
    }

    async fn put<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        let response = self.send(self.client.put(self.url(path)).json(&body)).await?;
        Ok(response.json().await?)
    }

    /// Poll a resource path until the provider reports it provisioned.
    async fn wait_provisioned(&self, path: &str) -> Result<()> {
        let deadline = tokio::time::Instant::now() + PROVISION_DEADLINE;
        loop {
            let state: ProvisioningState = self.get(path).await?;
            match state.provisioning_state.as_str() {
                "Succeeded" => return Ok(()),
                "Failed" => {
                    return Err(DeployError::Provider(format!(
                        "provisioning of {path} failed"
                    )))
                }
                other => {
                    tracing::debug!(path, state = other, "resource not provisioned yet");
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DeployError::Timeout(format!(
                    "waiting for {path} to provision"
                )));
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(DeployError::Cancelled),
                _ = tokio::time::sleep(PROVISION_POLL_INTERVAL) => {}
            }
        }
    }

    /// PUT a resource, wait for it to provision, then fetch its final
    /// representation.
    async fn create_and_wait<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let _: serde_json::Value = self.put(path, body).await?;
        self.wait_provisioned(path).await?;
        self.get(path).await
    }

    fn group_path(&self, scope: &Scope) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}",
            scope.subscription_id, scope.resource_group
        )
    }
}

/// Derive the file share domain from the management endpoint, e.g.
/// `https://api.example.cloud` serves shares under `files.example.cloud`.
fn storage_domain(endpoint: &str) -> Result<String> {
    let host = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .unwrap_or(endpoint);
    let host = host.split('/').next().unwrap_or(host);
    let base = host.strip_prefix("api.").unwrap_or(host);
    if base.is_empty() {
        return Err(DeployError::Config(format!(
            "cannot derive storage domain from endpoint {endpoint:?}"
        )));
    }
    Ok(format!("files.{base}"))
}

#[async_trait]
impl CloudApi for RestApi {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let listing: Listing<Subscription> = self.get("/subscriptions").await?;
        Ok(listing.value)
    }

    async fn list_locations(&self, subscription_id: &str) -> Result<Vec<Location>> {
        let listing: Listing<Location> = self
            .get(&format!("/subscriptions/{subscription_id}/locations"))
            .await?;
        Ok(listing.value)
    }

    async fn list_resource_groups(&self, subscription_id: &str) -> Result<Vec<ResourceGroup>> {
        let listing: Listing<ResourceGroup> = self
            .get(&format!("/subscriptions/{subscription_id}/resourceGroups"))
            .await?;
        Ok(listing.value)
    }

    async fn create_resource_group(&self, scope: &Scope, name: &str) -> Result<ResourceGroup> {
        self.put(
            &format!("/subscriptions/{}/resourceGroups/{name}", scope.subscription_id),
            json!({ "location": scope.location }),
        )
        .await
    }

    async fn check_storage_name(
        &self,
        subscription_id: &str,
        name: &str,
    ) -> Result<NameAvailability> {
        let response = self
            .send(
                self.client
                    .post(self.url(&format!(
                        "/subscriptions/{subscription_id}/checkStorageNameAvailability"
                    )))
                    .json(&json!({ "name": name })),
            )
            .await?;
        Ok(response.json().await?)
    }

    async fn create_storage_account(&self, scope: &Scope, name: &str) -> Result<StorageAccount> {
        let path = format!("{}/storageAccounts/{name}", self.group_path(scope));
        self.create_and_wait(
            &path,
            json!({
                "location": scope.location,
                "sku": "standard",
            }),
        )
        .await
    }

    async fn storage_account_keys(&self, scope: &Scope, account: &str) -> Result<Vec<StorageKey>> {
        let path = format!("{}/storageAccounts/{account}/listKeys", self.group_path(scope));
        let response = self.send(self.client.post(self.url(&path))).await?;
        let listing: KeyListing = response.json().await?;
        Ok(listing.keys)
    }

    fn storage_host(&self, account: &str) -> String {
        format!("{account}.{}", self.storage_domain)
    }

    async fn ensure_file_share(
        &self,
        credentials: &StorageCredentials,
        share: &FileShare,
    ) -> Result<ShareOutcome> {
        let url = format!(
            "https://{}/shares/{}",
            self.storage_host(&credentials.username),
            share.name.to_lowercase(),
        );
        let request = self
            .client
            .put(&url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .json(&json!({ "quotaGB": share.quota_gb }));

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(DeployError::Cancelled),
            response = request.send() => response?,
        };
        match response.status() {
            status if status.is_success() => Ok(ShareOutcome::Created),
            reqwest::StatusCode::CONFLICT => Ok(ShareOutcome::AlreadyExists),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(DeployError::Provider(format!(
                    "creating share {}: {status}: {}",
                    share.name,
                    body.trim()
                )))
            }
        }
    }

    async fn create_compute_account(&self, scope: &Scope, name: &str) -> Result<ComputeAccount> {
        let path = format!("{}/computeAccounts/{name}", self.group_path(scope));
        self.create_and_wait(&path, json!({ "location": scope.location })).await
    }

    async fn list_pools(&self, scope: &Scope, compute_account: &str) -> Result<Vec<String>> {
        let path = format!(
            "{}/computeAccounts/{compute_account}/pools",
            self.group_path(scope)
        );
        let listing: PoolListing = self.get(&path).await?;
        Ok(listing.value.into_iter().map(|pool| pool.id).collect())
    }

    async fn create_pool(
        &self,
        scope: &Scope,
        compute_account: &str,
        spec: &PoolSpec,
    ) -> Result<()> {
        let path = format!(
            "{}/computeAccounts/{compute_account}/pools/{}",
            self.group_path(scope),
            spec.id
        );
        let _: serde_json::Value = self.put(&path, serde_json::to_value(spec).map_err(|err| {
            DeployError::Provider(format!("unable to serialize pool spec: {err}"))
        })?).await?;
        Ok(())
    }

    async fn create_public_ip(
        &self,
        scope: &Scope,
        name: &str,
        dns_label: &str,
    ) -> Result<PublicIp> {
        let path = format!("{}/publicIPAddresses/{name}", self.group_path(scope));
        self.create_and_wait(
            &path,
            json!({
                "location": scope.location,
                "allocationMethod": "static",
                "dnsLabel": dns_label,
            }),
        )
        .await
    }

    async fn create_virtual_network(&self, scope: &Scope, name: &str) -> Result<VirtualNetwork> {
        let path = format!("{}/virtualNetworks/{name}", self.group_path(scope));
        self.create_and_wait(
            &path,
            json!({
                "location": scope.location,
                "addressPrefixes": ["10.0.0.0/8"],
                "subnets": [{
                    "name": "default",
                    "addressPrefix": "10.0.0.0/16",
                    "serviceEndpoints": ["storage"],
                }],
            }),
        )
        .await
    }

    async fn create_network_interface(
        &self,
        scope: &Scope,
        name: &str,
        subnet_id: &str,
        public_ip_id: &str,
    ) -> Result<NetworkInterface> {
        let path = format!("{}/networkInterfaces/{name}", self.group_path(scope));
        self.create_and_wait(
            &path,
            json!({
                "location": scope.location,
                "subnetID": subnet_id,
                "publicIPID": public_ip_id,
                "privateIPAllocationMethod": "dynamic",
            }),
        )
        .await
    }

    async fn get_network_interface(&self, nic_id: &str) -> Result<NetworkInterface> {
        self.get(nic_id).await
    }

    async fn get_public_ip(&self, public_ip_id: &str) -> Result<PublicIp> {
        self.get(public_ip_id).await
    }

    async fn get_virtual_network_of_subnet(&self, subnet_id: &str) -> Result<VirtualNetwork> {
        // Subnet IDs are resource paths of the form
        // `<vnet id>/subnets/<name>`.
        let vnet_id = subnet_id.split("/subnets/").next().ok_or_else(|| {
            DeployError::Provider(format!("malformed subnet ID {subnet_id:?}"))
        })?;
        self.get(vnet_id).await
    }

    async fn list_vms(&self, scope: &Scope) -> Result<Vec<VmInfo>> {
        let path = format!("{}/virtualMachines", self.group_path(scope));
        let listing: Listing<VmInfo> = self.get(&path).await?;
        Ok(listing.value)
    }

    async fn get_vm(&self, scope: &Scope, name: &str) -> Result<VmInfo> {
        self.get(&format!("{}/virtualMachines/{name}", self.group_path(scope)))
            .await
    }

    async fn vm_statuses(&self, scope: &Scope, name: &str) -> Result<Vec<String>> {
        let path = format!(
            "{}/virtualMachines/{name}/instanceView",
            self.group_path(scope)
        );
        let view: InstanceView = self.get(&path).await?;
        Ok(view.statuses)
    }

    async fn create_vm(&self, scope: &Scope, params: &VmParams) -> Result<VmInfo> {
        let path = format!("{}/virtualMachines/{}", self.group_path(scope), params.name);
        self.create_and_wait(
            &path,
            json!({
                "location": scope.location,
                "size": params.size,
                "image": {
                    "publisher": "canonical",
                    "offer": "ubuntu-server",
                    "sku": "22.04-lts",
                    "version": "latest",
                },
                "osProfile": {
                    "computerName": params.name,
                    "adminUsername": params.admin_username,
                    "adminPassword": params.admin_password,
                    "sshAuthorizedKey": params.ssh_public_key,
                },
                "networkInterfaceIDs": [params.nic_id],
            }),
        )
        .await
    }
}
