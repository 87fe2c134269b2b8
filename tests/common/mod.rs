//! Shared test doubles: a scriptable cloud API, prompter and installer.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use farm_deploy::config::{DeployConfig, StorageCredentials};
use farm_deploy::error::{DeployError, Result};
use farm_deploy::prompt::Prompt;
use farm_deploy::provider::types::{
    ComputeAccount, FileShare, IpConfiguration, Location, NameAvailability, NetworkInterface,
    NetworkStack, PoolSpec, PublicIp, ResourceGroup, Scope, ShareOutcome, StorageAccount,
    StorageKey, Subnet, Subscription, VirtualNetwork, VmInfo, VmParams,
};
use farm_deploy::provider::CloudApi;
use farm_deploy::remote::{Artifact, RemoteInstaller};

pub const TEST_STORAGE_KEY: &str = "dGVzdC1zdG9yYWdlLWtleQ";

/// In-memory provider. Pre-populate the fields to script responses;
/// every call is appended to `calls` so tests can assert on what the
/// workflow did (and did not) touch.
#[derive(Default)]
pub struct MockApi {
    pub subscriptions: Vec<Subscription>,
    pub locations: Vec<Location>,
    pub resource_groups: Mutex<Vec<ResourceGroup>>,
    /// Resource group names whose creation fails.
    pub failing_groups: Vec<String>,
    /// Storage account names reported as taken.
    pub unavailable_names: Vec<String>,
    pub vms: Mutex<Vec<VmInfo>>,
    /// Consumed front to back, one entry per `vm_statuses` call; when
    /// exhausted the VM reports ready.
    pub vm_status_script: Mutex<VecDeque<Vec<String>>>,
    pub pools: Mutex<Vec<String>>,
    pub created_pools: Mutex<Vec<PoolSpec>>,
    pub shares: Mutex<Vec<String>>,
    pub nic: Mutex<Option<NetworkInterface>>,
    pub public_ip: Mutex<Option<PublicIp>>,
    pub vnet: Mutex<Option<VirtualNetwork>>,
    pub calls: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| *call == name)
            .count()
    }

    /// Prepare the network resources of an already-provisioned VM, so
    /// the existing-VM path can reconstruct its network stack.
    pub fn with_existing_network(self, nic_id: &str, subnet_id: &str, fqdn: &str) -> Self {
        *self.nic.lock().unwrap() = Some(NetworkInterface {
            id: nic_id.to_string(),
            name: format!("{nic_id}-name"),
            ip_configurations: vec![IpConfiguration {
                private_ip: Some("10.0.0.4".to_string()),
                subnet_id: subnet_id.to_string(),
            }],
            public_ip_id: Some("ip-existing".to_string()),
        });
        *self.public_ip.lock().unwrap() = Some(PublicIp {
            id: "ip-existing".to_string(),
            name: "ip-existing-name".to_string(),
            ip_address: "203.0.113.10".to_string(),
            fqdn: fqdn.to_string(),
        });
        *self.vnet.lock().unwrap() = Some(VirtualNetwork {
            id: "vnet-existing".to_string(),
            name: "vnet-existing-name".to_string(),
            subnets: vec![Subnet {
                id: subnet_id.to_string(),
                name: "default".to_string(),
            }],
        });
        self
    }
}

#[async_trait]
impl CloudApi for MockApi {
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.record("list_subscriptions");
        Ok(self.subscriptions.clone())
    }

    async fn list_locations(&self, _subscription_id: &str) -> Result<Vec<Location>> {
        self.record("list_locations");
        Ok(self.locations.clone())
    }

    async fn list_resource_groups(&self, _subscription_id: &str) -> Result<Vec<ResourceGroup>> {
        self.record("list_resource_groups");
        Ok(self.resource_groups.lock().unwrap().clone())
    }

    async fn create_resource_group(&self, scope: &Scope, name: &str) -> Result<ResourceGroup> {
        self.record("create_resource_group");
        if self.failing_groups.iter().any(|failing| failing == name) {
            return Err(DeployError::Provider(format!(
                "creation of resource group {name} rejected"
            )));
        }
        let group = ResourceGroup {
            name: name.to_string(),
            location: scope.location.clone(),
        };
        self.resource_groups.lock().unwrap().push(group.clone());
        Ok(group)
    }

    async fn check_storage_name(
        &self,
        _subscription_id: &str,
        name: &str,
    ) -> Result<NameAvailability> {
        self.record("check_storage_name");
        let taken = self.unavailable_names.iter().any(|taken| taken == name);
        Ok(NameAvailability {
            available: !taken,
            reason: taken.then(|| "AlreadyExists".to_string()),
            message: None,
        })
    }

    async fn create_storage_account(&self, _scope: &Scope, name: &str) -> Result<StorageAccount> {
        self.record("create_storage_account");
        Ok(StorageAccount {
            name: name.to_string(),
        })
    }

    async fn storage_account_keys(&self, _scope: &Scope, _account: &str) -> Result<Vec<StorageKey>> {
        self.record("storage_account_keys");
        Ok(vec![StorageKey {
            key_name: "key1".to_string(),
            value: TEST_STORAGE_KEY.to_string(),
        }])
    }

    fn storage_host(&self, account: &str) -> String {
        format!("{account}.files.example.com")
    }

    async fn ensure_file_share(
        &self,
        _credentials: &StorageCredentials,
        share: &FileShare,
    ) -> Result<ShareOutcome> {
        self.record("ensure_file_share");
        let mut shares = self.shares.lock().unwrap();
        if shares.iter().any(|existing| *existing == share.name) {
            return Ok(ShareOutcome::AlreadyExists);
        }
        shares.push(share.name.clone());
        Ok(ShareOutcome::Created)
    }

    async fn create_compute_account(&self, _scope: &Scope, name: &str) -> Result<ComputeAccount> {
        self.record("create_compute_account");
        Ok(ComputeAccount {
            name: name.to_string(),
        })
    }

    async fn list_pools(&self, _scope: &Scope, _compute_account: &str) -> Result<Vec<String>> {
        self.record("list_pools");
        Ok(self.pools.lock().unwrap().clone())
    }

    async fn create_pool(
        &self,
        _scope: &Scope,
        _compute_account: &str,
        spec: &PoolSpec,
    ) -> Result<()> {
        self.record("create_pool");
        self.pools.lock().unwrap().push(spec.id.clone());
        self.created_pools.lock().unwrap().push(spec.clone());
        Ok(())
    }

    async fn create_public_ip(
        &self,
        _scope: &Scope,
        name: &str,
        dns_label: &str,
    ) -> Result<PublicIp> {
        self.record("create_public_ip");
        let public_ip = PublicIp {
            id: format!("/ids/{name}"),
            name: name.to_string(),
            ip_address: "203.0.113.20".to_string(),
            fqdn: format!("{dns_label}.westeurope.cloudapp.example.com"),
        };
        *self.public_ip.lock().unwrap() = Some(public_ip.clone());
        Ok(public_ip)
    }

    async fn create_virtual_network(&self, _scope: &Scope, name: &str) -> Result<VirtualNetwork> {
        self.record("create_virtual_network");
        let vnet = VirtualNetwork {
            id: format!("/ids/{name}"),
            name: name.to_string(),
            subnets: vec![Subnet {
                id: format!("/ids/{name}/subnets/default"),
                name: "default".to_string(),
            }],
        };
        *self.vnet.lock().unwrap() = Some(vnet.clone());
        Ok(vnet)
    }

    async fn create_network_interface(
        &self,
        _scope: &Scope,
        name: &str,
        subnet_id: &str,
        public_ip_id: &str,
    ) -> Result<NetworkInterface> {
        self.record("create_network_interface");
        let nic = NetworkInterface {
            id: format!("/ids/{name}"),
            name: name.to_string(),
            ip_configurations: vec![IpConfiguration {
                private_ip: Some("10.0.0.4".to_string()),
                subnet_id: subnet_id.to_string(),
            }],
            public_ip_id: Some(public_ip_id.to_string()),
        };
        *self.nic.lock().unwrap() = Some(nic.clone());
        Ok(nic)
    }

    async fn get_network_interface(&self, nic_id: &str) -> Result<NetworkInterface> {
        self.record("get_network_interface");
        self.nic
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DeployError::Provider(format!("no such NIC: {nic_id}")))
    }

    async fn get_public_ip(&self, public_ip_id: &str) -> Result<PublicIp> {
        self.record("get_public_ip");
        self.public_ip
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DeployError::Provider(format!("no such public IP: {public_ip_id}")))
    }

    async fn get_virtual_network_of_subnet(&self, subnet_id: &str) -> Result<VirtualNetwork> {
        self.record("get_virtual_network_of_subnet");
        self.vnet
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DeployError::Provider(format!("no vnet for subnet: {subnet_id}")))
    }

    async fn list_vms(&self, _scope: &Scope) -> Result<Vec<VmInfo>> {
        self.record("list_vms");
        Ok(self.vms.lock().unwrap().clone())
    }

    async fn get_vm(&self, _scope: &Scope, name: &str) -> Result<VmInfo> {
        self.record("get_vm");
        self.vms
            .lock()
            .unwrap()
            .iter()
            .find(|vm| vm.name == name)
            .cloned()
            .ok_or_else(|| DeployError::Provider(format!("no such VM: {name}")))
    }

    async fn vm_statuses(&self, _scope: &Scope, _name: &str) -> Result<Vec<String>> {
        self.record("vm_statuses");
        let scripted = self.vm_status_script.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| {
            vec![
                "ProvisioningState/succeeded".to_string(),
                "PowerState/running".to_string(),
            ]
        }))
    }

    async fn create_vm(&self, scope: &Scope, params: &VmParams) -> Result<VmInfo> {
        self.record("create_vm");
        let vm = VmInfo {
            id: format!("/ids/{}", params.name),
            name: params.name.clone(),
            location: scope.location.clone(),
            nic_ids: vec![params.nic_id.clone()],
        };
        self.vms.lock().unwrap().push(vm.clone());
        Ok(vm)
    }
}

/// Prompter that answers from a pre-recorded script, front to back. An
/// exhausted script fails the test with the unanswered prompt.
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|answer| answer.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.lock().unwrap().len()
    }
}

#[async_trait]
impl Prompt for ScriptedPrompter {
    async fn read_line(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| DeployError::Prompt(format!("unscripted prompt: {prompt:?}")))
    }
}

/// Installer that records what would have been pushed to the VM.
#[derive(Default)]
pub struct RecordingInstaller {
    pub installed: Mutex<Option<(String, Vec<Artifact>)>>,
}

#[async_trait]
impl RemoteInstaller for RecordingInstaller {
    async fn install(&self, address: &str, artifacts: &[Artifact]) -> Result<()> {
        *self.installed.lock().unwrap() = Some((address.to_string(), artifacts.to_vec()));
        Ok(())
    }
}

/// A config document backed by a file in `dir`, with enough identity
/// filled in for provisioning calls to have a scope.
pub fn scoped_config(dir: &tempfile::TempDir) -> DeployConfig {
    let mut config = DeployConfig::load(dir.path().join("farm_deploy.yaml")).unwrap();
    config.subscription_id = "sub-1".to_string();
    config.location = "westeurope".to_string();
    config.resource_group = "test-rg".to_string();
    config
}

/// Network stack as it looks after provisioning, for pool spec tests.
pub fn test_network_stack() -> NetworkStack {
    NetworkStack {
        vnet: VirtualNetwork {
            id: "/ids/vnet".to_string(),
            name: "vnet".to_string(),
            subnets: vec![],
        },
        public_ip: PublicIp {
            id: "/ids/ip".to_string(),
            name: "ip".to_string(),
            ip_address: "203.0.113.20".to_string(),
            fqdn: "farm.westeurope.cloudapp.example.com".to_string(),
        },
        private_ip: "10.0.0.4".to_string(),
        interface: NetworkInterface {
            id: "/ids/nic".to_string(),
            name: "nic".to_string(),
            ip_configurations: vec![IpConfiguration {
                private_ip: Some("10.0.0.4".to_string()),
                subnet_id: "/ids/vnet/subnets/default".to_string(),
            }],
            public_ip_id: Some("/ids/ip".to_string()),
        },
    }
}
