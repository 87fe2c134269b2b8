//! Config document persistence: load defaults, secret generation,
//! round-tripping, and the crash-safe two-phase save.

use farm_deploy::config::{DeployConfig, PoolConfig, StorageCredentials};

#[test]
fn test_load_missing_file_generates_secret_and_persists_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("farm_deploy.yaml");

    let config = DeployConfig::load(&path).unwrap();
    // 64 random bytes, URL-safe base64, no padding.
    assert_eq!(config.worker_registration_secret.len(), 86);
    assert!(!config.worker_registration_secret.contains('='));
    assert!(path.exists(), "generating the secret must save the file");

    let reloaded = DeployConfig::load(&path).unwrap();
    assert_eq!(
        reloaded.worker_registration_secret, config.worker_registration_secret,
        "a rerun must keep using the same secret"
    );
}

#[test]
fn test_round_trip_preserves_all_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("farm_deploy.yaml");

    let mut config = DeployConfig::load(&path).unwrap();
    config.default_name = "farm".to_string();
    config.subscription_id = "sub-1".to_string();
    config.location = "westeurope".to_string();
    config.resource_group = "farm-rg".to_string();
    config.storage_account = "farmstorage".to_string();
    config.compute_account = "farmcompute".to_string();
    config.vm_name = "farm-vm".to_string();
    config.pool = Some(PoolConfig {
        pool_id: "farm-pool".to_string(),
        vm_size: "Standard_F16s".to_string(),
        target_dedicated_nodes: 2,
        target_low_priority_nodes: 8,
    });
    config.save().unwrap();

    let reloaded = DeployConfig::load(&path).unwrap();
    assert_eq!(reloaded.default_name, "farm");
    assert_eq!(reloaded.subscription_id, "sub-1");
    assert_eq!(reloaded.location, "westeurope");
    assert_eq!(reloaded.resource_group, "farm-rg");
    assert_eq!(reloaded.storage_account, "farmstorage");
    assert_eq!(reloaded.compute_account, "farmcompute");
    assert_eq!(reloaded.vm_name, "farm-vm");
    assert_eq!(reloaded.pool, config.pool);
}

#[test]
fn test_saved_document_uses_stable_field_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("farm_deploy.yaml");

    let mut config = DeployConfig::load(&path).unwrap();
    config.subscription_id = "sub-1".to_string();
    config.resource_group = "farm-rg".to_string();
    config.storage_account = "farmstorage".to_string();
    config.save().unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("subscriptionID:"));
    assert!(contents.contains("resourceGroup:"));
    assert!(contents.contains("storageAccountName:"));
    assert!(contents.contains("workerRegistrationSecret:"));
    // Empty identities are omitted entirely, not written as "".
    assert!(!contents.contains("computeAccountName"));
    assert!(!contents.contains("virtualMachine"));
}

#[test]
fn test_storage_key_is_never_written_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("farm_deploy.yaml");

    let mut config = DeployConfig::load(&path).unwrap();
    config.storage_account = "farmstorage".to_string();
    config.storage_credentials = Some(StorageCredentials {
        username: "farmstorage".to_string(),
        password: "super-secret-access-key".to_string(),
    });
    config.save().unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(!contents.contains("super-secret-access-key"));
}

#[test]
fn test_interrupted_save_leaves_original_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("farm_deploy.yaml");

    let mut config = DeployConfig::load(&path).unwrap();
    config.resource_group = "original-rg".to_string();
    config.save().unwrap();

    // A crash between staging and committing must not corrupt the
    // document that is already on disk.
    config.resource_group = "updated-rg".to_string();
    let staged = config.stage_save().unwrap();
    assert_eq!(staged, dir.path().join("farm_deploy.yaml~"));

    let on_disk = DeployConfig::load(&path).unwrap();
    assert_eq!(on_disk.resource_group, "original-rg");

    config.commit_save(&staged).unwrap();
    let on_disk = DeployConfig::load(&path).unwrap();
    assert_eq!(on_disk.resource_group, "updated-rg");
    assert!(!staged.exists());
}

#[test]
fn test_unparsable_file_is_an_error_not_a_reset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("farm_deploy.yaml");
    std::fs::write(&path, "subscriptionID: [this is: not: valid").unwrap();

    assert!(DeployConfig::load(&path).is_err());
}
