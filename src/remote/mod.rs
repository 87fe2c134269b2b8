//! Remote execution channel.
//!
//! Opens an authenticated SSH session to the freshly created manager VM,
//! runs idempotent setup commands, uploads configuration artifacts, and
//! streams install-script output. Host verification is disabled: the
//! machine was just created, so its identity cannot be known in advance.
//! Every remote failure is fatal to the run; the VM is disposable, the
//! recovery mechanism is rerunning the tool.

mod artifacts;

pub use artifacts::{Artifact, INSTALL_SCRIPT, MANAGER_SERVICE_UNIT};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::{load_secret_key, PrivateKey, PrivateKeyWithHashAlg};
use russh::{ChannelMsg, Disconnect};
use tokio::io::AsyncWriteExt;

use crate::error::{DeployError, Result};
use crate::{ADMIN_USERNAME, INSTALL_SCRIPT_NAME, UNIX_GROUP_NAME};

/// Bound on establishing the TCP+SSH connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A streaming remote command that produces no output for this long is
/// treated as failed.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// SSH authentication material: a local private key and/or a reachable
/// SSH agent. It is an error to have neither.
pub struct SshAuth {
    key: Option<Arc<PrivateKey>>,
    use_agent: bool,
}

impl SshAuth {
    /// Try the usual key files and the `SSH_AUTH_SOCK` agent.
    pub fn load() -> Result<Self> {
        let key = load_keyfile();
        let use_agent = agent_available();

        if key.is_none() && !use_agent {
            return Err(DeployError::Config(
                "no SSH key available: no usable key in ~/.ssh and no SSH agent".to_string(),
            ));
        }
        Ok(Self { key, use_agent })
    }
}

fn load_keyfile() -> Option<Arc<PrivateKey>> {
    let home = std::env::var("HOME").ok()?;
    for name in ["id_ed25519", "id_rsa"] {
        let path = std::path::Path::new(&home).join(".ssh").join(name);
        if !path.exists() {
            continue;
        }
        match load_secret_key(&path, None) {
            Ok(key) => return Some(Arc::new(key)),
            Err(err) => {
                tracing::info!(keyfile = %path.display(), error = %err, "unable to load private SSH key");
            }
        }
    }
    None
}

fn agent_available() -> bool {
    match std::env::var("SSH_AUTH_SOCK") {
        Ok(sock) if !sock.is_empty() => true,
        _ => {
            tracing::info!("no SSH_AUTH_SOCK set, not using SSH agent");
            false
        }
    }
}

/// Accept any host key; the target was created moments ago.
struct AcceptAllHost;

impl client::Handler for AcceptAllHost {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// One authenticated SSH connection.
pub struct Connection {
    handle: Handle<AcceptAllHost>,
    address: String,
}

impl Connection {
    /// Connect and authenticate to `address` (`:22` is appended when no
    /// port is given).
    pub async fn connect(auth: &SshAuth, address: &str) -> Result<Connection> {
        let address = if address.contains(':') {
            address.to_string()
        } else {
            format!("{address}:22")
        };
        tracing::info!(remote_address = address, "connecting via SSH");

        let config = Arc::new(client::Config {
            inactivity_timeout: Some(COMMAND_TIMEOUT),
            ..Default::default()
        });
        let mut handle = tokio::time::timeout(
            CONNECT_TIMEOUT,
            client::connect(config, address.as_str(), AcceptAllHost),
        )
        .await
        .map_err(|_| DeployError::Timeout(format!("connecting to {address}")))??;

        if !authenticate(&mut handle, auth).await? {
            return Err(DeployError::Remote(format!(
                "SSH authentication to {address} failed"
            )));
        }

        Ok(Connection { handle, address })
    }

    /// Run one command in its own session and return the combined,
    /// trimmed output. Non-zero exit is an error.
    pub async fn run(&self, command: &str) -> Result<String> {
        tracing::info!(remote_address = self.address, command, "running command via SSH");

        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut output = Vec::new();
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, .. } => output.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }

        let output = String::from_utf8_lossy(&output).trim().to_string();
        match exit_status {
            Some(0) => Ok(output),
            Some(code) => Err(DeployError::Remote(format!(
                "command {command:?} exited with status {code}: {output}"
            ))),
            None => Err(DeployError::Remote(format!(
                "command {command:?} ended without an exit status: {output}"
            ))),
        }
    }

    /// Run a command, logging its stdout/stderr line by line while it
    /// executes. The whole operation is bounded by a five-minute
    /// timeout.
    pub async fn run_streaming(&self, command: &str) -> Result<()> {
        tracing::info!(remote_address = self.address, command, "running command via SSH");

        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let stream = async {
            let mut stdout_line = Vec::new();
            let mut stderr_line = Vec::new();
            let mut exit_status = None;
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { ref data } => emit_lines(&mut stdout_line, data, "stdout"),
                    ChannelMsg::ExtendedData { ref data, .. } => {
                        emit_lines(&mut stderr_line, data, "stderr")
                    }
                    ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                    _ => {}
                }
            }
            flush_line(&mut stdout_line, "stdout");
            flush_line(&mut stderr_line, "stderr");
            exit_status
        };

        let exit_status = tokio::time::timeout(COMMAND_TIMEOUT, stream)
            .await
            .map_err(|_| {
                DeployError::Timeout(format!("waiting for output of command {command:?}"))
            })?;

        match exit_status {
            Some(0) => {
                tracing::debug!(command, "command completed");
                Ok(())
            }
            Some(code) => Err(DeployError::Remote(format!(
                "command {command:?} exited with status {code}"
            ))),
            None => Err(DeployError::Remote(format!(
                "command {command:?} ended without an exit status"
            ))),
        }
    }

    /// Send bytes to the remote host, storing them in a file in the
    /// admin home directory. The write side runs concurrently with the
    /// receiving `cat`, so large artifacts never deadlock the pipe.
    /// The filename must be simple: no spaces, no directory, nothing
    /// needing shell escaping.
    pub async fn upload(&self, content: Vec<u8>, filename: &str) -> Result<()> {
        tracing::info!(remote_address = self.address, filename, "sending file");

        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, format!("cat > {filename}")).await?;

        let mut writer = channel.make_writer();
        let send = tokio::spawn(async move {
            writer.write_all(&content).await?;
            writer.shutdown().await
        });

        let mut output = Vec::new();
        let mut exit_status = None;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, .. } => output.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }
        send.await
            .map_err(|err| DeployError::Remote(format!("upload writer task failed: {err}")))??;

        match exit_status {
            Some(0) => Ok(()),
            status => Err(DeployError::Remote(format!(
                "uploading {filename} failed (status {status:?}): {}",
                String::from_utf8_lossy(&output).trim()
            ))),
        }
    }

    /// Read a local file and upload it under its base name.
    pub async fn upload_local_file(&self, path: &std::path::Path) -> Result<()> {
        let contents = std::fs::read(path)?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| DeployError::Config(format!("bad file name: {}", path.display())))?;
        self.upload(contents, filename).await
    }

    /// Create the service user group and add the admin account to it.
    /// A reconnect is needed afterwards for the membership to apply.
    pub async fn setup_users(&self) -> Result<()> {
        tracing::info!(remote_address = self.address, "setting up users");
        self.run(&format!("sudo groupadd --force {UNIX_GROUP_NAME}")).await?;
        self.run(&format!(
            "sudo usermod {ADMIN_USERNAME} --append --groups {UNIX_GROUP_NAME}"
        ))
        .await?;
        Ok(())
    }

    /// Run the uploaded install script, streaming its output.
    pub async fn run_install_script(&self) -> Result<()> {
        self.run(&format!("chmod +x {INSTALL_SCRIPT_NAME}")).await?;
        self.run_streaming(&format!("bash {INSTALL_SCRIPT_NAME}")).await?;
        tracing::info!(script = INSTALL_SCRIPT_NAME, "installation script completed");
        Ok(())
    }

    /// Best-effort close; runs during cleanup, so failure is only
    /// logged.
    pub async fn close(self) {
        let result = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await;
        if let Err(err) = result {
            tracing::error!(remote_address = self.address, error = %err, "error closing SSH connection");
        }
    }
}

async fn authenticate(handle: &mut Handle<AcceptAllHost>, auth: &SshAuth) -> Result<bool> {
    if let Some(key) = &auth.key {
        let key = PrivateKeyWithHashAlg::new(Arc::clone(key), None);
        let result = handle.authenticate_publickey(ADMIN_USERNAME, key).await?;
        if result.success() {
            return Ok(true);
        }
        tracing::info!("key file authentication rejected, trying next method");
    }

    if auth.use_agent {
        let mut agent = AgentClient::connect_env().await?;
        let identities = agent.request_identities().await?;
        if identities.is_empty() {
            tracing::warn!("no keys loaded in SSH agent");
        }
        for identity in identities {
            let result = handle
                .authenticate_publickey_with(ADMIN_USERNAME, identity, None, &mut agent)
                .await
                .map_err(|err| DeployError::Remote(format!("SSH agent authentication: {err}")))?;
            if result.success() {
                tracing::info!("authenticated via SSH agent");
                return Ok(true);
            }
        }
    }

    Ok(false)
}

/// Append a chunk to the pending line buffer, logging every completed
/// line on the given channel.
fn emit_lines(pending: &mut Vec<u8>, chunk: &[u8], channel: &str) {
    for byte in chunk {
        if *byte == b'\n' {
            flush_line(pending, channel);
        } else {
            pending.push(*byte);
        }
    }
}

fn flush_line(pending: &mut Vec<u8>, channel: &str) {
    if pending.is_empty() {
        return;
    }
    let line = String::from_utf8_lossy(pending);
    tracing::info!(channel, "{}", line.trim_end());
    pending.clear();
}

/// The remote setup phase as one operation, so the workflow driver can
/// be tested without a live SSH server.
#[async_trait]
pub trait RemoteInstaller: Send + Sync {
    /// Prepare users on the target machine, upload all artifacts, and
    /// run the install script.
    async fn install(&self, address: &str, artifacts: &[Artifact]) -> Result<()>;
}

/// Real installer backed by SSH.
pub struct SshInstaller {
    auth: SshAuth,
}

impl SshInstaller {
    pub fn new(auth: SshAuth) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl RemoteInstaller for SshInstaller {
    async fn install(&self, address: &str, artifacts: &[Artifact]) -> Result<()> {
        let connection = Connection::connect(&self.auth, address).await?;
        let setup = connection.setup_users().await;
        connection.close().await;
        setup?;

        // Reconnect so the admin user's new group membership is in
        // effect for the install script.
        let connection = Connection::connect(&self.auth, address).await?;
        let result = async {
            for artifact in artifacts {
                connection
                    .upload(artifact.contents.clone(), &artifact.name)
                    .await?;
            }
            connection.run_install_script().await
        }
        .await;
        connection.close().await;
        result
    }
}
