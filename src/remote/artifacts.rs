//! Install artifacts uploaded to the manager VM.
//!
//! The static files are compiled into the binary so the tool is
//! self-contained; templated files are rendered at run time and arrive
//! here as plain bytes.

/// systemd unit for the farm manager, uploaded verbatim.
pub static MANAGER_SERVICE_UNIT: &str = include_str!("../files/static/farm-manager.service");

/// The VM installation script, uploaded verbatim and then executed.
pub static INSTALL_SCRIPT: &str = include_str!("../files/static/farm-manager-setup-vm.sh");

/// One named file destined for the remote home directory.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: String,
    pub contents: Vec<u8>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}
