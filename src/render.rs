//! Configuration template rendering.
//!
//! Templates are compiled into the binary so the tool is self-contained;
//! set `FARM_DEPLOY_TEMPLATES_DIR` to load them from the filesystem
//! instead during development.

use std::path::Path;

use serde::Serialize;
use tera::Tera;

use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::provider::types::NetworkStack;
use crate::UNIX_GROUP_NAME;

/// Templated config files, as (name, content) pairs for Tera.
pub const ALL_TEMPLATES: &[(&str, &str)] = &[
    ("farm-manager.yaml", include_str!("files/templated/farm-manager.yaml")),
    ("farm-worker.cfg", include_str!("files/templated/farm-worker.cfg")),
    (
        "farm-worker-startup.sh",
        include_str!("files/templated/farm-worker-startup.sh"),
    ),
];

/// Everything substituted into the templates.
#[derive(Debug, Clone, Serialize)]
pub struct RenderContext {
    /// Display name of the manager, derived from the VM name.
    pub name: String,
    /// Public domain name the manager's TLS certificate is issued for.
    pub domain_name: String,
    pub private_ip: String,
    pub worker_registration_secret: String,
    /// Mount-table fragment for the storage file shares.
    pub fstab_for_storage: String,
    pub unix_group_name: String,
}

impl RenderContext {
    pub fn new(config: &DeployConfig, net_stack: &NetworkStack, fstab: &str) -> Self {
        Self {
            name: title_case(&config.vm_name),
            domain_name: net_stack.fqdn().to_string(),
            private_ip: net_stack.private_ip.clone(),
            worker_registration_secret: config.worker_registration_secret.clone(),
            fstab_for_storage: fstab.to_string(),
            unix_group_name: UNIX_GROUP_NAME.to_string(),
        }
    }
}

pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// Use the embedded templates, or the directory named by
    /// `FARM_DEPLOY_TEMPLATES_DIR` when set.
    pub fn load() -> Result<Self> {
        match std::env::var("FARM_DEPLOY_TEMPLATES_DIR") {
            Ok(dir) => Self::from_dir(Path::new(&dir)),
            Err(_) => Self::from_embedded(),
        }
    }

    pub fn from_embedded() -> Result<Self> {
        tracing::debug!("loading embedded templates");
        let mut tera = Tera::default();
        for (name, content) in ALL_TEMPLATES {
            tera.add_raw_template(name, content)?;
        }
        Ok(Self { tera })
    }

    pub fn from_dir(dir: &Path) -> Result<Self> {
        tracing::debug!(templates_dir = %dir.display(), "loading templates from filesystem");
        let mut tera = Tera::default();
        for (name, _) in ALL_TEMPLATES {
            let contents = std::fs::read_to_string(dir.join(name))?;
            tera.add_raw_template(name, &contents)?;
        }
        Ok(Self { tera })
    }

    /// Render one named template. Missing templates and syntax errors
    /// are fatal to the run.
    pub fn render(&self, template_name: &str, context: &RenderContext) -> Result<Vec<u8>> {
        let tera_context = tera::Context::from_serialize(context)
            .map_err(|err| DeployError::Config(format!("bad template context: {err}")))?;
        let rendered = self.tera.render(template_name, &tera_context)?;
        tracing::debug!(template_name, bytes = rendered.len(), "rendered template");
        Ok(rendered.into_bytes())
    }
}

/// Uppercase the first letter of each word, like the manager's own
/// display-name handling.
fn title_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut at_word_start = true;
    for ch in name.chars() {
        if at_word_start {
            result.extend(ch.to_uppercase());
        } else {
            result.push(ch);
        }
        at_word_start = ch.is_whitespace() || ch == '-' || ch == '_';
    }
    result
}
