use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeployError>;

/// Error type for the whole deployment run. Everything propagates up to
/// the top-level handler in main; only that handler terminates the
/// process.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("name not available: {0}")]
    NameUnavailable(String),

    #[error("prompt error: {0}")]
    Prompt(String),

    #[error("remote execution error: {0}")]
    Remote(String),

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    SshKey(#[from] russh::keys::Error),

    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("timed out: {0}")]
    Timeout(String),
}
