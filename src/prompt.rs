//! Interactive prompt protocol.
//!
//! A prompt is a single line read from stdin after printing the question;
//! an optional default is shown in brackets and returned on empty input.
//! Reads race against the shared cancellation token. A mutex around the
//! reader guarantees concurrent tasks never interleave prompts.

use std::collections::HashMap;
use std::io::Write as _;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{DeployError, Result};

/// Interactive input seam. The workflow only talks to this trait, so
/// tests can script the answers.
#[async_trait]
pub trait Prompt: Send + Sync {
    /// Read one line from the operator.
    async fn read_line(&self, prompt: &str) -> Result<String>;

    /// As [`read_line`](Self::read_line), but an empty answer returns the
    /// default value (shown in brackets).
    async fn read_line_with_default(&self, prompt: &str, default: &str) -> Result<String> {
        if default.is_empty() {
            return self.read_line(prompt).await;
        }
        let line = self.read_line(&format!("{prompt} [{default}]")).await?;
        if line.is_empty() {
            return Ok(default.to_string());
        }
        Ok(line)
    }

    /// Read a non-negative integer. Empty input is 0 when `default_zero`
    /// is set, an error otherwise.
    async fn read_nonneg_int(&self, prompt: &str, default_zero: bool) -> Result<i32> {
        let line = self.read_line(prompt).await?;
        if line.is_empty() {
            if default_zero {
                return Ok(0);
            }
            return Err(DeployError::Prompt("no input given".to_string()));
        }
        let value: i32 = line
            .parse()
            .map_err(|_| DeployError::Prompt(format!("invalid integer: {line:?}")))?;
        if value < 0 {
            return Err(DeployError::Prompt(format!(
                "number must be non-negative, got {value}"
            )));
        }
        Ok(value)
    }

    /// Present a numbered menu of existing names. The operator either
    /// picks a number or types a (possibly new) name. Returns the chosen
    /// name and whether it is one of the existing options.
    async fn choose(&self, options: &[String], prompt: &str) -> Result<(String, bool)> {
        let existing: HashMap<&str, bool> =
            options.iter().map(|name| (name.as_str(), true)).collect();

        println!("Available options:");
        for (idx, name) in options.iter().enumerate() {
            println!("    {:2}: {}", idx + 1, name);
        }

        let line = self.read_line(prompt).await?;
        if line.is_empty() {
            return Err(DeployError::Prompt("no input given".to_string()));
        }

        if let Ok(index) = line.parse::<usize>() {
            if index >= 1 && index <= options.len() {
                return Ok((options[index - 1].clone(), true));
            }
            return Err(DeployError::Prompt(format!(
                "option {index} is not available"
            )));
        }

        let is_existing = existing.contains_key(line.as_str());
        Ok((line, is_existing))
    }
}

/// Stdin-backed prompter used by the real CLI.
pub struct StdinPrompter {
    lines: Mutex<Lines<BufReader<Stdin>>>,
    cancel: CancellationToken,
}

impl StdinPrompter {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            cancel,
        }
    }
}

#[async_trait]
impl Prompt for StdinPrompter {
    async fn read_line(&self, prompt: &str) -> Result<String> {
        let mut lines = self.lines.lock().await;

        print!("{prompt}: ");
        std::io::stdout().flush()?;

        tokio::select! {
            _ = self.cancel.cancelled() => {
                println!("aborted");
                Err(DeployError::Cancelled)
            }
            line = lines.next_line() => {
                let line = line?.ok_or(DeployError::Cancelled)?;
                Ok(line.trim().to_string())
            }
        }
    }
}
