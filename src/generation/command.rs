//! Generation provider backed by an external command.
//!
//! The configured program receives the prompt on stdin and prints its reply on
//! stdout. The first JSON object in the reply becomes the structured payload.

use super::provider::{GenerationOutput, GenerationProvider, ModelDescriptor, extract_json_object};
use crate::config::ProviderConfig;
use anyhow::{Context, Result, anyhow};
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Runs a command per generation.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    model: ModelDescriptor,
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandProvider {
    /// Resolve `config.program` on `PATH` and build a provider for `model`.
    pub fn from_config(model: ModelDescriptor, config: &ProviderConfig) -> Result<Self> {
        let program = which::which(&config.program).with_context(|| {
            format!("Generation provider program '{}' was not found on PATH", config.program)
        })?;
        Ok(Self {
            model,
            program,
            args: config.args.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
        })
    }

    async fn run(&self, prompt: &str) -> Result<GenerationOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("INTENTCODE_MODEL", &self.model.id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(temperature) = self.model.temperature {
            cmd.env("INTENTCODE_TEMPERATURE", temperature.to_string());
        }

        tracing::debug!(
            program = %self.program.display(),
            model = %self.model.id,
            prompt_bytes = prompt.len(),
            "Invoking generation command"
        );

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program.display()))?;

        // Feed stdin while draining stdout so large prompts cannot fill both pipes.
        let stdin = child.stdin.take();
        let writer = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let exchange = async { tokio::join!(writer, child.wait_with_output()) };

        let (written, output) = match self.timeout {
            Some(duration) => timeout(duration, exchange).await.map_err(|_| {
                anyhow!(
                    "Generation command {} timed out after {} seconds",
                    self.program.display(),
                    duration.as_secs()
                )
            })?,
            None => exchange.await,
        };
        let output = output.context("Failed to wait for generation command")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "Generation command {} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            ));
        }
        written.context("Failed to write prompt to stdin")?;

        let raw_text = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok(GenerationOutput {
            structured: extract_json_object(&raw_text),
            raw_text,
        })
    }
}

impl GenerationProvider for CommandProvider {
    fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<GenerationOutput>> {
        Box::pin(self.run(prompt))
    }
}
