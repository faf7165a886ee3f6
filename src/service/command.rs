//! Generation service backed by an external command.
//!
//! The rendered prompt is written to the command's stdin and the response is
//! read from stdout, the way `claude --print` works.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{GenerationRequest, GenerationService};
use crate::errors::ServiceError;

#[derive(Debug, Clone)]
pub struct CommandService {
    program: String,
    args: Vec<String>,
}

impl CommandService {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl GenerationService for CommandService {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError> {
        let start = Instant::now();
        let prompt = request.render_prompt();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ServiceError::Fatal(format!("Failed to spawn '{}': {}", self.program, e))
            }
            _ => ServiceError::Transient(format!("Failed to spawn '{}': {}", self.program, e)),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| ServiceError::Transient(format!("Failed to write prompt: {}", e)))?;
            stdin
                .shutdown()
                .await
                .map_err(|e| ServiceError::Transient(format!("Failed to close stdin: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ServiceError::Transient(format!("Failed to wait for process: {}", e)))?;

        debug!(
            role = %request.role,
            prompt_chars = prompt.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            exit = output.status.code().unwrap_or(-1),
            "generation command finished"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ServiceError::Transient(format!(
                "'{}' exited with code {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(ServiceError::Transient(format!(
                "'{}' returned an empty response",
                self.program
            )));
        }
        Ok(text)
    }
}
