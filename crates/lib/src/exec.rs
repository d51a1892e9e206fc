//! Command execution: run a rendered command line as an OS process and
//! capture its output. No shell is involved; the line is split on whitespace
//! and passed as an argument list.

use async_trait::async_trait;

/// Why executing a command line failed. Recovered locally by the callers and
/// turned into reply text or a 400 response; never fatal.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("empty command")]
    Empty,
    #[error("spawn failed: {0}")]
    Spawn(#[from] std::io::Error),
    /// Non-zero exit; carries the exit status and the combined output.
    #[error("{status}: {output}")]
    Failed {
        status: std::process::ExitStatus,
        output: String,
    },
}

/// Runs a rendered command line: the first whitespace-delimited token is the
/// program, the rest are its arguments. Returns combined stdout+stderr on
/// success. Invocations are independent; no concurrency bound is enforced
/// here.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> Result<String, ExecError>;
}

/// Executor backed by `tokio::process`, so a slow command does not stall the
/// poller or other adapters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, command: &str) -> Result<String, ExecError> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or(ExecError::Empty)?;
        let output = tokio::process::Command::new(program)
            .args(parts)
            .output()
            .await?;
        let combined = combine_output(&output.stdout, &output.stderr);
        log::info!("executed command {:?}: {}", command, output.status);
        if output.status.success() {
            Ok(combined)
        } else {
            Err(ExecError::Failed {
                status: output.status,
                output: combined,
            })
        }
    }
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    let stderr = String::from_utf8_lossy(stderr);
    if !stderr.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }
    combined
}
