//! Command execution inside running containers.
//!
//! The Docker runtime uses this for its in-container listener probe; tests
//! use it to drive a service's own client binary (`psql`, a shell).

use crate::container::{ContainerError, Result};
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecResults};
use futures::stream::StreamExt;
use tracing::debug;

/// A command to run in a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecConfig {
    cmd: Vec<String>,
    env: Vec<String>,
    user: Option<String>,
}

impl ExecConfig {
    /// Run `cmd` directly, without a shell.
    pub fn new<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Run `script` through `/bin/sh -c`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new(["/bin/sh".to_string(), "-c".to_string(), script.into()])
    }

    /// Set an environment variable for this command only.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(format!("{}={}", key.into(), value.into()));
        self
    }

    /// Run as `user` instead of the image's default user.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn cmd(&self) -> &[String] {
        &self.cmd
    }

    fn to_options(&self) -> CreateExecOptions<String> {
        CreateExecOptions {
            cmd: Some(self.cmd.clone()),
            env: (!self.env.is_empty()).then(|| self.env.clone()),
            user: self.user.clone(),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        }
    }
}

/// Captured result of an exec.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code, if the engine reported one
    pub exit_code: Option<i64>,
}

impl ExecOutput {
    /// Exit code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// The command could not be started (missing binary or shell).
    pub fn not_runnable(&self) -> bool {
        matches!(self.exit_code, Some(126) | Some(127))
    }

    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }

    fn push(&mut self, chunk: LogOutput) {
        let text = chunk.to_string();
        match chunk {
            LogOutput::StdOut { .. } | LogOutput::Console { .. } => self.stdout.push_str(&text),
            LogOutput::StdErr { .. } => self.stderr.push_str(&text),
            LogOutput::StdIn { .. } => {}
        }
    }
}

/// Script exiting 0 when something listens on TCP `port` inside the
/// container.
///
/// Reads `/proc/net/tcp*` (port in hex, state `0A` = LISTEN) and falls back to
/// `nc` and bash's `/dev/tcp` where procfs is unavailable.
pub fn listening_probe_script(port: u16) -> String {
    format!(
        "(cat /proc/net/tcp* 2>/dev/null | awk '{{print $2, $4}}' | grep -qi ':{hex:04X} 0A') \
         || nc -z -w 1 localhost {port} \
         || /bin/bash -c '</dev/tcp/localhost/{port}'",
        hex = port,
        port = port
    )
}

/// Run `config` in container `container_id` and wait for it to finish.
///
/// # Errors
///
/// Returns error if the container is gone or the output stream breaks.
pub async fn execute(docker: &Docker, container_id: &str, config: &ExecConfig) -> Result<ExecOutput> {
    debug!("Exec in {}: {:?}", container_id, config.cmd);

    let exec = docker.create_exec(container_id, config.to_options()).await?;
    let mut output = ExecOutput::default();

    match docker.start_exec(&exec.id, None).await? {
        StartExecResults::Attached { output: mut stream, .. } => {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| {
                    ContainerError::ExecutionError(format!("Failed to read exec output: {}", e))
                })?;
                output.push(chunk);
            }
        }
        StartExecResults::Detached => {
            return Err(ContainerError::ExecutionError(
                "Exec started detached; output unavailable".to_string(),
            ));
        }
    }

    output.exit_code = docker.inspect_exec(&exec.id).await?.exit_code;
    debug!("Exec in {} exited with {:?}", container_id, output.exit_code);

    Ok(output)
}
