use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum PowerError {
    #[error("Shutdown command is empty")]
    EmptyCommand,

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Halts the host
pub trait SystemControl: Send {
    /// Issue the halt request without waiting for it to complete
    fn shutdown(&mut self) -> Result<(), PowerError>;
}

/// Runs an external command such as `shutdown -h now`
#[derive(Debug, Clone)]
pub struct CommandShutdown {
    command: Vec<String>,
}

impl CommandShutdown {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl SystemControl for CommandShutdown {
    fn shutdown(&mut self) -> Result<(), PowerError> {
        let (program, args) = self.command.split_first().ok_or(PowerError::EmptyCommand)?;

        info!("Halting host: {}", self.command.join(" "));
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| PowerError::Spawn {
                program: program.clone(),
                source,
            })?;

        // Not awaited; the runtime reaps it
        if let Some(pid) = child.id() {
            info!("Shutdown command running as pid {}", pid);
        }
        Ok(())
    }
}

/// Logs the request instead of halting
#[derive(Debug, Default)]
pub struct DryRunSystemControl;

impl SystemControl for DryRunSystemControl {
    fn shutdown(&mut self) -> Result<(), PowerError> {
        info!("[dry-run] would halt the host now");
        Ok(())
    }
}
