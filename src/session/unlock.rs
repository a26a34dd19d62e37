//! Out-of-band actions that make a locked stream fetchable

use std::future::Future;

use tokio::process::Command;
use tracing::{info, warn};

use crate::error::UnlockError;

/// Performs whatever external action opens a camera's stream.
///
/// Called at most once per establishment; the caller polls the stream probe
/// afterwards.
pub trait AccessUnlocker: Send + Sync {
    fn unlock(&self, display_name: &str) -> impl Future<Output = Result<(), UnlockError>> + Send;
}

/// Runs a configured command with the camera's display name appended.
///
/// The camera portal only opens a stream after someone searches for the
/// camera by name, so the command is typically a headless-browser script.
/// With no command configured the unlocker does nothing and establishment
/// just waits for the stream to open.
#[derive(Debug, Clone, Default)]
pub struct CommandUnlocker {
    argv: Vec<String>,
}

impl CommandUnlocker {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl AccessUnlocker for CommandUnlocker {
    async fn unlock(&self, display_name: &str) -> Result<(), UnlockError> {
        let Some((program, args)) = self.argv.split_first() else {
            warn!("No unlock command configured; waiting for {} to open", display_name);
            return Ok(());
        };

        info!("Initiating access to camera {} via {}", display_name, program);
        let status = Command::new(program)
            .args(args)
            .arg(display_name)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| UnlockError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(UnlockError::Failed {
                program: program.clone(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}
