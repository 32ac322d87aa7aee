use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::channel::{BoxedReader, BoxedWriter};
use super::PlayerError;

/// A freshly started player process, as seen by the supervisor.
pub struct PlayerProcess {
    pub input: BoxedWriter,
    pub output: BoxedReader,
    /// Resolves once the process has terminated
    pub exited: BoxFuture<'static, ()>,
    /// Cancelling forces the process down
    pub kill: CancellationToken,
    pub pid: Option<u32>,
}

/// Starts player processes. Implemented by [`MplayerLauncher`] for real use
/// and by scripted fakes in tests.
#[async_trait]
pub trait PlayerLauncher: Send + Sync {
    async fn launch(&self) -> Result<PlayerProcess, PlayerError>;
}

/// Spawns the external player in slave mode with piped stdio
#[derive(Debug, Clone)]
pub struct MplayerLauncher {
    program: String,
    args: Vec<String>,
}

impl MplayerLauncher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for MplayerLauncher {
    fn default() -> Self {
        Self::new(
            "mplayer",
            vec!["-slave".into(), "-quiet".into(), "-idle".into()],
        )
    }
}

#[async_trait]
impl PlayerLauncher for MplayerLauncher {
    async fn launch(&self) -> Result<PlayerProcess, PlayerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| PlayerError::Spawn {
            command: self.command_line(),
            source,
        })?;

        let pid = child.id();
        let input = child.stdin.take().ok_or_else(|| PlayerError::Spawn {
            command: self.command_line(),
            source: std::io::Error::other("player stdin unavailable"),
        })?;
        let output = child.stdout.take().ok_or_else(|| PlayerError::Spawn {
            command: self.command_line(),
            source: std::io::Error::other("player stdout unavailable"),
        })?;

        // Player error chatter is only useful when debugging
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        debug!("player stderr: {}", line);
                    }
                }
            });
        }

        info!("Started player (pid {:?}): {}", pid, self.command_line());

        let kill = CancellationToken::new();
        let kill_signal = kill.clone();
        let exited = async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => info!("Player (pid {:?}) exited: {}", pid, status),
                    Err(e) => warn!("Failed to wait for player (pid {:?}): {}", pid, e),
                },
                _ = kill_signal.cancelled() => {
                    warn!("Killing unresponsive player (pid {:?})", pid);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill player (pid {:?}): {}", pid, e);
                    }
                }
            }
        }
        .boxed();

        Ok(PlayerProcess {
            input: Box::new(input),
            output: Box::new(output),
            exited,
            kill,
            pid,
        })
    }
}
