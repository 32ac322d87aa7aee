//! Supervision of the external media player.
//!
//! [`PlaybackSupervisor`] owns at most one player process at a time. Every
//! transition (play, pause, shutdown) runs under a single async mutex, so a
//! new process is only started once the previous one has been told to quit,
//! its control loops are stopped and it has exited (or been killed after a
//! grace period).
//!
//! Every write to the player made under that mutex is bounded by the quit
//! timeout, so a player that stops reading its stdin cannot hold the
//! supervisor hostage.

pub mod channel;
pub mod launcher;
pub mod protocol;
pub mod status;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chroot::{PathGuard, PathGuardError};
use channel::{ChannelError, ControlChannel};
use launcher::{PlayerLauncher, PlayerProcess};
use protocol::Command;
use status::{PlaybackStatus, StatusBoard};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_QUIT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Failed to start player `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Player channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Unknown target kind: {0}")]
    UnknownKind(String),
}

/// Kind of a play/browse target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    File,
    Http,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::File => "file",
            TargetKind::Http => "http",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(TargetKind::File),
            "http" => Ok(TargetKind::Http),
            other => Err(PlayerError::UnknownKind(other.to_string())),
        }
    }
}

/// A single playable item, validated and ready for `loadfile`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackTarget {
    /// Canonical path below the music root
    File(PathBuf),
    /// Stream location without its `http://` scheme
    Stream(String),
}

impl TrackTarget {
    pub fn load_argument(&self) -> String {
        match self {
            TrackTarget::File(path) => path.to_string_lossy().into_owned(),
            TrackTarget::Stream(location) => format!("http://{}", location),
        }
    }
}

/// What a client asked to play
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayRequest {
    pub kind: TargetKind,
    pub names: Vec<String>,
    /// Folder segments below the music root; empty for streams
    pub folder: Vec<String>,
}

impl PlayRequest {
    pub fn files(folder: Vec<String>, names: Vec<String>) -> Self {
        Self {
            kind: TargetKind::File,
            names,
            folder,
        }
    }

    pub fn streams(names: Vec<String>) -> Self {
        Self {
            kind: TargetKind::Http,
            names,
            folder: Vec::new(),
        }
    }

    fn playing_path(&self) -> Vec<String> {
        std::iter::once(self.kind.as_str().to_string())
            .chain(self.folder.iter().cloned())
            .collect()
    }
}

/// Result of a completed play transition
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlayReport {
    pub loaded: Vec<String>,
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    Terminating,
}

enum Phase {
    Idle,
    Running { alive: CancellationToken },
    Terminating,
}

struct ActiveProcess {
    pid: Option<u32>,
    channel: ControlChannel,
    /// Cancelled by the exit monitor once the process has terminated
    alive: CancellationToken,
    kill: CancellationToken,
}

#[derive(Default)]
struct Inner {
    active: Option<ActiveProcess>,
}

/// Owns the player process lifecycle and the shared playback status
pub struct PlaybackSupervisor {
    inner: Mutex<Inner>,
    phase: RwLock<Phase>,
    status: Arc<StatusBoard>,
    guard: Arc<PathGuard>,
    launcher: Arc<dyn PlayerLauncher>,
    poll_interval: Duration,
    quit_timeout: Duration,
}

impl PlaybackSupervisor {
    pub fn new(guard: Arc<PathGuard>, launcher: Arc<dyn PlayerLauncher>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            phase: RwLock::new(Phase::Idle),
            status: Arc::new(StatusBoard::new()),
            guard,
            launcher,
            poll_interval: DEFAULT_POLL_INTERVAL,
            quit_timeout: DEFAULT_QUIT_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_quit_timeout(mut self, quit_timeout: Duration) -> Self {
        self.quit_timeout = quit_timeout;
        self
    }

    /// Copy of the current status; no lock is held once this returns
    pub fn status(&self) -> PlaybackStatus {
        self.status.snapshot()
    }

    pub fn state(&self) -> SupervisorState {
        match &*self.phase.read().unwrap_or_else(PoisonError::into_inner) {
            Phase::Idle => SupervisorState::Idle,
            Phase::Running { alive } if alive.is_cancelled() => SupervisorState::Idle,
            Phase::Running { .. } => SupervisorState::Running,
            Phase::Terminating => SupervisorState::Terminating,
        }
    }

    /// Run [`play`](Self::play) on its own task; errors are logged.
    ///
    /// The status shows the new request right away, before the previous
    /// player has been stopped.
    pub fn play_detached(self: &Arc<Self>, request: PlayRequest) -> JoinHandle<()> {
        self.status.begin_playback(request.playing_path());
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = supervisor.play(request).await {
                warn!("Play request failed: {}", e);
            }
        })
    }

    /// Replace the current player with a new one loading `request`'s targets.
    ///
    /// Targets rejected by the path guard are skipped; the remaining ones are
    /// still loaded in order. The first loaded target replaces the player's
    /// playlist, later ones are appended.
    pub async fn play(&self, request: PlayRequest) -> Result<PlayReport, PlayerError> {
        let mut inner = self.inner.lock().await;

        if let Some(previous) = inner.active.take() {
            self.terminate(previous).await;
        }

        self.status.begin_playback(request.playing_path());

        let process = match self.launcher.launch().await {
            Ok(process) => process,
            Err(e) => {
                self.status.reset();
                self.set_phase(Phase::Idle);
                return Err(e);
            }
        };
        let active = self.start_process(process);
        self.set_phase(Phase::Running {
            alive: active.alive.clone(),
        });

        let mut report = PlayReport::default();
        for name in &request.names {
            let target = match self.resolve_target(&request, name) {
                Ok(target) => target,
                Err(e) => {
                    warn!("Skipping {}: {}", name, e);
                    report.rejected.push(name.clone());
                    continue;
                }
            };

            let append = !report.loaded.is_empty();
            let command = Command::load(target.load_argument(), append);
            let sent = active
                .channel
                .sink()
                .send_within(&command, self.quit_timeout)
                .await;
            if let Err(e) = sent {
                warn!("Player stopped accepting commands: {}", e);
                self.terminate(active).await;
                self.status.reset();
                self.set_phase(Phase::Idle);
                return Err(e.into());
            }
            debug!("Queued {}", target.load_argument());
            report.loaded.push(name.clone());
        }

        info!(
            "Playing {} target(s) from {} ({} rejected)",
            report.loaded.len(),
            request.playing_path().join("/"),
            report.rejected.len()
        );
        inner.active = Some(active);
        Ok(report)
    }

    /// Toggle pause on the live player.
    ///
    /// Returns the new local paused flag, or `None` when no player is alive.
    /// The flag is flipped without waiting for the player to confirm.
    pub async fn pause(&self) -> Result<Option<bool>, PlayerError> {
        let inner = self.inner.lock().await;
        let active = match &inner.active {
            Some(active) if !active.alive.is_cancelled() => active,
            _ => return Ok(None),
        };

        active
            .channel
            .sink()
            .send_within(&Command::Pause, self.quit_timeout)
            .await?;
        let paused = self.status.toggle_paused();
        debug!("Player {}", if paused { "paused" } else { "resumed" });
        Ok(Some(paused))
    }

    /// Stop the live player, if any
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(active) = inner.active.take() {
            self.terminate(active).await;
        }
        self.set_phase(Phase::Idle);
    }

    fn resolve_target(
        &self,
        request: &PlayRequest,
        name: &str,
    ) -> Result<TrackTarget, PathGuardError> {
        match request.kind {
            TargetKind::File => {
                let segments: Vec<&str> = request
                    .folder
                    .iter()
                    .map(String::as_str)
                    .chain(std::iter::once(name))
                    .collect();
                self.guard.resolve(&segments).map(TrackTarget::File)
            }
            TargetKind::Http => Ok(TrackTarget::Stream(name.to_string())),
        }
    }

    fn start_process(&self, process: PlayerProcess) -> ActiveProcess {
        let PlayerProcess {
            input,
            output,
            exited,
            kill,
            pid,
        } = process;

        let alive = CancellationToken::new();
        let loops = alive.child_token();

        let exit_signal = alive.clone();
        tokio::spawn(async move {
            exited.await;
            exit_signal.cancel();
            debug!("Player (pid {:?}) is gone", pid);
        });

        let channel = ControlChannel::start(
            input,
            output,
            Arc::clone(&self.status),
            loops,
            self.poll_interval,
        );

        ActiveProcess {
            pid,
            channel,
            alive,
            kill,
        }
    }

    async fn terminate(&self, active: ActiveProcess) {
        let ActiveProcess {
            pid,
            channel,
            alive,
            kill,
        } = active;

        if alive.is_cancelled() {
            channel.stop(self.quit_timeout).await;
            return;
        }

        self.set_phase(Phase::Terminating);
        info!("Stopping player (pid {:?})", pid);

        match channel
            .sink()
            .send_within(&Command::Quit, self.quit_timeout)
            .await
        {
            Ok(()) => {}
            Err(ChannelError::Stalled(_)) => {
                warn!("Player (pid {:?}) is not reading its input, killing it", pid);
                kill.cancel();
            }
            Err(e) => debug!("Could not send quit: {}", e),
        }
        channel.stop(self.quit_timeout).await;

        if tokio::time::timeout(self.quit_timeout, alive.cancelled())
            .await
            .is_err()
        {
            warn!(
                "Player (pid {:?}) did not quit within {:?}",
                pid, self.quit_timeout
            );
            kill.cancel();
            if tokio::time::timeout(self.quit_timeout, alive.cancelled())
                .await
                .is_err()
            {
                warn!("Player (pid {:?}) still running after kill", pid);
            }
        }
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.write().unwrap_or_else(PoisonError::into_inner) = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_kind_parsing() {
        assert_eq!("file".parse::<TargetKind>().unwrap(), TargetKind::File);
        assert_eq!("http".parse::<TargetKind>().unwrap(), TargetKind::Http);
        assert!(matches!(
            "ftp".parse::<TargetKind>(),
            Err(PlayerError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_load_arguments() {
        assert_eq!(
            TrackTarget::File(PathBuf::from("/music/a.mp3")).load_argument(),
            "/music/a.mp3"
        );
        assert_eq!(
            TrackTarget::Stream("radio.example:8000/live".into()).load_argument(),
            "http://radio.example:8000/live"
        );
    }

    #[test]
    fn test_playing_path() {
        let request = PlayRequest::files(vec!["rock".into(), "album".into()], vec!["a.mp3".into()]);
        assert_eq!(request.playing_path(), vec!["file", "rock", "album"]);
        assert_eq!(PlayRequest::streams(vec!["x".into()]).playing_path(), vec!["http"]);
    }
}
