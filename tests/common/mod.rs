//! Scripted stand-in for the external player.
//!
//! Each launch creates an in-memory process speaking the slave protocol over
//! `tokio::io::duplex` pipes. Every command line it receives is recorded
//! together with the number of fake processes alive at that moment.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::FutureExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use polyphon::player::launcher::{PlayerLauncher, PlayerProcess};
use polyphon::player::PlayerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Answers status queries, exits on `quit` or closed stdin
    Normal,
    /// Ignores `quit` and closed stdin; only a kill stops it
    Stubborn,
    /// Exits right after its first `loadfile`
    ExitAfterLoad,
    /// Never reads its stdin, so writes block once the pipe is full;
    /// only a kill stops it
    Deaf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub process: usize,
    pub line: String,
    pub alive: usize,
}

pub struct FakeLauncher {
    behavior: Behavior,
    fail: AtomicBool,
    launches: AtomicUsize,
    received: Arc<Mutex<Vec<Received>>>,
    alive: Arc<Mutex<HashSet<usize>>>,
}

impl FakeLauncher {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            fail: AtomicBool::new(false),
            launches: AtomicUsize::new(0),
            received: Arc::new(Mutex::new(Vec::new())),
            alive: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn alive(&self) -> usize {
        self.alive.lock().unwrap().len()
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    /// Lines received by one process, status polls left out
    pub fn commands_of(&self, process: usize) -> Vec<String> {
        self.received()
            .into_iter()
            .filter(|r| r.process == process && !r.line.starts_with("pausing_keep"))
            .map(|r| r.line)
            .collect()
    }

    /// Poll until `check` holds, panicking after two seconds
    pub async fn wait_for<F: Fn(&Self) -> bool>(&self, check: F) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !check(self) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out, received so far: {:?}",
                self.received()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl PlayerLauncher for FakeLauncher {
    async fn launch(&self) -> Result<PlayerProcess, PlayerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlayerError::Spawn {
                command: "fake-player".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        let id = self.launches.fetch_add(1, Ordering::SeqCst);
        let capacity = if self.behavior == Behavior::Deaf { 256 } else { 4096 };
        let (input, player_stdin) = duplex(capacity);
        let (mut player_stdout, output) = duplex(4096);
        let (exit_tx, exit_rx) = tokio::sync::oneshot::channel::<()>();
        let kill = CancellationToken::new();

        let behavior = self.behavior;
        let received = Arc::clone(&self.received);
        let alive = Arc::clone(&self.alive);
        let kill_signal = kill.clone();
        alive.lock().unwrap().insert(id);

        tokio::spawn(async move {
            if behavior == Behavior::Deaf {
                let _unread = player_stdin;
                let _silent = player_stdout;
                kill_signal.cancelled().await;
                alive.lock().unwrap().remove(&id);
                let _ = exit_tx.send(());
                return;
            }

            let mut lines = BufReader::new(player_stdin).lines();
            loop {
                let line = tokio::select! {
                    _ = kill_signal.cancelled() => break,
                    line = lines.next_line() => line,
                };
                let Ok(Some(line)) = line else {
                    if behavior == Behavior::Stubborn {
                        kill_signal.cancelled().await;
                    }
                    break;
                };

                let alive_now = alive.lock().unwrap().len();
                received.lock().unwrap().push(Received {
                    process: id,
                    line: line.clone(),
                    alive: alive_now,
                });

                let answer: &[u8] = match line.as_str() {
                    "quit" if behavior != Behavior::Stubborn => break,
                    "pausing_keep get_file_name" => b"ANS_FILENAME='fake.mp3'\n",
                    "pausing_keep get_time_pos" => b"ANS_TIME_POSITION=1.5\n",
                    "pausing_keep get_time_length" => b"ANS_LENGTH=300.00\n",
                    l if l.starts_with("loadfile") && behavior == Behavior::ExitAfterLoad => break,
                    _ => b"chatter that is not an answer\n",
                };
                let _ = player_stdout.write_all(answer).await;
            }

            alive.lock().unwrap().remove(&id);
            let _ = exit_tx.send(());
        });

        Ok(PlayerProcess {
            input: Box::new(input),
            output: Box::new(output),
            exited: exit_rx.map(|_| ()).boxed(),
            kill,
            pid: None,
        })
    }
}
