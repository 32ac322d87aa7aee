use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::protocol::{parse_answer, Command, ProtocolError, POLL_QUERIES};
use super::status::StatusBoard;

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("player input is closed")]
    Closed,

    #[error("broken pipe to player: {0}")]
    BrokenPipe(#[from] std::io::Error),

    #[error("player did not accept input within {0:?}")]
    Stalled(Duration),
}

/// Write half of the control channel, shared by the poller and the supervisor.
///
/// Each command is written and flushed under one lock so lines from
/// concurrent senders never interleave. After an I/O failure or `close` the
/// sink stays closed and every later `send` returns [`ChannelError::Closed`].
#[derive(Clone)]
pub struct CommandSink {
    input: Arc<Mutex<Option<BoxedWriter>>>,
}

impl CommandSink {
    pub fn new(input: BoxedWriter) -> Self {
        Self {
            input: Arc::new(Mutex::new(Some(input))),
        }
    }

    pub async fn send(&self, command: &Command) -> Result<(), ChannelError> {
        let mut guard = self.input.lock().await;
        let input = guard.as_mut().ok_or(ChannelError::Closed)?;

        let line = command.to_line();
        let written = async {
            input.write_all(line.as_bytes()).await?;
            input.flush().await
        }
        .await;

        if let Err(e) = written {
            // Drop our end; the process is gone or going
            *guard = None;
            return Err(ChannelError::BrokenPipe(e));
        }
        trace!("-> {}", command);
        Ok(())
    }

    /// Like [`send`](Self::send), but gives up once `limit` has passed.
    ///
    /// A player that stops draining its stdin eventually blocks every write;
    /// callers holding other locks must use this variant.
    pub async fn send_within(
        &self,
        command: &Command,
        limit: Duration,
    ) -> Result<(), ChannelError> {
        tokio::time::timeout(limit, self.send(command))
            .await
            .map_err(|_| ChannelError::Stalled(limit))?
    }

    pub async fn is_open(&self) -> bool {
        self.input.lock().await.is_some()
    }

    /// Close the player's stdin. Closing twice is a no-op.
    pub async fn close(&self) {
        if let Some(mut input) = self.input.lock().await.take() {
            if let Err(e) = input.shutdown().await {
                debug!("Error closing player input: {}", e);
            }
        }
    }
}

/// The two background loops keeping the protocol alive for one process.
///
/// Both loops stop when `stop` is cancelled, which happens when the process
/// exits or when the supervisor replaces it.
pub struct ControlChannel {
    sink: CommandSink,
    stop: CancellationToken,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl ControlChannel {
    pub fn start(
        input: BoxedWriter,
        output: BoxedReader,
        status: Arc<StatusBoard>,
        stop: CancellationToken,
        poll_interval: Duration,
    ) -> Self {
        let sink = CommandSink::new(input);
        let writer = tokio::spawn(run_writer(
            sink.clone(),
            Arc::clone(&status),
            stop.clone(),
            poll_interval,
        ));
        let reader = tokio::spawn(run_reader(output, status, stop.clone()));
        Self {
            sink,
            stop,
            writer,
            reader,
        }
    }

    pub fn sink(&self) -> &CommandSink {
        &self.sink
    }

    /// Stop both loops and wait up to `grace` for each; a loop still
    /// running after that is aborted.
    pub async fn stop(self, grace: Duration) {
        self.stop.cancel();
        for (name, mut task) in [("writer", self.writer), ("reader", self.reader)] {
            match tokio::time::timeout(grace, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Player {} loop ended abnormally: {}", name, e),
                Err(_) => {
                    warn!("Player {} loop did not stop within {:?}", name, grace);
                    task.abort();
                }
            }
        }
    }
}

/// Poll the player for its status once per interval unless paused.
pub async fn run_writer(
    sink: CommandSink,
    status: Arc<StatusBoard>,
    stop: CancellationToken,
    poll_interval: Duration,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; polling starts one interval in
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if stop.is_cancelled() {
            break;
        }
        if status.is_paused() {
            continue;
        }

        // A blocked write must not outlive the stop signal
        let polled = tokio::select! {
            _ = stop.cancelled() => break,
            polled = poll_once(&sink) => polled,
        };
        if let Err(e) = polled {
            debug!("Status poller stopping: {}", e);
            sink.close().await;
            return;
        }
    }

    sink.close().await;
    debug!("Status poller stopped");
}

async fn poll_once(sink: &CommandSink) -> Result<(), ChannelError> {
    for query in POLL_QUERIES {
        sink.send(&Command::Query(query)).await?;
    }
    Ok(())
}

/// Read player output line by line and record every answer.
pub async fn run_reader<R>(output: R, status: Arc<StatusBoard>, stop: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(output);
    let mut buf = Vec::new();

    loop {
        if stop.is_cancelled() {
            break;
        }

        let read = tokio::select! {
            _ = stop.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => {
                debug!("Player output closed");
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                match parse_answer(&line) {
                    Ok(answer) => {
                        trace!("<- {}={}", answer.key, answer.value);
                        status.apply_answer(answer);
                    }
                    Err(ProtocolError::NotAnAnswer) => {}
                    Err(e) => debug!("Discarding malformed player answer: {}", e),
                }
                buf.clear();
            }
            Err(e) => {
                debug!("Player output read failed: {}", e);
                break;
            }
        }
    }
    debug!("Player output reader stopped");
}
