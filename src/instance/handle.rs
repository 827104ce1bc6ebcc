use std::{process::ExitStatus, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, BufWriter},
    process::Child,
    sync::{broadcast, mpsc},
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::{InstanceEvent, StreamSource},
    error::ServerError,
    logger::ServerLog,
};

use super::{InstanceData, OutputBuffer};

/// Destinations for every line the child prints.
#[derive(Debug, Clone)]
pub struct OutputSinks {
    pub buffer: OutputBuffer,
    pub log: ServerLog,
    pub events: broadcast::Sender<InstanceEvent>,
}

/// A spawned server process. Only this handle writes to the child's stdin
/// or reads its output.
#[derive(Debug)]
pub struct InstanceHandle {
    pub data: InstanceData,
    child: Child,
    pid: Option<u32>,
    stdin_tx: mpsc::Sender<String>,
    shutdown: CancellationToken,
    killed: bool,
}

impl InstanceHandle {
    pub fn spawn(data: InstanceData, sinks: OutputSinks) -> Result<Self, ServerError> {
        let mut child = data
            .build_command()
            .spawn()
            .map_err(ServerError::SpawnFailed)?;

        let stdout = child.stdout.take().ok_or(ServerError::NoStdoutPipe)?;
        let stderr = child.stderr.take().ok_or(ServerError::NoStderrPipe)?;
        let stdin = child.stdin.take().ok_or(ServerError::NoStdinPipe)?;

        let pid = child.id();
        let shutdown = CancellationToken::new();
        let generation = sinks.buffer.reopen();

        info!(pid, java = %data.java.display(), jar = %data.jar_path.display(), "server process spawned");

        spawn_pump(stdout, StreamSource::Stdout, generation, sinks.clone(), shutdown.clone());
        spawn_pump(stderr, StreamSource::Stderr, generation, sinks, shutdown.clone());

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(64);
        let stdin_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut writer = BufWriter::new(stdin);

            loop {
                tokio::select! {
                    _ = stdin_shutdown.cancelled() => {
                        break;
                    }
                    maybe_cmd = stdin_rx.recv() => {
                        let Some(cmd) = maybe_cmd else { break };
                        if writer.write_all(cmd.as_bytes()).await.is_err()
                            || writer.flush().await.is_err()
                        {
                            warn!("server stdin closed");
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            data,
            child,
            pid,
            stdin_tx,
            shutdown,
            killed: false,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Writes one console line to the server's stdin.
    pub async fn send_command<S: Into<String>>(&self, cmd: S) -> Result<(), ServerError> {
        let mut command = cmd.into();
        if !command.ends_with('\n') {
            command.push('\n');
        }

        self.stdin_tx
            .send(command)
            .await
            .map_err(|_| ServerError::StdinWriteFailed)?;

        Ok(())
    }

    /// Reaps the child if it has exited on its own.
    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(err) => {
                warn!(pid = self.pid, "failed to poll server process: {err}");
                None
            }
        }
    }

    pub fn has_exited(&mut self) -> bool {
        self.killed || self.try_exit_status().is_some()
    }

    /// Waits up to `grace` for the process to exit by itself.
    pub async fn wait_exit(&mut self, grace: Duration) -> Option<ExitStatus> {
        match timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(err)) => {
                warn!(pid = self.pid, "failed to wait for server process: {err}");
                None
            }
            Err(_) => None,
        }
    }

    /// Kills the process unless it is already gone, and stops the pumps.
    pub async fn kill(&mut self) -> Result<(), ServerError> {
        if !self.killed && self.try_exit_status().is_none() {
            self.child
                .kill()
                .await
                .map_err(ServerError::io("failed to kill server process"))?;
            info!(pid = self.pid, "server process killed");
        }
        self.killed = true;
        self.shutdown.cancel();
        Ok(())
    }
}

impl Drop for InstanceHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn spawn_pump<R>(
    reader: R,
    source: StreamSource,
    generation: u64,
    sinks: OutputSinks,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    break;
                }
                next_line = lines.next_line() => {
                    match next_line {
                        Ok(Some(line)) => {
                            sinks.buffer.push(generation, &line);
                            sinks.log.log(&line);
                            let _ = sinks.events.send(InstanceEvent::line(line, source));
                        }
                        Ok(None) => break,
                        Err(err) => {
                            debug!(?source, "server output stream failed: {err}");
                            break;
                        }
                    }
                }
            }
        }
        if source == StreamSource::Stdout {
            sinks.buffer.mark_closed(generation);
        }
    });
}
