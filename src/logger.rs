use std::{
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use chrono::Local;
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
    runtime::Handle,
    sync::{mpsc, oneshot},
};
use tracing::warn;

pub const LOG_FILE: &str = "craftwarden.log";

#[derive(Debug)]
enum LogOp {
    Line(String),
    Clear,
    Flush(oneshot::Sender<()>),
}

/// Append-only file log of server console output and controller notices.
///
/// Writes are fire-and-forget: lines are queued to one writer task, which
/// keeps the file open. A failed write is reported through `tracing` and
/// never reaches the caller.
#[derive(Debug, Clone)]
pub struct ServerLog {
    path: PathBuf,
    writer: Arc<OnceLock<mpsc::UnboundedSender<LogOp>>>,
}

impl ServerLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            writer: Arc::new(OnceLock::new()),
        }
    }

    pub fn for_directory(minecraft_dir: &Path) -> Self {
        Self::new(minecraft_dir.join("logs").join(LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&self, line: &str) {
        self.send(LogOp::Line(line.to_string()));
    }

    /// Controller-originated line in the same shape as console output.
    pub fn notice(&self, msg: &str) {
        let line = format!("[{}] [craftwarden/INFO]: {msg}", Local::now().format("%H:%M:%S"));
        self.log(&line);
    }

    pub fn clear(&self) {
        self.send(LogOp::Clear);
    }

    /// Waits until everything queued so far has reached the file.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.send(LogOp::Flush(done));
        let _ = wait.await;
    }

    fn send(&self, op: LogOp) {
        let tx = match self.writer.get() {
            Some(tx) => tx,
            None => {
                let Ok(handle) = Handle::try_current() else {
                    warn!(path = %self.path.display(), "no runtime, server log entry dropped");
                    return;
                };
                self.writer.get_or_init(|| {
                    let (tx, rx) = mpsc::unbounded_channel();
                    handle.spawn(run_writer(self.path.clone(), rx));
                    tx
                })
            }
        };
        if tx.send(op).is_err() {
            warn!(path = %self.path.display(), "server log writer stopped");
        }
    }
}

async fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    OpenOptions::new().create(true).append(true).open(path).await
}

async fn run_writer(path: PathBuf, mut rx: mpsc::UnboundedReceiver<LogOp>) {
    let mut file: Option<File> = None;

    while let Some(op) = rx.recv().await {
        match op {
            LogOp::Line(line) => {
                if file.is_none() {
                    match open_append(&path).await {
                        Ok(opened) => file = Some(opened),
                        Err(err) => {
                            warn!(path = %path.display(), "failed to open server log: {err}");
                            continue;
                        }
                    }
                }
                let Some(out) = file.as_mut() else { continue };

                let mut bytes = line.into_bytes();
                bytes.push(b'\n');
                let written = match out.write_all(&bytes).await {
                    Ok(()) => out.flush().await,
                    Err(err) => Err(err),
                };
                if let Err(err) = written {
                    warn!(path = %path.display(), "failed to append to server log: {err}");
                    file = None;
                }
            }
            LogOp::Clear => {
                // append mode carries on from the new end
                if let Err(err) = fs::write(&path, b"").await {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %path.display(), "failed to clear server log: {err}");
                    }
                }
            }
            LogOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let log = ServerLog::for_directory(dir.path());

        log.log("first");
        log.notice("server started");
        log.flush().await;
        let text = std::fs::read_to_string(log.path()).unwrap();
        assert!(text.starts_with("first\n"));
        assert!(text.contains("[craftwarden/INFO]: server started"));

        log.clear();
        log.flush().await;
        assert_eq!(std::fs::read_to_string(log.path()).unwrap(), "");

        log.log("after clear");
        log.flush().await;
        assert_eq!(std::fs::read_to_string(log.path()).unwrap(), "after clear\n");
    }

    #[tokio::test]
    async fn clones_share_one_ordered_writer() {
        let dir = tempfile::tempdir().unwrap();
        let log = ServerLog::for_directory(dir.path());
        let other = log.clone();

        for i in 0..50 {
            if i % 2 == 0 {
                log.log(&format!("line {i}"));
            } else {
                other.log(&format!("line {i}"));
            }
        }
        other.flush().await;

        let text = std::fs::read_to_string(log.path()).unwrap();
        let expected: Vec<String> = (0..50).map(|i| format!("line {i}")).collect();
        assert_eq!(text.lines().collect::<Vec<_>>(), expected);
    }

    #[tokio::test]
    async fn failures_do_not_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        // parent is a regular file, so every write fails
        let log = ServerLog::new(blocker.join("sub/log.txt"));
        log.log("dropped");
        log.clear();
        log.flush().await;
    }

    #[test]
    fn outside_a_runtime_entries_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let log = ServerLog::for_directory(dir.path());
        log.log("dropped");
        assert!(!log.path().exists());
    }
}
