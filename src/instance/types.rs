use std::{path::PathBuf, process::Stdio};

use serde::Serialize;
use tokio::process;

/// Everything needed to launch the server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceData {
    pub java: PathBuf,
    pub root_dir: PathBuf,
    pub jar_path: PathBuf,
    pub memory_flags: [String; 2],
}

impl InstanceData {
    pub fn build_command(&self) -> process::Command {
        let mut command = process::Command::new(&self.java);
        command
            .args(&self.memory_flags)
            .arg("-jar")
            .arg(&self.jar_path)
            .arg("nogui")
            .current_dir(&self.root_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);
        command
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl LifecycleState {
    pub fn is_started(self) -> bool {
        self == LifecycleState::Started
    }

    pub fn is_starting(self) -> bool {
        self == LifecycleState::Starting
    }

    pub fn is_stopping(self) -> bool {
        self == LifecycleState::Stopping
    }

    pub fn is_stopped(self) -> bool {
        self == LifecycleState::Stopped
    }
}
