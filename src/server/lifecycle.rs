use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tokio::{fs, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    config::InstanceEvent,
    error::{Result, ServerError},
    instance::{InstanceData, InstanceHandle, LifecycleState, OutputSinks},
    parser::{detect_shutdown, detect_startup},
    rcon::RconSettings,
};

use super::domain::MinecraftServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

impl MinecraftServer {
    pub(super) fn transition(&mut self, next: LifecycleState) {
        let old = self.properties.state;
        if old == next {
            return;
        }
        self.properties.state = next;
        debug!(?old, ?next, "lifecycle transition");
        self.log.notice(&format!("server {}", state_word(next)));
        let _ = self.events.send(InstanceEvent::state_change(old, next));
        self.publish();
    }

    /// True while a spawned child has not exited.
    pub(super) fn has_live_process(&mut self) -> bool {
        self.process
            .as_mut()
            .is_some_and(|p| p.pid().is_some() && !p.has_exited())
    }

    /// `javaPath`, then `<javaHome>/bin/java`, then `java` on `PATH`.
    pub fn resolve_java(&self) -> Result<PathBuf> {
        let settings = &self.properties.settings;

        let explicit = settings.java_path.trim();
        if !explicit.is_empty() {
            let path = PathBuf::from(explicit);
            if path.is_file() {
                return Ok(path);
            }
            warn!(path = %path.display(), "configured javaPath does not exist");
        }

        let home = settings.java_home.trim();
        if !home.is_empty() {
            let bin = PathBuf::from(home).join("bin");
            for name in ["java", "java.exe"] {
                let candidate = bin.join(name);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
            warn!(java_home = home, "javaHome has no java executable");
        }

        which::which("java").map_err(|_| ServerError::JavaNotFound)
    }

    fn instance_data(&self, java: PathBuf) -> InstanceData {
        let settings = &self.properties.settings;
        InstanceData {
            java,
            root_dir: settings.minecraft_directory.clone(),
            jar_path: settings.jar_path(),
            memory_flags: settings.memory_flags(),
        }
    }

    fn sinks(&self) -> OutputSinks {
        OutputSinks {
            buffer: self.output.clone(),
            log: self.log.clone(),
            events: self.events.clone(),
        }
    }

    /// Spawns the server and waits for it to report ready.
    ///
    /// A live process makes this a no-op. Any failure after the spawn stops
    /// the half-started process before the error is returned.
    pub async fn start(&mut self) -> Result<StartOutcome> {
        if !self.properties.installed {
            return Err(ServerError::NotInstalled);
        }
        if self.has_live_process() {
            info!(pid = ?self.process.as_ref().and_then(InstanceHandle::pid), "server already running");
            return Ok(StartOutcome::AlreadyRunning);
        }
        if self.process.take().is_some() {
            debug!("discarding handle of an exited server process");
        }

        let java = self.resolve_java()?;
        let jar = self.properties.settings.jar_path();
        if !fs::try_exists(&jar).await.unwrap_or(false) {
            return Err(ServerError::JarNotFound(jar));
        }

        self.load_server_properties().await?;
        self.properties.rcon_configured =
            RconSettings::from_properties(&self.properties.server_properties).is_some();

        let capture = self.output.attach()?;
        let handle = InstanceHandle::spawn(self.instance_data(java), self.sinks())?;
        self.process = Some(handle);
        self.properties.started_at = None;
        self.transition(LifecycleState::Starting);

        let detected = detect_startup(&capture, self.classifier.as_ref(), &self.timings).await;
        drop(capture);

        let report = match detected {
            Ok(report) => report,
            Err(err) => {
                warn!("server start aborted: {err}");
                self.log.notice(&format!("start failed: {err}"));
                self.stop_minecraft_process().await;
                return Err(err);
            }
        };

        if report.missing_properties {
            info!("server generated a fresh server.properties");
        }
        if let Some(version) = report.version {
            self.properties.detected_version = version;
        }
        self.properties.started_at = Some(Utc::now());
        self.transition(LifecycleState::Started);

        if let Err(err) = self.after_start().await {
            warn!("post-start setup failed: {err}");
            self.stop_minecraft_process().await;
            return Err(err);
        }

        info!(version = %self.properties.detected_version.full, "server started");
        Ok(StartOutcome::Started)
    }

    async fn after_start(&mut self) -> Result<()> {
        self.load_server_properties().await?;
        if self.auto_rcon && !self.properties.rcon_configured && self.enable_rcon().await? {
            info!("RCON enabled, it becomes the command channel after the next restart");
        }

        sleep(self.timings.settle_delay).await;
        self.refresh_eula().await?;
        self.list_commands().await?;
        self.refresh_update_available();
        Ok(())
    }

    /// Stops the server. A server that is still starting is always killed;
    /// a started one is asked to stop first unless `force` is set. Settings
    /// are persisted in every case.
    pub async fn stop(&mut self, force: bool) -> Result<()> {
        let state = self.properties.state;

        if force || state.is_starting() {
            self.stop_minecraft_process().await;
        } else if state.is_started() {
            self.graceful_stop().await?;
        } else {
            debug!(?state, "stop requested while not running");
        }

        self.release_rcon().await;
        self.save_settings().await
    }

    async fn graceful_stop(&mut self) -> Result<()> {
        let capture = self.output.attach()?;
        self.transition(LifecycleState::Stopping);

        match self.request_stop().await {
            Ok(()) => {
                if !detect_shutdown(&capture, self.classifier.as_ref(), &self.timings).await {
                    warn!("no shutdown marker seen");
                }
            }
            Err(err) => warn!("graceful stop request failed: {err}"),
        }
        drop(capture);

        if let Some(process) = self.process.as_mut() {
            if process.wait_exit(self.timings.stop_grace).await.is_none() {
                warn!(pid = ?process.pid(), "server did not exit in time, killing it");
            }
        }
        self.stop_minecraft_process().await;
        Ok(())
    }

    // RCON when the process was started with it, the console otherwise.
    async fn request_stop(&mut self) -> Result<()> {
        if self.properties.rcon_configured {
            match self.rcon_command("stop").await {
                Ok(_) => return Ok(()),
                Err(err) => debug!("RCON stop failed, using the console: {err}"),
            }
        }

        let process = self.process.as_ref().ok_or(ServerError::NotRunning)?;
        process.send_command("stop").await
    }

    /// Kills whatever process is held and marks the server stopped.
    pub(super) async fn stop_minecraft_process(&mut self) {
        if let Some(mut process) = self.process.take() {
            if let Err(err) = process.kill().await {
                warn!(pid = ?process.pid(), "failed to kill server process: {err}");
            }
        }
        self.release_rcon().await;
        self.properties.allowed_commands.clear();
        self.properties.full_help.clear();
        self.properties.player_info = Default::default();
        self.properties.started_at = None;
        self.transition(LifecycleState::Stopped);
    }

    pub(super) async fn release_rcon(&mut self) {
        if let Some(client) = self.rcon.take() {
            if let Err(err) = client.destroy().await {
                debug!("RCON close failed: {err}");
            }
        }
    }

    /// Best-effort stop used when the host is going away.
    pub async fn shutdown(&mut self) {
        if let Err(err) = self.stop(false).await {
            warn!("shutdown stop failed: {err}");
        }
        if self.process.is_some() {
            self.stop_minecraft_process().await;
        }
    }
}

fn state_word(state: LifecycleState) -> &'static str {
    match state {
        LifecycleState::Stopped => "stopped",
        LifecycleState::Starting => "starting",
        LifecycleState::Started => "started",
        LifecycleState::Stopping => "stopping",
    }
}
