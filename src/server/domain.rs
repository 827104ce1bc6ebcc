use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    fs,
    sync::{Mutex, broadcast, watch},
};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::{
    backup::BackupEntry,
    config::{DetectedVersion, InstanceEvent, Timings},
    error::{Result, ServerError},
    instance::{InstanceHandle, LifecycleState, OutputBuffer},
    logger::ServerLog,
    manifests::{ReleaseSource, VersionList},
    parser::{LineClassifier, VanillaClassifier},
    players::{CachedUser, IpBanEntry, PlayerEntry, PlayerInfo},
    properties::Property,
    rcon::RconClient,
    settings::{Settings, SettingsStore},
};

use super::lifecycle::StartOutcome;

const EVENT_CAPACITY: usize = 256;

/// Installed jars next to the release catalogue.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Versions {
    pub installed: Vec<String>,
    #[serde(flatten)]
    pub catalogue: VersionList,
}

/// Controller state mirrored from disk and from the running server.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerProperties {
    pub settings: Settings,
    pub installed: bool,
    pub needs_installation: bool,
    pub detected_version: DetectedVersion,
    pub update_available: bool,
    pub versions: Versions,
    pub accepted_eula: bool,
    pub eula_found: bool,
    pub eula_url: String,
    pub state: LifecycleState,
    pub started_at: Option<DateTime<Utc>>,
    pub server_properties: Vec<Property>,
    pub ops: Vec<PlayerEntry>,
    pub banned_ips: Vec<IpBanEntry>,
    pub banned_players: Vec<PlayerEntry>,
    pub whitelist: Vec<PlayerEntry>,
    pub user_cache: Vec<CachedUser>,
    pub player_info: PlayerInfo,
    pub full_help: String,
    pub allowed_commands: Vec<String>,
    pub backup_list: Vec<BackupEntry>,
    /// RCON settings were present when the current process was spawned.
    pub rcon_configured: bool,
}

/// Serializable snapshot handed to status readers.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    #[serde(flatten)]
    pub properties: ServerProperties,
    pub started: bool,
    pub starting: bool,
    pub stopping: bool,
    pub stopped: bool,
    pub server_output_captured: bool,
    pub pid: Option<u32>,
}

/// The lifecycle controller. Every operation takes `&mut self`; share it
/// through [`ServerController`].
#[derive(Debug)]
pub struct MinecraftServer {
    pub(super) properties: ServerProperties,
    pub(super) process: Option<InstanceHandle>,
    pub(super) output: OutputBuffer,
    pub(super) rcon: Option<RconClient>,
    pub(super) store: SettingsStore,
    pub(super) defaults: Settings,
    pub(super) log: ServerLog,
    pub(super) classifier: Box<dyn LineClassifier>,
    pub(super) releases: Box<dyn ReleaseSource>,
    pub(super) timings: Timings,
    pub(super) auto_rcon: bool,
    pub(super) events: broadcast::Sender<InstanceEvent>,
    pub(super) status_tx: watch::Sender<ServerStatus>,
}

impl MinecraftServer {
    pub fn new(store: SettingsStore, releases: Box<dyn ReleaseSource>) -> Self {
        let defaults = Settings::default();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status_tx, _) = watch::channel(ServerStatus::default());
        let server = Self {
            properties: ServerProperties {
                settings: defaults.clone(),
                ..ServerProperties::default()
            },
            process: None,
            output: OutputBuffer::new(),
            rcon: None,
            store,
            log: ServerLog::for_directory(&defaults.minecraft_directory),
            defaults,
            classifier: Box::new(VanillaClassifier),
            releases,
            timings: Timings::default(),
            auto_rcon: true,
            events,
            status_tx,
        };
        server.publish();
        server
    }

    /// Controller using the per-user settings file and Mojang's catalogue.
    #[cfg(feature = "mc-vanilla")]
    pub fn vanilla() -> Self {
        Self::new(
            SettingsStore::default_location(),
            Box::new(crate::manifests::MojangReleases::default()),
        )
    }

    /// Settings written on first run.
    pub fn with_defaults(mut self, defaults: Settings) -> Self {
        self.properties.settings = defaults.clone();
        self.defaults = defaults;
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn LineClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Whether a successful start turns RCON on in `server.properties` when
    /// it is missing. Enabled by default.
    pub fn with_auto_rcon(mut self, enabled: bool) -> Self {
        self.auto_rcon = enabled;
        self
    }

    pub fn properties(&self) -> &ServerProperties {
        &self.properties
    }

    pub fn state(&self) -> LifecycleState {
        self.properties.state
    }

    pub fn status(&self) -> ServerStatus {
        let state = self.properties.state;
        ServerStatus {
            properties: self.properties.clone(),
            started: state.is_started(),
            starting: state.is_starting(),
            stopping: state.is_stopping(),
            stopped: state.is_stopped(),
            server_output_captured: self.output.is_captured(),
            pid: self.process.as_ref().and_then(InstanceHandle::pid),
        }
    }

    /// Console lines and lifecycle transitions as they happen.
    pub fn subscribe(&self) -> BroadcastStream<InstanceEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    /// Snapshots published on every lifecycle transition and after each
    /// controller operation.
    pub fn watch_status(&self) -> watch::Receiver<ServerStatus> {
        self.status_tx.subscribe()
    }

    pub(super) fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    /// Loads settings, prepares the server directory and takes a first
    /// status reading. An unreachable release catalogue is not fatal.
    pub async fn init(&mut self) -> Result<()> {
        let settings = self.store.read(&self.defaults).await?;
        fs::create_dir_all(&settings.minecraft_directory)
            .await
            .map_err(ServerError::io(format!(
                "failed to create {}",
                settings.minecraft_directory.display()
            )))?;

        self.log = ServerLog::for_directory(&settings.minecraft_directory);
        info!(directory = %settings.minecraft_directory.display(), "controller initialised");
        self.properties.settings = settings;

        if let Err(err) = self.fetch_versions().await {
            warn!("release catalogue unavailable: {err}");
        }
        self.update_status().await
    }

    pub(super) async fn save_settings(&mut self) -> Result<()> {
        self.properties.settings = self.store.save(&self.properties.settings).await?;
        Ok(())
    }
}

/// Shared handle: one operation at a time. Status reads never wait for the
/// operation lock; they see the snapshot published by the last transition or
/// operation.
#[derive(Debug)]
pub struct ServerController {
    server: Mutex<MinecraftServer>,
    status_rx: watch::Receiver<ServerStatus>,
    events: broadcast::Sender<InstanceEvent>,
}

impl ServerController {
    pub fn new(server: MinecraftServer) -> Self {
        server.publish();
        let status_rx = server.watch_status();
        let events = server.events.clone();
        Self {
            server: Mutex::new(server),
            status_rx,
            events,
        }
    }

    pub fn status(&self) -> ServerStatus {
        self.status_rx.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ServerStatus> {
        self.status_rx.clone()
    }

    pub fn subscribe(&self) -> BroadcastStream<InstanceEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    pub async fn init(&self) -> Result<()> {
        let mut server_w = self.server.lock().await;
        let res = server_w.init().await;
        server_w.publish();
        res
    }

    pub async fn start(&self) -> Result<StartOutcome> {
        let mut server_w = self.server.lock().await;
        let res = server_w.start().await;
        server_w.publish();
        res
    }

    pub async fn stop(&self, force: bool) -> Result<()> {
        let mut server_w = self.server.lock().await;
        let res = server_w.stop(force).await;
        server_w.publish();
        res
    }

    pub async fn run_command(&self, command: &str) -> Result<String> {
        let mut server_w = self.server.lock().await;
        let res = server_w.run_command(command).await;
        server_w.publish();
        res
    }

    pub async fn list_players(&self) -> Result<PlayerInfo> {
        let mut server_w = self.server.lock().await;
        let res = server_w.list_players().await;
        server_w.publish();
        res
    }

    pub async fn list_commands(&self) -> Result<Vec<String>> {
        let mut server_w = self.server.lock().await;
        let res = server_w.list_commands().await;
        server_w.publish();
        res
    }

    pub async fn update_status(&self) -> Result<ServerStatus> {
        let mut server_w = self.server.lock().await;
        let res = server_w.update_status().await;
        server_w.publish();
        res.map(|()| server_w.status())
    }

    pub async fn backup_world(&self, world_name: &str) -> Result<std::path::PathBuf> {
        let mut server_w = self.server.lock().await;
        let res = server_w.backup_world(world_name).await;
        server_w.publish();
        res
    }

    pub async fn delete_world_backups(&self) -> Result<()> {
        let mut server_w = self.server.lock().await;
        let res = server_w.delete_world_backups().await;
        server_w.publish();
        res
    }

    pub async fn new_world(&self, backup: bool) -> Result<()> {
        let mut server_w = self.server.lock().await;
        let res = server_w.new_world(backup).await;
        server_w.publish();
        res
    }

    pub async fn install(&self, version: Option<&str>, new_world: bool) -> Result<()> {
        let mut server_w = self.server.lock().await;
        let res = server_w.install(version, new_world).await;
        server_w.publish();
        res
    }

    pub async fn save_properties(&self, props: Vec<Property>) -> Result<()> {
        let mut server_w = self.server.lock().await;
        let res = server_w.save_properties(props).await;
        server_w.publish();
        res
    }

    pub async fn accept_eula(&self) -> Result<()> {
        let mut server_w = self.server.lock().await;
        let res = server_w.accept_eula().await;
        server_w.publish();
        res
    }

    pub async fn enable_rcon(&self) -> Result<bool> {
        let mut server_w = self.server.lock().await;
        let res = server_w.enable_rcon().await;
        server_w.publish();
        res
    }

    pub async fn fetch_versions(&self) -> Result<VersionList> {
        let mut server_w = self.server.lock().await;
        let res = server_w.fetch_versions().await;
        server_w.publish();
        res
    }

    /// Graceful stop for when the host process exits.
    pub async fn shutdown(&self) {
        let mut server_w = self.server.lock().await;
        server_w.shutdown().await;
        server_w.publish();
    }
}
