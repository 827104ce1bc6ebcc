use std::{path::Path, sync::LazyLock};

use regex::Regex;
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, warn};

use crate::{
    backup,
    error::{Result, ServerError},
    instance::LifecycleState,
    manifests::{VersionList, version_from_jar_name},
    properties,
};

use super::{
    domain::MinecraftServer,
    world::{EULA_FILE, PROPERTIES_FILE, eula_accepted},
};

const DEFAULT_EULA_URL: &str = "https://aka.ms/MinecraftEULA";

static EULA_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)]+").expect("valid eula link regex"));

impl MinecraftServer {
    /// Re-reads every file the server owns and, while started, the player
    /// list. Missing or malformed optional files read as empty.
    pub async fn update_status(&mut self) -> Result<()> {
        self.reap_exited_process().await;

        self.refresh_eula().await?;
        self.load_server_properties().await?;

        self.properties.ops = self.read_list("ops.json").await;
        self.properties.banned_ips = self.read_list("banned-ips.json").await;
        self.properties.banned_players = self.read_list("banned-players.json").await;
        self.properties.whitelist = self.read_list("whitelist.json").await;
        self.properties.user_cache = self.read_list("usercache.json").await;

        self.properties.versions.installed = self.installed_versions().await?;
        let installed = fs::try_exists(self.properties.settings.jar_path())
            .await
            .unwrap_or(false);
        self.properties.installed = installed;
        self.properties.needs_installation = !installed;
        self.properties.backup_list =
            backup::list_backups(&self.properties.settings.backups.path).await?;
        self.refresh_update_available();

        if self.properties.state.is_started() {
            if let Err(err) = self.list_players().await {
                warn!("player listing failed: {err}");
            }
        }
        Ok(())
    }

    // A server that died on its own is only noticed here.
    async fn reap_exited_process(&mut self) {
        let Some(process) = self.process.as_mut() else {
            return;
        };
        if let Some(status) = process.try_exit_status() {
            warn!(pid = ?process.pid(), %status, "server process exited unexpectedly");
            self.log.notice(&format!("server process exited ({status})"));
            self.stop_minecraft_process().await;
        } else if self.properties.state == LifecycleState::Stopped {
            debug!("process alive while marked stopped");
        }
    }

    pub(super) async fn refresh_eula(&mut self) -> Result<()> {
        let path = self.server_file(EULA_FILE);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => Some(text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(ServerError::io("failed to read eula.txt")(err)),
        };

        self.properties.eula_found = text.is_some();
        self.properties.accepted_eula = text.as_deref().is_some_and(eula_accepted);
        self.properties.eula_url = text
            .as_deref()
            .and_then(|t| EULA_LINK.find(t))
            .map_or_else(|| DEFAULT_EULA_URL.to_string(), |m| m.as_str().to_string());
        Ok(())
    }

    pub(super) async fn load_server_properties(&mut self) -> Result<()> {
        let path = self.server_file(PROPERTIES_FILE);
        self.properties.server_properties = match fs::read_to_string(&path).await {
            Ok(text) => properties::parse(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(ServerError::io("failed to read server.properties")(err)),
        };
        Ok(())
    }

    async fn read_list<T: DeserializeOwned>(&self, name: &str) -> Vec<T> {
        read_json_list(&self.server_file(name)).await
    }

    /// Versions with a `minecraft_server.<id>.jar` in the server directory.
    pub async fn installed_versions(&self) -> Result<Vec<String>> {
        let dir = &self.properties.settings.minecraft_directory;
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(ServerError::io("failed to scan server directory")(err)),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(ServerError::io("failed to scan server directory"))?
        {
            let name = entry.file_name();
            if let Some(id) = version_from_jar_name(&name.to_string_lossy()) {
                versions.push(id.to_string());
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Refreshes the release catalogue.
    pub async fn fetch_versions(&mut self) -> Result<VersionList> {
        let list = self.releases.fetch_versions().await?;
        debug!(latest = %list.latest, releases = list.release.len(), "release catalogue fetched");
        self.properties.versions.catalogue = list.clone();
        self.refresh_update_available();
        Ok(list)
    }

    pub(super) fn refresh_update_available(&mut self) {
        let latest = &self.properties.versions.catalogue.latest;
        self.properties.update_available = self.properties.installed
            && !latest.is_empty()
            && *latest != self.properties.detected_version.full
            && !self.properties.versions.installed.contains(latest);
    }
}

async fn read_json_list<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            warn!(path = %path.display(), "failed to read: {err}");
            return Vec::new();
        }
    };
    if data.iter().all(u8::is_ascii_whitespace) {
        return Vec::new();
    }

    serde_json::from_slice(&data).unwrap_or_else(|err| {
        warn!(path = %path.display(), "malformed list, treating as empty: {err}");
        Vec::new()
    })
}
