use std::path::{Path, PathBuf};

use chrono::Local;
use rand::{Rng, distributions::Alphanumeric};
use tokio::fs;
use tracing::{info, warn};

use crate::{
    backup,
    config::{DetectedVersion, is_downgrade},
    error::{Result, ServerError},
    manifests::versioned_jar_name,
    properties::{self, Property, PropertyValue},
    rcon::{DEFAULT_RCON_PORT, RconSettings},
};

use super::domain::MinecraftServer;

pub const PROPERTIES_FILE: &str = "server.properties";
pub const EULA_FILE: &str = "eula.txt";
const DEFAULT_WORLD: &str = "world";

const RCON_PASSWORD_LEN: usize = 16;

impl MinecraftServer {
    pub(super) fn server_file(&self, name: &str) -> PathBuf {
        self.properties.settings.minecraft_directory.join(name)
    }

    /// `level-name` from the properties, `world` when unset.
    pub fn level_name(&self) -> String {
        match properties::get(&self.properties.server_properties, "level-name") {
            Some(PropertyValue::Null) | None => DEFAULT_WORLD.to_string(),
            Some(value) => value.to_string(),
        }
    }

    pub fn world_directory(&self) -> PathBuf {
        self.server_file(&self.level_name())
    }

    async fn restart_if(&mut self, was_running: bool) -> Result<()> {
        if was_running {
            self.start().await?;
        }
        Ok(())
    }

    /// Archives `world_name`, stopping the server around the copy when it is
    /// running.
    pub async fn backup_world(&mut self, world_name: &str) -> Result<PathBuf> {
        backup::check_world_name(world_name)?;
        let was_running = self.properties.state.is_started();
        if was_running {
            self.stop(false).await?;
        }

        let archived = self.archive(world_name).await;
        self.restart_if(was_running).await?;
        archived
    }

    async fn archive(&mut self, world_name: &str) -> Result<PathBuf> {
        let backups = &self.properties.settings.backups;
        let dir = backups.path.clone();
        let keep = backups.num_to_keep;

        let path = backup::archive_world(&self.server_file(world_name), &dir, world_name).await?;
        self.log.notice(&format!("world {world_name} backed up to {}", path.display()));

        let pruned = backup::prune(&dir, world_name, keep).await?;
        if pruned > 0 {
            info!(pruned, world = world_name, "old backups removed");
        }

        self.properties.backup_list = backup::list_backups(&dir).await?;
        Ok(path)
    }

    pub async fn delete_world_backups(&mut self) -> Result<()> {
        let dir = self.properties.settings.backups.path.clone();
        let removed = backup::delete_all(&dir).await?;
        info!(removed, dir = %dir.display(), "world backups deleted");
        self.properties.backup_list = backup::list_backups(&dir).await?;
        Ok(())
    }

    /// Deletes the current world so the server generates a new one. Nothing
    /// happens when the world directory does not exist.
    pub async fn new_world(&mut self, backup_first: bool) -> Result<()> {
        let world = self.world_directory();
        if !fs::try_exists(&world).await.unwrap_or(false) {
            info!(world = %world.display(), "no world to replace");
            return Ok(());
        }

        let was_running = self.properties.state.is_started();
        if was_running {
            self.stop(false).await?;
        }

        let replaced = self.replace_world(&world, backup_first).await;
        self.restart_if(was_running).await?;
        replaced
    }

    async fn replace_world(&mut self, world: &Path, backup_first: bool) -> Result<()> {
        if backup_first {
            let name = self.level_name();
            self.archive(&name).await?;
        }
        remove_world(world).await?;
        self.log.notice("world deleted, a new one is generated on the next start");
        Ok(())
    }

    /// Installs `version` (the latest release when `None` or `"latest"`) as
    /// the active jar. The world is only recreated on a downgrade or when
    /// `new_world` is set.
    pub async fn install(&mut self, version: Option<&str>, new_world: bool) -> Result<()> {
        let installed = self.install_version(version, new_world).await;
        if installed.is_err() {
            let present = fs::try_exists(self.properties.settings.jar_path())
                .await
                .unwrap_or(false);
            self.properties.installed = present;
            self.properties.needs_installation = !present;
        }
        installed
    }

    async fn install_version(&mut self, version: Option<&str>, new_world: bool) -> Result<()> {
        if self.properties.versions.catalogue.latest.is_empty() {
            self.fetch_versions().await?;
        }
        let catalogue = &self.properties.versions.catalogue;
        let id = match version.map(str::trim) {
            None | Some("") | Some("latest") => catalogue.latest.clone(),
            Some(id) if catalogue.contains(id) => id.to_string(),
            Some(id) => return Err(ServerError::InvalidVersion(id.to_string())),
        };
        if id.is_empty() {
            return Err(ServerError::InvalidVersion("latest".into()));
        }

        let mcdir = self.properties.settings.minecraft_directory.clone();
        fs::create_dir_all(&mcdir)
            .await
            .map_err(ServerError::io(format!("failed to create {}", mcdir.display())))?;

        let versioned = mcdir.join(versioned_jar_name(&id));
        if fs::try_exists(&versioned).await.unwrap_or(false) {
            info!(version = %id, "using cached server jar");
        } else {
            self.releases.download_release(&id, &mcdir).await?;
        }

        let was_running = self.properties.state.is_started();
        if was_running {
            self.stop(false).await?;
        }

        let jar = self.properties.settings.jar_path();
        match fs::remove_file(&jar).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(ServerError::io("failed to remove the active jar")(err)),
        }
        fs::copy(&versioned, &jar)
            .await
            .map_err(ServerError::io(format!("failed to activate {}", versioned.display())))?;

        let previous = self.properties.detected_version.clone();
        if new_world || (previous.is_known() && is_downgrade(&previous.full, &id)) {
            info!(from = %previous.full, to = %id, "recreating world");
            remove_world(&self.world_directory()).await?;
        }

        self.properties.installed = true;
        self.properties.needs_installation = false;
        self.properties.detected_version = DetectedVersion::from_id(&id);
        self.properties.versions.installed = self.installed_versions().await?;
        self.refresh_update_available();
        self.log.notice(&format!("installed minecraft {id}"));
        info!(version = %id, jar = %jar.display(), "server jar installed");

        self.restart_if(was_running).await
    }

    /// Replaces `server.properties`, keeping a timestamped copy of the old
    /// file, and restarts a running server so the change applies.
    pub async fn save_properties(&mut self, props: Vec<Property>) -> Result<()> {
        let was_running = self.properties.state.is_started();
        if was_running {
            self.stop(false).await?;
        }

        let written = self.write_properties(&props, true).await;
        self.restart_if(was_running).await?;
        written
    }

    async fn write_properties(&mut self, props: &[Property], keep_backup: bool) -> Result<()> {
        let path = self.server_file(PROPERTIES_FILE);

        if keep_backup && fs::try_exists(&path).await.unwrap_or(false) {
            let stamp = Local::now().format("%Y%m%d%H%M%S");
            let copy = self.server_file(&format!("{PROPERTIES_FILE}.{stamp}.bak"));
            fs::copy(&path, &copy)
                .await
                .map_err(ServerError::io("failed to back up server.properties"))?;
        }

        fs::write(&path, properties::serialize(props))
            .await
            .map_err(ServerError::io("failed to write server.properties"))?;
        self.load_server_properties().await
    }

    /// Sets `eula=true`, creating `eula.txt` if needed.
    pub async fn accept_eula(&mut self) -> Result<()> {
        let path = self.server_file(EULA_FILE);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(ServerError::io("failed to read eula.txt")(err)),
        };

        if eula_accepted(&text) {
            return self.refresh_eula().await;
        }

        let mut found = false;
        let mut lines: Vec<String> = text
            .lines()
            .map(|line| {
                if line.trim().to_ascii_lowercase().starts_with("eula=") {
                    found = true;
                    "eula=true".to_string()
                } else {
                    line.to_string()
                }
            })
            .collect();
        if !found {
            lines.push("eula=true".into());
        }

        let mut updated = lines.join("\n");
        updated.push('\n');
        fs::write(&path, updated)
            .await
            .map_err(ServerError::io("failed to write eula.txt"))?;

        info!("EULA accepted");
        self.refresh_eula().await
    }

    /// Adds RCON settings with a random password when `server.properties`
    /// lacks them. They apply from the next start. Returns whether anything
    /// was written.
    pub async fn enable_rcon(&mut self) -> Result<bool> {
        self.load_server_properties().await?;
        let mut props = self.properties.server_properties.clone();
        if RconSettings::from_properties(&props).is_some() {
            return Ok(false);
        }

        let port_set = properties::get(&props, "rcon.port")
            .and_then(PropertyValue::as_i64)
            .is_some_and(|p| u16::try_from(p).is_ok());
        if !port_set {
            properties::set(
                &mut props,
                "rcon.port",
                PropertyValue::Integer(i64::from(DEFAULT_RCON_PORT)),
            );
        }
        let password: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RCON_PASSWORD_LEN)
            .map(char::from)
            .collect();
        properties::set(&mut props, "rcon.password", PropertyValue::Text(password));
        properties::set(&mut props, "enable-rcon", PropertyValue::Bool(true));

        self.write_properties(&props, false).await?;
        self.log.notice("RCON enabled");
        Ok(true)
    }
}

pub(super) fn eula_accepted(text: &str) -> bool {
    text.lines()
        .map(|l| l.trim().to_ascii_lowercase())
        .any(|l| l == "eula=true")
}

async fn remove_world(world: &Path) -> Result<()> {
    match fs::remove_dir_all(world).await {
        Ok(()) => {
            info!(world = %world.display(), "world removed");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            warn!(world = %world.display(), "failed to remove world: {err}");
            Err(ServerError::io(format!("failed to remove {}", world.display()))(err))
        }
    }
}
