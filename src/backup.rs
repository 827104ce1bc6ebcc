//! World archives: `<world>_<YYYY-MM-DD>_<HH-MM-SS>.tgz` in the backups
//! directory.

use std::{
    fs::OpenOptions,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use flate2::{Compression, write::GzEncoder};
use serde::Serialize;
use tokio::fs;
use tracing::{info, warn};

use crate::{error::BackupError, utils::file_timestamp};

pub const BACKUP_EXTENSION: &str = "tgz";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub file_name: String,
    pub world_name: String,
    pub date: String,
    pub time: String,
}

/// Splits an archive name back into world, date and time. World names may
/// themselves contain underscores.
pub fn parse_backup_name(file_name: &str) -> Option<BackupEntry> {
    let stem = file_name.strip_suffix(&format!(".{BACKUP_EXTENSION}"))?;
    let mut parts = stem.rsplitn(3, '_');
    let time = parts.next()?;
    let date = parts.next()?;
    let world = parts.next()?;

    let valid = |s: &str, len: usize| s.len() == len && s.chars().all(|c| c.is_ascii_digit() || c == '-');
    if world.is_empty() || !valid(date, 10) || !valid(time, 8) {
        return None;
    }

    Some(BackupEntry {
        file_name: file_name.to_string(),
        world_name: world.to_string(),
        date: date.to_string(),
        time: time.replace('-', ":"),
    })
}

/// World names end up in archive names, so only a single plain path
/// component is accepted.
pub fn check_world_name(world_name: &str) -> Result<(), BackupError> {
    let mut parts = Path::new(world_name).components();
    match (parts.next(), parts.next()) {
        (Some(Component::Normal(_)), None) if !world_name.contains(['/', '\\']) => Ok(()),
        _ => Err(BackupError::InvalidWorldName(world_name.to_string())),
    }
}

/// Streams `world_dir` into a new archive under `backups_dir`.
pub async fn archive_world(
    world_dir: &Path,
    backups_dir: &Path,
    world_name: &str,
) -> Result<PathBuf, BackupError> {
    check_world_name(world_name)?;
    if !fs::try_exists(world_dir).await.unwrap_or(false) {
        return Err(BackupError::WorldMissing(world_dir.to_path_buf()));
    }
    fs::create_dir_all(backups_dir).await?;

    let archive_path = backups_dir.join(format!(
        "{world_name}_{}.{BACKUP_EXTENSION}",
        file_timestamp()
    ));

    write_archive(world_dir, &archive_path, world_name).await?;
    info!(path = %archive_path.display(), "world archived");
    Ok(archive_path)
}

async fn write_archive(world_dir: &Path, target: &Path, entry_name: &str) -> Result<(), BackupError> {
    let world_dir = world_dir.to_path_buf();
    let target = target.to_path_buf();
    let entry_name = entry_name.to_string();
    tokio::task::spawn_blocking(move || -> Result<(), BackupError> {
        let file = match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(BackupError::AlreadyExists(target));
            }
            Err(err) => return Err(err.into()),
        };
        let encoder = GzEncoder::new(file, Compression::default());
        let mut tar = tar::Builder::new(encoder);
        tar.append_dir_all(&entry_name, &world_dir)?;
        tar.into_inner()?.finish()?;
        Ok(())
    })
    .await
    .map_err(|err| BackupError::Task(err.to_string()))?
}

/// Archives in `dir`, newest first.
pub async fn list_backups(dir: &Path) -> Result<Vec<BackupEntry>, BackupError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut backups = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some(backup) = parse_backup_name(&name.to_string_lossy()) {
            backups.push(backup);
        }
    }

    backups.sort_by(|a, b| (&b.date, &b.time, &b.file_name).cmp(&(&a.date, &a.time, &a.file_name)));
    Ok(backups)
}

/// Keeps the newest `keep` archives of `world_name`; `0` keeps everything.
pub async fn prune(dir: &Path, world_name: &str, keep: usize) -> Result<usize, BackupError> {
    if keep == 0 {
        return Ok(0);
    }

    let mut removed = 0;
    let stale = list_backups(dir)
        .await?
        .into_iter()
        .filter(|b| b.world_name == world_name)
        .skip(keep);
    for backup in stale {
        match fs::remove_file(dir.join(&backup.file_name)).await {
            Ok(()) => removed += 1,
            Err(err) => warn!(file = %backup.file_name, "failed to prune backup: {err}"),
        }
    }
    Ok(removed)
}

/// Removes every archive in `dir`.
pub async fn delete_all(dir: &Path) -> Result<usize, BackupError> {
    let backups = list_backups(dir).await?;
    for backup in &backups {
        fs::remove_file(dir.join(&backup.file_name)).await?;
    }
    Ok(backups.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;

    #[test]
    fn backup_names_parse() {
        let entry = parse_backup_name("my_world_2024-05-01_13-45-09.tgz").unwrap();
        assert_eq!(entry.world_name, "my_world");
        assert_eq!(entry.date, "2024-05-01");
        assert_eq!(entry.time, "13:45:09");

        assert!(parse_backup_name("world_2024-05-01_13-45-09.zip").is_none());
        assert!(parse_backup_name("notes.tgz").is_none());
        assert!(parse_backup_name("_2024-05-01_13-45-09.tgz").is_none());
    }

    #[tokio::test]
    async fn archive_list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let world = dir.path().join("world");
        std::fs::create_dir_all(world.join("region")).unwrap();
        std::fs::write(world.join("level.dat"), b"level").unwrap();
        std::fs::write(world.join("region/r.0.0.mca"), b"chunks").unwrap();
        let backups = dir.path().join("backups");

        let archive = archive_world(&world, &backups, "world").await.unwrap();
        assert!(archive.is_file());

        let file = std::fs::File::open(&archive).unwrap();
        let mut tar = tar::Archive::new(GzDecoder::new(file));
        let names: Vec<String> = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n == "world/level.dat"));
        assert!(names.iter().any(|n| n == "world/region/r.0.0.mca"));

        let listed = list_backups(&backups).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].world_name, "world");

        assert_eq!(delete_all(&backups).await.unwrap(), 1);
        assert!(list_backups(&backups).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_world_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = archive_world(&dir.path().join("nope"), dir.path(), "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::WorldMissing(_)));
    }

    #[tokio::test]
    async fn world_names_cannot_leave_the_backups_directory() {
        let dir = tempfile::tempdir().unwrap();
        let world = dir.path().join("world");
        std::fs::create_dir_all(&world).unwrap();
        let backups = dir.path().join("backups");

        for name in ["../secret", "a/b", "..", "", "/abs"] {
            let err = archive_world(&world, &backups, name).await.unwrap_err();
            assert!(matches!(err, BackupError::InvalidWorldName(_)), "{name}: {err}");
        }
        let mut left: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["world"]);
        assert!(check_world_name("my world").is_ok());
    }

    #[tokio::test]
    async fn existing_archives_are_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let world = dir.path().join("world");
        std::fs::create_dir_all(&world).unwrap();
        std::fs::write(world.join("level.dat"), b"level").unwrap();
        let target = dir.path().join("world_2024-05-01_13-45-09.tgz");
        std::fs::write(&target, b"earlier").unwrap();

        let err = write_archive(&world, &target, "world").await.unwrap_err();
        assert!(matches!(err, BackupError::AlreadyExists(_)));
        assert_eq!(std::fs::read(&target).unwrap(), b"earlier");
    }

    #[tokio::test]
    async fn prune_keeps_newest_per_world() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "world_2024-01-01_00-00-00.tgz",
            "world_2024-01-02_00-00-00.tgz",
            "world_2024-01-03_00-00-00.tgz",
            "other_2024-01-01_00-00-00.tgz",
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        assert_eq!(prune(dir.path(), "world", 2).await.unwrap(), 1);
        let left: Vec<_> = list_backups(dir.path())
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.file_name)
            .collect();
        assert_eq!(
            left,
            vec![
                "world_2024-01-03_00-00-00.tgz",
                "world_2024-01-02_00-00-00.tgz",
                "other_2024-01-01_00-00-00.tgz",
            ]
        );
        assert_eq!(prune(dir.path(), "world", 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn listing_a_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_backups(&dir.path().join("absent")).await.unwrap().is_empty());
    }
}
