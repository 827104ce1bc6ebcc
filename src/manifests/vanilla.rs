use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tokio::{fs, sync::Mutex};
use tracing::info;

use crate::error::ManifestError;

use super::{ReleaseSource, VersionList, versioned_jar_name};

pub const MANIFEST_URL: &str = "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

#[derive(Debug, Clone, Deserialize)]
pub struct VanillaManifestV2 {
    pub latest: VanillaLatest,
    pub versions: Vec<VanillaManifestV2Version>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VanillaLatest {
    pub release: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VanillaManifestV2Version {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VanillaReleaseManifest {
    pub id: String,
    pub downloads: ReleaseDownloads,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseDownloads {
    #[serde(default)]
    pub server: Option<Download>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Download {
    pub url: String,
    pub sha1: String,
    #[serde(default)]
    pub size: Option<u64>,
}

async fn fetch_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, ManifestError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| ManifestError::Request(format!("{url}: {err}")))?;

    if !response.status().is_success() {
        return Err(ManifestError::Request(format!(
            "{url}: HTTP {}",
            response.status()
        )));
    }

    response
        .json::<T>()
        .await
        .map_err(|err| ManifestError::Request(format!("{url}: {err}")))
}

impl VanillaManifestV2 {
    pub async fn load(client: &reqwest::Client, url: &str) -> Result<Self, ManifestError> {
        fetch_json(client, url).await
    }

    pub fn find(&self, id: &str) -> Option<&VanillaManifestV2Version> {
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn version_list(&self) -> VersionList {
        let of_kind = |kind: &str| -> Vec<String> {
            self.versions
                .iter()
                .filter(|v| v.kind == kind)
                .map(|v| v.id.clone())
                .collect()
        };
        VersionList {
            latest: self.latest.release.clone(),
            release: of_kind("release"),
            snapshot: of_kind("snapshot"),
        }
    }
}

impl VanillaReleaseManifest {
    pub async fn load(
        client: &reqwest::Client,
        version: &VanillaManifestV2Version,
    ) -> Result<Self, ManifestError> {
        fetch_json(client, &version.url).await
    }

    pub fn server_download(&self) -> Result<&Download, ManifestError> {
        self.downloads
            .server
            .as_ref()
            .ok_or_else(|| ManifestError::NoServerDownload(self.id.clone()))
    }
}

pub fn verify_sha1(id: &str, bytes: &[u8], expected: &str) -> Result<(), ManifestError> {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let actual = hex::encode(hasher.finalize());

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(ManifestError::Integrity {
            id: id.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Mojang's piston-meta catalogue. The manifest is fetched once and reused
/// for downloads until [`fetch_versions`](ReleaseSource::fetch_versions) is
/// called again.
#[derive(Debug)]
pub struct MojangReleases {
    client: reqwest::Client,
    manifest_url: String,
    manifest: Mutex<Option<VanillaManifestV2>>,
}

impl Default for MojangReleases {
    fn default() -> Self {
        Self::new(MANIFEST_URL)
    }
}

impl MojangReleases {
    pub fn new<S: Into<String>>(manifest_url: S) -> Self {
        Self {
            client: reqwest::Client::new(),
            manifest_url: manifest_url.into(),
            manifest: Mutex::new(None),
        }
    }

    async fn manifest(&self) -> Result<VanillaManifestV2, ManifestError> {
        let mut cached = self.manifest.lock().await;
        if let Some(manifest) = cached.as_ref() {
            return Ok(manifest.clone());
        }
        let manifest = VanillaManifestV2::load(&self.client, &self.manifest_url).await?;
        *cached = Some(manifest.clone());
        Ok(manifest)
    }
}

#[async_trait]
impl ReleaseSource for MojangReleases {
    async fn fetch_versions(&self) -> Result<VersionList, ManifestError> {
        let manifest = VanillaManifestV2::load(&self.client, &self.manifest_url).await?;
        let list = manifest.version_list();
        *self.manifest.lock().await = Some(manifest);
        Ok(list)
    }

    async fn download_release(&self, id: &str, dest_dir: &Path) -> Result<PathBuf, ManifestError> {
        let manifest = self.manifest().await?;
        let version = manifest
            .find(id)
            .ok_or_else(|| ManifestError::UnknownVersion(id.to_string()))?;
        let release = VanillaReleaseManifest::load(&self.client, version).await?;
        let download = release.server_download()?;

        info!(version = id, url = %download.url, "downloading server jar");
        let response = self
            .client
            .get(&download.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|err| ManifestError::Request(format!("{}: {err}", download.url)))?;
        let body = response
            .bytes()
            .await
            .map_err(|err| ManifestError::Request(format!("{}: {err}", download.url)))?;

        verify_sha1(id, &body, &download.sha1)?;

        fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(versioned_jar_name(id));
        let partial = dest.with_extension("jar.part");
        fs::write(&partial, &body).await?;
        fs::rename(&partial, &dest).await?;

        info!(version = id, path = %dest.display(), bytes = body.len(), "server jar stored");
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "latest": {"release": "1.12.2", "snapshot": "17w43a"},
        "versions": [
            {"id": "17w43a", "type": "snapshot", "url": "https://example.invalid/17w43a.json", "sha1": "aa"},
            {"id": "1.12.2", "type": "release", "url": "https://example.invalid/1.12.2.json", "sha1": "bb"},
            {"id": "1.11.2", "type": "release", "url": "https://example.invalid/1.11.2.json"},
            {"id": "b1.7.3", "type": "old_beta", "url": "https://example.invalid/b1.7.3.json"}
        ]
    }"#;

    #[test]
    fn manifest_splits_channels() {
        let manifest: VanillaManifestV2 = serde_json::from_str(MANIFEST).unwrap();
        let list = manifest.version_list();
        assert_eq!(list.latest, "1.12.2");
        assert_eq!(list.release, vec!["1.12.2", "1.11.2"]);
        assert_eq!(list.snapshot, vec!["17w43a"]);
        assert_eq!(manifest.find("1.11.2").unwrap().kind, "release");
        assert!(manifest.find("1.0").is_none());
    }

    #[test]
    fn release_manifest_without_server_download() {
        let release: VanillaReleaseManifest =
            serde_json::from_str(r#"{"id": "b1.7.3", "downloads": {"client": {}}}"#).unwrap();
        assert!(matches!(
            release.server_download(),
            Err(ManifestError::NoServerDownload(id)) if id == "b1.7.3"
        ));
    }

    #[test]
    fn sha1_verification() {
        // sha1("abc")
        let expected = "a9993e364706816aba3e25717850c26c9cd0d89d";
        assert!(verify_sha1("x", b"abc", expected).is_ok());
        assert!(verify_sha1("x", b"abc", &expected.to_uppercase()).is_ok());
        assert!(matches!(
            verify_sha1("x", b"abd", expected),
            Err(ManifestError::Integrity { .. })
        ));
    }
}
