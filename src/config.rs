use std::{
    cmp::Ordering,
    fmt::{self, Display},
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::VersionError;

pub mod stream;

pub use stream::{EventPayload, InstanceEvent, LogLevel, LogMeta, StreamLine, StreamSource};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Snapshot {
    pub year: u32,
    pub week: u32,
    pub build: char,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MinecraftVersion {
    Release(Version),
    Snapshot(Snapshot),
}

impl Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}w{:02}{}", self.year, self.week, self.build)
    }
}

impl Display for MinecraftVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinecraftVersion::Release(v) => v.fmt(f),
            MinecraftVersion::Snapshot(s) => s.fmt(f),
        }
    }
}

impl FromStr for Version {
    type Err = VersionError;

    /// Release ids like `1.12.2`; Mojang omits a zero patch (`1.20`), so it
    /// is optional here.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut split = s.split('.');

        let major_str = split
            .next()
            .filter(|p| !p.is_empty())
            .ok_or(VersionError::MissingMajor)?;
        let minor_str = split.next().ok_or(VersionError::MissingMinor)?;
        let patch_str = split.next();

        if split.next().is_some() {
            return Err(VersionError::ExtraComponents);
        }

        let major = major_str
            .parse::<u32>()
            .map_err(|_| VersionError::IncorrectMajor(major_str.to_string()))?;

        let minor = minor_str
            .parse::<u32>()
            .map_err(|_| VersionError::IncorrectMinor(minor_str.to_string()))?;

        let patch = match patch_str {
            Some(p) => p
                .parse::<u32>()
                .map_err(|_| VersionError::IncorrectPatch(p.to_string()))?,
            None => 0,
        };

        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl FromStr for Snapshot {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year_str, rest) = s
            .split_once('w')
            .ok_or(VersionError::InvalidSnapshotFormat)?;

        if rest.len() < 3 || !rest.is_char_boundary(2) {
            return Err(VersionError::InvalidSnapshotFormat);
        }

        let week_str = &rest[..2];
        let build_str = &rest[2..];

        let year = year_str
            .parse::<u32>()
            .map_err(|_| VersionError::IncorrectYear(year_str.to_string()))?;

        let week = week_str
            .parse::<u32>()
            .map_err(|_| VersionError::IncorrectWeek(week_str.to_string()))?;

        let mut build_chars = build_str.chars();
        let build = match (build_chars.next(), build_chars.next()) {
            (Some(c), None) => c,
            _ => return Err(VersionError::IncorrectBuild(build_str.to_string())),
        };

        Ok(Self { year, week, build })
    }
}

impl FromStr for MinecraftVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(ver) = Version::from_str(s) {
            return Ok(MinecraftVersion::Release(ver));
        }

        if let Ok(snap) = Snapshot::from_str(s) {
            return Ok(MinecraftVersion::Snapshot(snap));
        }

        Err(VersionError::UnknownVersionFormat(s.to_string()))
    }
}

impl PartialOrd for MinecraftVersion {
    /// Releases only order against releases and snapshots against snapshots.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (MinecraftVersion::Release(a), MinecraftVersion::Release(b)) => Some(a.cmp(b)),
            (MinecraftVersion::Snapshot(a), MinecraftVersion::Snapshot(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// True when moving from `previous` to `next` goes back in time. Ids that do
/// not parse, or that mix releases and snapshots, are never a downgrade.
pub fn is_downgrade(previous: &str, next: &str) -> bool {
    match (
        MinecraftVersion::from_str(previous),
        MinecraftVersion::from_str(next),
    ) {
        (Ok(prev), Ok(next)) => next.partial_cmp(&prev) == Some(Ordering::Less),
        _ => false,
    }
}

/// Version reported by the running server in its startup banner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedVersion {
    pub major: u32,
    pub minor: u32,
    pub release: u32,
    pub full: String,
}

impl DetectedVersion {
    /// Lenient banner parse: anything after `version ` up to whitespace is the
    /// version token, and each dotted segment that fails to parse becomes 0.
    pub fn parse_banner(line: &str) -> Option<Self> {
        let (_, rest) = line.split_once("version ")?;
        let token = rest
            .split_whitespace()
            .next()?
            .trim_end_matches(['.', ',', ')', '!']);
        if token.is_empty() {
            return None;
        }
        Some(Self::from_id(token))
    }

    pub fn from_id(id: &str) -> Self {
        let mut parts = id.split('.').map(|p| p.trim().parse::<u32>().unwrap_or(0));
        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            release: parts.next().unwrap_or(0),
            full: id.to_string(),
        }
    }

    pub fn is_known(&self) -> bool {
        !self.full.is_empty()
    }
}

/// Polling parameters for output quiescence and lifecycle detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Time between two length samples of the capture buffer.
    pub quiescence_interval: Duration,
    /// Samples taken before a still-growing buffer counts as timed out.
    pub quiescence_rounds: u32,
    pub startup_rounds: u32,
    pub shutdown_rounds: u32,
    /// Pause after the ready marker before RCON and help are queried.
    pub settle_delay: Duration,
    /// How long a stopping server may take to exit before it is killed.
    pub stop_grace: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            quiescence_interval: Duration::from_secs(1),
            quiescence_rounds: 10,
            startup_rounds: 60,
            shutdown_rounds: 15,
            settle_delay: Duration::from_secs(2),
            stop_grace: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_parses_full_release() {
        let v = DetectedVersion::parse_banner(
            "[12:00:00] [Server thread/INFO]: Starting minecraft server version 1.12.2...",
        )
        .unwrap();
        assert_eq!(
            v,
            DetectedVersion {
                major: 1,
                minor: 12,
                release: 2,
                full: "1.12.2".into()
            }
        );
    }

    #[test]
    fn banner_missing_release_defaults_to_zero() {
        let v = DetectedVersion::parse_banner("Starting minecraft server version 1.20").unwrap();
        assert_eq!((v.major, v.minor, v.release), (1, 20, 0));
        assert_eq!(v.full, "1.20");
    }

    #[test]
    fn banner_tolerates_snapshot_ids() {
        let v = DetectedVersion::parse_banner("Starting minecraft server version 23w31a").unwrap();
        assert_eq!(v.full, "23w31a");
        assert_eq!(v.major, 0);
        assert!(DetectedVersion::parse_banner("Done (3.2s)!").is_none());
        assert!(!DetectedVersion::default().is_known());
        assert!(DetectedVersion::from_id("1.12.2").is_known());
    }

    #[test]
    fn release_ids_without_patch_parse() {
        let v: Version = "1.20".parse().unwrap();
        assert_eq!(v.to_string(), "1.20.0");
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!(matches!(
            "23w31a".parse::<MinecraftVersion>(),
            Ok(MinecraftVersion::Snapshot(_))
        ));
    }

    #[test]
    fn downgrade_only_within_same_kind() {
        assert!(is_downgrade("1.12.2", "1.11.2"));
        assert!(!is_downgrade("1.11.2", "1.12.2"));
        assert!(!is_downgrade("1.12.2", "1.12.2"));
        assert!(!is_downgrade("1.12.2", "23w31a"));
        assert!(!is_downgrade("", "1.12.2"));
        assert!(is_downgrade("23w31b", "23w31a"));
    }
}
