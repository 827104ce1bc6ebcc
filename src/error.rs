use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum VersionError {
    #[error("Incorrect major version: {0}")]
    IncorrectMajor(String),

    #[error("Incorrect minor version: {0}")]
    IncorrectMinor(String),

    #[error("Incorrect patch version: {0}")]
    IncorrectPatch(String),

    #[error("Incorrect snapshot year: {0}")]
    IncorrectYear(String),

    #[error("Incorrect snapshot week: {0}")]
    IncorrectWeek(String),

    #[error("Incorrect snapshot build: {0}")]
    IncorrectBuild(String),

    #[error("Missing major version")]
    MissingMajor,

    #[error("Missing minor version")]
    MissingMinor,

    #[error("Invalid snapshot format")]
    InvalidSnapshotFormat,

    #[error("Too many components")]
    ExtraComponents,

    #[error("Unrecognized version format: {0}")]
    UnknownVersionFormat(String),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Server output is already being captured")]
    AlreadyAttached,

    #[error("Server output kept growing after {rounds} sampling rounds")]
    Timeout { rounds: u32 },
}

#[derive(Debug, Error)]
pub enum RconError {
    #[error("RCON is not configured in server.properties")]
    NotConfigured,

    #[error("Failed to connect to RCON at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Timed out connecting to RCON at {0}")]
    ConnectTimeout(String),

    #[error("RCON authentication failed")]
    AuthFailed,

    #[error("Invalid RCON packet size: {0}")]
    InvalidPacket(i32),

    #[error("RCON payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("RCON transport error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Version manifest request failed: {0}")]
    Request(String),

    #[error("Unknown Minecraft version: {0}")]
    UnknownVersion(String),

    #[error("Version {0} has no server download")]
    NoServerDownload(String),

    #[error("Integrity check failed for {id}: expected {expected}, got {actual}")]
    Integrity {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to store downloaded jar: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("World directory not found: {0}")]
    WorldMissing(PathBuf),

    #[error("Invalid world name: {0:?}")]
    InvalidWorldName(String),

    #[error("Backup already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Archive task failed: {0}")]
    Task(String),

    #[error("Backup I/O failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Minecraft server is not installed")]
    NotInstalled,

    #[error("Server is not running")]
    NotRunning,

    #[error("No Java runtime found (set javaPath or javaHome, or put java on PATH)")]
    JavaNotFound,

    #[error("Server jar not found: {0}")]
    JarNotFound(PathBuf),

    #[error("Invalid Minecraft version requested: {0}")]
    InvalidVersion(String),

    #[error("The Minecraft EULA must be accepted before the server can start")]
    EulaNotAccepted,

    #[error("Server failed to start")]
    StartupFailed,

    #[error("Timed out waiting for the server to start")]
    StartupTimeout,

    #[error("Failed to spawn java process: {0}")]
    SpawnFailed(#[source] io::Error),

    #[error("Failed to access child stdout pipe")]
    NoStdoutPipe,

    #[error("Failed to access child stdin pipe")]
    NoStdinPipe,

    #[error("Failed to access child stderr pipe")]
    NoStderrPipe,

    #[error("Failed to write to stdin")]
    StdinWriteFailed,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Rcon(#[from] RconError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Backup(#[from] BackupError),
}

impl ServerError {
    /// Builds a mapper that tags an `io::Error` with what was being attempted.
    pub(crate) fn io<S: Into<String>>(context: S) -> impl FnOnce(io::Error) -> ServerError {
        let context = context.into();
        move |source| ServerError::Io { context, source }
    }
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;
