//! Classification of server console lines into lifecycle signals.
//!
//! Marker strings differ between game releases, so the rules live behind
//! [`LineClassifier`] and can be replaced without touching the supervisor.

mod detect;

use std::fmt::Debug;

use crate::config::{DetectedVersion, LogMeta};

pub use detect::{StartupReport, detect_shutdown, detect_startup};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionPhase {
    Startup,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSignal {
    MissingProperties,
    EulaNotAccepted,
    StartupFailed,
    Version(DetectedVersion),
    Ready,
    Saving,
}

pub trait LineClassifier: Debug + Send + Sync {
    fn classify(&self, phase: DetectionPhase, line: &str) -> Option<ServerSignal>;
}

/// Substring rules for the vanilla server's English console output.
#[derive(Debug, Clone, Default)]
pub struct VanillaClassifier;

const VERSION_BANNER: &str = "Starting minecraft server version ";
const EULA_MARKER: &str = "You need to agree to the EULA";
const STOPPING_MARKER: &str = "Stopping server";
const SAVING_MARKER: &str = "Saving chunks";
const READY_MARKER: &str = "Done (";

impl LineClassifier for VanillaClassifier {
    fn classify(&self, phase: DetectionPhase, line: &str) -> Option<ServerSignal> {
        let msg = LogMeta::message_of(line);

        match phase {
            DetectionPhase::Startup => {
                if msg.contains("server.properties")
                    && (msg.contains("No such file") || msg.contains("Failed to load"))
                {
                    Some(ServerSignal::MissingProperties)
                } else if msg.contains(EULA_MARKER) {
                    Some(ServerSignal::EulaNotAccepted)
                } else if msg.contains(STOPPING_MARKER) {
                    Some(ServerSignal::StartupFailed)
                } else if msg.contains(VERSION_BANNER) {
                    DetectedVersion::parse_banner(&msg).map(ServerSignal::Version)
                } else if msg.starts_with(READY_MARKER) {
                    Some(ServerSignal::Ready)
                } else {
                    None
                }
            }
            DetectionPhase::Shutdown => {
                if msg.contains(SAVING_MARKER) || msg.contains(STOPPING_MARKER) {
                    Some(ServerSignal::Saving)
                } else {
                    None
                }
            }
        }
    }
}
