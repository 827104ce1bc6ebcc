use tracing::{debug, info, warn};

use crate::{
    config::{DetectedVersion, Timings},
    error::{CaptureError, ServerError},
    instance::CaptureGuard,
};

use super::{DetectionPhase, LineClassifier, ServerSignal};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub version: Option<DetectedVersion>,
    /// The server generated a fresh `server.properties` on this start.
    pub missing_properties: bool,
}

/// Polls the capture until the ready marker shows up.
///
/// Each round waits for the output to settle and then scans the lines that
/// arrived since the previous round. A failure marker, or stdout closing
/// before the ready marker, aborts the start.
pub async fn detect_startup(
    capture: &CaptureGuard,
    classifier: &dyn LineClassifier,
    timings: &Timings,
) -> Result<StartupReport, ServerError> {
    let mut report = StartupReport::default();
    let mut scanned = 0;

    for round in 0..timings.startup_rounds {
        settle(capture, timings).await;

        let fresh = capture.lines_from(scanned);
        scanned += fresh.len();

        for line in &fresh {
            match classifier.classify(DetectionPhase::Startup, line) {
                Some(ServerSignal::MissingProperties) => {
                    debug!("server is generating a new server.properties");
                    report.missing_properties = true;
                }
                Some(ServerSignal::EulaNotAccepted) => {
                    warn!("server refused to start: EULA not accepted");
                    return Err(ServerError::EulaNotAccepted);
                }
                Some(ServerSignal::StartupFailed) => {
                    warn!(line = %line, "server stopped during startup");
                    return Err(ServerError::StartupFailed);
                }
                Some(ServerSignal::Version(version)) => {
                    info!(version = %version.full, "detected server version");
                    report.version = Some(version);
                }
                Some(ServerSignal::Ready) => {
                    return Ok(report);
                }
                Some(ServerSignal::Saving) | None => {}
            }
        }

        if capture.is_closed() {
            warn!("server output closed before startup completed");
            return Err(ServerError::StartupFailed);
        }
        debug!(round, "server not ready yet");
    }

    Err(ServerError::StartupTimeout)
}

/// Polls the capture for the shutdown marker. Returns `false` when neither
/// the marker nor the end of output was seen within the bound.
pub async fn detect_shutdown(
    capture: &CaptureGuard,
    classifier: &dyn LineClassifier,
    timings: &Timings,
) -> bool {
    let mut scanned = 0;

    for _ in 0..timings.shutdown_rounds {
        settle(capture, timings).await;

        let fresh = capture.lines_from(scanned);
        scanned += fresh.len();

        if fresh
            .iter()
            .any(|line| classifier.classify(DetectionPhase::Shutdown, line) == Some(ServerSignal::Saving))
        {
            return true;
        }
        if capture.is_closed() {
            return true;
        }
    }

    false
}

// A buffer that keeps growing past the bound is scanned as-is.
async fn settle(capture: &CaptureGuard, timings: &Timings) {
    match capture
        .wait_quiescent(timings.quiescence_interval, timings.quiescence_rounds)
        .await
    {
        Ok(_) => {}
        Err(CaptureError::Timeout { rounds }) => {
            debug!(rounds, "output still growing, scanning what arrived");
        }
        Err(err) => debug!("capture wait failed: {err}"),
    }
}
