//! Background readiness monitor for the served file.
//!
//! Serving gates on this monitor's flag rather than re-deriving readiness
//! from raw file size per request, so readiness cannot flap while the
//! download stalls and resumes. The file counts as ready once it holds at
//! least the minimum byte count and is either visibly growing between
//! checks or has held a stable size long enough to be a finished (small)
//! download.

use std::path::PathBuf;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::ServerConfig;

/// Tri-state readiness of the served file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Monitor is still watching the file; requests answer 503.
    Pending,
    /// File is servable; terminal for the session.
    Ready,
    /// Monitor gave up; the server stays not-ready and requests answer 404.
    GaveUp,
}

/// Polls the file until it is ready or the monitor deadline expires.
///
/// Runs as a background task for the lifetime of the media server; exits
/// as soon as a terminal state is published.
pub(crate) async fn run_monitor(
    path: PathBuf,
    config: ServerConfig,
    tx: watch::Sender<Readiness>,
) {
    let started = Instant::now();
    let mut last_size: Option<u64> = None;
    let mut stable_checks = 0u32;

    loop {
        if started.elapsed() >= config.monitor_deadline {
            tracing::warn!(
                "File never became ready within {:?}: {}",
                config.monitor_deadline,
                path.display()
            );
            let _ = tx.send(Readiness::GaveUp);
            return;
        }

        let size = tokio::fs::metadata(&path).await.ok().map(|m| m.len());

        if let Some(size) = size {
            if size >= config.min_ready_bytes {
                match last_size {
                    Some(previous) if size > previous => {
                        tracing::info!(
                            "File ready (growing, {size} bytes): {}",
                            path.display()
                        );
                        let _ = tx.send(Readiness::Ready);
                        return;
                    }
                    Some(previous) if size == previous => {
                        stable_checks += 1;
                        if stable_checks >= config.stable_checks_required {
                            tracing::info!(
                                "File ready (stable at {size} bytes): {}",
                                path.display()
                            );
                            let _ = tx.send(Readiness::Ready);
                            return;
                        }
                    }
                    _ => stable_checks = 0,
                }
            } else {
                stable_checks = 0;
            }
        } else {
            stable_checks = 0;
        }

        last_size = size;
        tokio::time::sleep(config.monitor_interval).await;
    }
}
