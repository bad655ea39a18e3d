//! Startup synchronization: single-fire gate plus bounded polling wait.
//!
//! The engine reports progress as an unordered, possibly-duplicated stream
//! of events on its own task; the caller wants one bounded-time ready/not-
//! ready decision. The gate converts the former into the latter: any event
//! handler may fire it, the first outcome wins, and the waiter polls it
//! with a deadline while driving reannounce/refresh side effects.

use tokio::sync::watch;
use tokio::time::Instant;

use super::status::StatusCache;
use super::StreamError;
use crate::config::SessionConfig;
use crate::engine::{SwarmEngine, SwarmHandle, TransferState};

/// Terminal result of the startup wait.
pub type StartupOutcome = Result<(), StreamError>;

/// Single-fire completion signal, safe to fire from any number of tasks.
///
/// The first outcome is kept; later fires are ignored. Waiting is
/// cancel-safe: a waiter that re-subscribes after a timeout still observes
/// an outcome fired in between.
#[derive(Debug, Clone)]
pub struct StartupGate {
    tx: watch::Sender<Option<StartupOutcome>>,
}

impl StartupGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Records the outcome if none has been recorded yet and wakes waiters.
    pub fn fire(&self, outcome: StartupOutcome) {
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(outcome);
                true
            } else {
                false
            }
        });
    }

    /// Whether an outcome has been recorded.
    pub fn fired(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Waits until an outcome is recorded.
    pub async fn wait(&self) -> StartupOutcome {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Sender dropped without firing; only happens on teardown.
                return Err(StreamError::Stopped);
            }
        }
    }
}

impl Default for StartupGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocks until the gate fires or the startup deadline expires.
///
/// Each poll iteration refreshes the status cache from the handle and
/// applies the poll-driven success check (`has_metadata` with an actively
/// downloading state), racing the event-driven path on purpose: neither
/// source alone is reliably timely. Every
/// `reannounce_interval` the engine is nudged with a reannounce + resume to
/// cover trackers and peers that went quiet. Transient engine-call failures
/// are logged, invalidate the handle, and never abort the wait.
pub(crate) async fn await_startup<E: SwarmEngine>(
    engine: &E,
    gate: &StartupGate,
    status: &StatusCache,
    config: &SessionConfig,
    handle_source: impl Fn() -> Option<SwarmHandle>,
) -> StartupOutcome {
    let started = Instant::now();
    let deadline = started + config.startup_deadline;
    let mut last_nudge = started;

    loop {
        match tokio::time::timeout(config.startup_poll_interval, gate.wait()).await {
            Ok(outcome) => return outcome,
            Err(_) => {}
        }

        if Instant::now() >= deadline {
            tracing::warn!(
                "Startup deadline of {:?} expired without a decision",
                config.startup_deadline
            );
            return Err(StreamError::StartupTimeout);
        }

        let Some(handle) = handle_source() else {
            continue;
        };
        if !handle.is_valid() {
            continue;
        }

        match engine.status(&handle).await {
            Ok(snapshot) => {
                status.update(snapshot);
                tracing::debug!(
                    "Startup poll: state={:?}, seeds={}, peers={}, metadata={}",
                    snapshot.state,
                    snapshot.num_seeds,
                    snapshot.num_peers,
                    snapshot.has_metadata
                );
                if snapshot.has_metadata && snapshot.state == TransferState::Downloading {
                    gate.fire(Ok(()));
                }
            }
            Err(e) => {
                tracing::warn!("Status poll failed for {handle}: {e}");
                handle.invalidate();
                continue;
            }
        }

        if last_nudge.elapsed() >= config.reannounce_interval {
            last_nudge = Instant::now();
            nudge(engine, &handle).await;
        }
    }
}

/// Re-issues force-reannounce + resume, degrading the handle on failure.
async fn nudge<E: SwarmEngine>(engine: &E, handle: &SwarmHandle) {
    if let Err(e) = engine.force_reannounce(handle).await {
        tracing::warn!("Reannounce failed for {handle}: {e}");
        handle.invalidate();
        return;
    }
    if let Err(e) = engine.resume(handle).await {
        tracing::warn!("Resume failed for {handle}: {e}");
        handle.invalidate();
        return;
    }
    tracing::debug!("Forced announce and resume for {handle}");
}
