//! Streaming session controller.
//!
//! Owns one active session at a time. Wires engine events into the startup
//! gate and status cache, applies file selection and piece prioritization
//! once metadata is known, and starts the progressive media server when the
//! swarm becomes playable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::priority::plan_priorities;
use super::selection::{SelectedFile, select_stream_file};
use super::startup::{self, StartupGate};
use super::status::StatusCache;
use super::{SessionState, StreamError};
use crate::config::SlipstreamConfig;
use crate::engine::{EngineEvent, SwarmEngine, SwarmHandle, SwarmManifest, TransferState};
use crate::server::{ProgressiveMediaServer, StreamEndpoint};

/// Mutable per-session fields, guarded by one session-wide lock.
///
/// The lock is held only for state transitions, never across an engine
/// call or any other await point.
#[derive(Default)]
struct SessionShared {
    state: SessionState,
    handle: Option<SwarmHandle>,
    manifest: Option<SwarmManifest>,
    selected: Option<SelectedFile>,
    server: Option<ProgressiveMediaServer>,
    pump: Option<JoinHandle<()>>,
    gate: Option<StartupGate>,
    download_dir: Option<PathBuf>,
}

/// Orchestrates one streaming session over an external swarm engine.
pub struct StreamSessionController<E: SwarmEngine> {
    engine: Arc<E>,
    config: SlipstreamConfig,
    status: Arc<StatusCache>,
    shared: Arc<Mutex<SessionShared>>,
    /// Serializes Start/Stop; a new Start implicitly stops any prior session.
    start_stop: tokio::sync::Mutex<()>,
}

impl<E: SwarmEngine> StreamSessionController<E> {
    pub fn new(engine: E, config: SlipstreamConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            config,
            status: Arc::new(StatusCache::new()),
            shared: Arc::new(Mutex::new(SessionShared::default())),
            start_stop: tokio::sync::Mutex::new(()),
        }
    }

    /// The engine this controller drives.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Current lifecycle state of the session.
    pub fn session_state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Joins the swarm and blocks until it is playable or failed.
    ///
    /// Any prior session is stopped first, synchronously. On success the
    /// returned endpoint serves the selected file; the session is left in
    /// Ready. On failure the session is left in Failed with all resources
    /// released, and no endpoint exists.
    ///
    /// # Errors
    /// All `StreamError` kinds; see the session module docs.
    pub async fn start_streaming(
        &self,
        descriptor: crate::engine::ContentDescriptor,
    ) -> crate::Result<StreamEndpoint> {
        let _guard = self.start_stop.lock().await;
        self.teardown(SessionState::Idle).await;

        tracing::info!("Starting streaming session for {descriptor}");

        if !network_available() {
            return Err(self.fail(StreamError::NoNetwork).await);
        }

        let session_name = descriptor
            .info_hash_hex()
            .unwrap_or("session")
            .to_string();
        let download_dir = self.config.storage.download_root.join(session_name);
        if let Err(e) = std::fs::create_dir_all(&download_dir) {
            return Err(self
                .fail(StreamError::DirectoryUnwritable {
                    path: format!("{} ({e})", download_dir.display()),
                })
                .await);
        }

        let gate = StartupGate::new();
        let events = self.engine.subscribe();
        {
            let mut shared = self.shared.lock();
            shared.state = SessionState::Starting;
            shared.download_dir = Some(download_dir.clone());
            shared.gate = Some(gate.clone());
        }

        let pump = tokio::spawn(run_event_pump(
            self.engine.clone(),
            events,
            self.shared.clone(),
            self.status.clone(),
            gate.clone(),
            download_dir.clone(),
        ));
        self.shared.lock().pump = Some(pump);

        if let Err(e) = self.engine.join(&descriptor, &download_dir).await {
            return Err(self
                .fail(StreamError::EngineJoinFailed {
                    reason: e.to_string(),
                })
                .await);
        }

        let shared = self.shared.clone();
        let outcome = startup::await_startup(
            self.engine.as_ref(),
            &gate,
            &self.status,
            &self.config.session,
            move || shared.lock().handle.clone(),
        )
        .await;
        if let Err(e) = outcome {
            return Err(self.fail(e).await);
        }

        let selected = match self.resolve_selected_file(&download_dir).await {
            Ok(selected) => selected,
            Err(e) => return Err(self.fail(e).await),
        };

        let server = match ProgressiveMediaServer::start(selected.path.clone(), &self.config.server)
            .await
        {
            Ok(server) => server,
            Err(e) => {
                return Err(self
                    .fail(StreamError::ServerBindFailed {
                        reason: e.to_string(),
                    })
                    .await);
            }
        };

        let endpoint = server.endpoint().clone();
        {
            let mut shared = self.shared.lock();
            shared.server = Some(server);
            shared.state = SessionState::Ready;
        }
        tracing::info!("Streaming ready at {endpoint}");
        Ok(endpoint)
    }

    /// Stops any active session and releases all resources.
    ///
    /// Idempotent and callable from any state, including Failed and Ready.
    /// Cleanup errors are logged and swallowed; the controller always ends
    /// in Idle.
    pub async fn stop_streaming(&self) -> crate::Result<()> {
        let _guard = self.start_stop.lock().await;
        self.teardown(SessionState::Idle).await;
        Ok(())
    }

    /// Download completion in percent, instantly from the status cache.
    /// Zero when no session is active.
    pub fn download_progress(&self) -> u8 {
        self.status.read().progress_percent()
    }

    /// Human-readable summary of swarm health.
    pub fn connection_stats(&self) -> String {
        if self.shared.lock().handle.is_none() {
            return "No active stream".to_string();
        }
        let snapshot = self.status.read();
        format!(
            "Seeds: {}, Peers: {}, Progress: {}%, Down: {} KB/s, State: {:?}",
            snapshot.num_seeds,
            snapshot.num_peers,
            snapshot.progress_percent(),
            snapshot.download_rate_bps / 1024,
            snapshot.state
        )
    }

    /// Ensures selection ran, fetching the manifest through the engine if
    /// the metadata event was missed and startup succeeded via the poll path.
    async fn resolve_selected_file(
        &self,
        download_dir: &Path,
    ) -> Result<SelectedFile, StreamError> {
        if let Some(selected) = self.shared.lock().selected.clone() {
            return Ok(selected);
        }

        let handle = self.shared.lock().handle.clone();
        let Some(handle) = handle.filter(|h| h.is_valid()) else {
            return Err(StreamError::MetadataFailed {
                reason: "swarm handle lost before selection".to_string(),
            });
        };

        let manifest = match self.engine.manifest(&handle).await {
            Ok(Some(manifest)) => manifest,
            Ok(None) => {
                return Err(StreamError::MetadataFailed {
                    reason: "manifest unavailable after startup".to_string(),
                });
            }
            Err(e) => {
                handle.invalidate();
                return Err(StreamError::MetadataFailed {
                    reason: e.to_string(),
                });
            }
        };

        // Hoisted so no session-lock guard lives across the await below.
        let gate = self.shared.lock().gate.clone().unwrap_or_default();
        apply_metadata(
            self.engine.as_ref(),
            &handle,
            manifest,
            &self.shared,
            gate,
            download_dir,
        )
        .await;

        self.shared
            .lock()
            .selected
            .clone()
            .ok_or(StreamError::NoEligibleFile)
    }

    /// Tears the session down into `final_state`, swallowing cleanup errors.
    async fn teardown(&self, final_state: SessionState) {
        let (handle, server, pump, gate, download_dir, had_session) = {
            let mut shared = self.shared.lock();
            let had_session = shared.state != SessionState::Idle;
            shared.state = SessionState::Stopping;
            (
                shared.handle.take(),
                shared.server.take(),
                shared.pump.take(),
                shared.gate.take(),
                shared.download_dir.take(),
                had_session,
            )
        };

        if let Some(gate) = gate {
            // Cancel an in-flight startup wait promptly.
            gate.fire(Err(StreamError::Stopped));
        }
        if let Some(pump) = pump {
            pump.abort();
        }
        if let Some(server) = server {
            server.stop();
        }
        if let Some(handle) = handle {
            if handle.is_valid() {
                if let Err(e) = self.engine.remove(&handle).await {
                    tracing::warn!("Engine remove failed for {handle}: {e}");
                }
            }
            handle.invalidate();
        }
        if let Some(dir) = download_dir {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                tracing::debug!("Could not clean {}: {e}", dir.display());
            }
        }
        self.status.clear();

        {
            let mut shared = self.shared.lock();
            shared.manifest = None;
            shared.selected = None;
            shared.state = final_state;
        }
        if had_session {
            tracing::info!("Session torn down, now {final_state:?}");
        }
    }

    /// Fails the session: tears down resources, lands in Failed.
    async fn fail(&self, error: StreamError) -> crate::SlipstreamError {
        tracing::warn!("Streaming did not start: {error}");
        self.teardown(SessionState::Failed).await;
        error.into()
    }
}

/// Connectivity precheck: route probe only, no packets are sent.
fn network_available() -> bool {
    match std::net::UdpSocket::bind(("0.0.0.0", 0)) {
        Ok(socket) => socket.connect(("8.8.8.8", 53)).is_ok(),
        Err(_) => false,
    }
}

/// Consumes the engine's event stream for the lifetime of one session.
///
/// Runs on its own task; keeps every reaction lock-light so the engine's
/// delivery task is never blocked behind a slow session operation.
async fn run_event_pump<E: SwarmEngine>(
    engine: Arc<E>,
    mut events: broadcast::Receiver<EngineEvent>,
    shared: Arc<Mutex<SessionShared>>,
    status: Arc<StatusCache>,
    gate: StartupGate,
    download_dir: PathBuf,
) {
    tracing::debug!("Session event pump started");

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Event stream lagged, skipped {skipped} events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        handle_event(
            engine.as_ref(),
            event,
            &shared,
            &status,
            &gate,
            &download_dir,
        )
        .await;
    }

    tracing::debug!("Session event pump stopped");
}

async fn handle_event<E: SwarmEngine>(
    engine: &E,
    event: EngineEvent,
    shared: &Arc<Mutex<SessionShared>>,
    status: &StatusCache,
    gate: &StartupGate,
    download_dir: &Path,
) {
    match event {
        EngineEvent::HandleAdded { handle } => {
            tracing::debug!("Swarm handle {handle} added");
            {
                let mut s = shared.lock();
                s.handle = Some(handle.clone());
                s.state = SessionState::AwaitingMetadata;
            }
            refresh_status(engine, &handle, status).await;
            command(engine.force_reannounce(&handle).await, &handle, "reannounce");
            command(
                engine.set_sequential_mode(&handle).await,
                &handle,
                "sequential mode",
            );
            command(engine.resume(&handle).await, &handle, "resume");
        }

        EngineEvent::StateChanged { handle, state } => {
            tracing::debug!("Transfer state changed to {state:?}");
            refresh_status(engine, &handle, status).await;
            if state == TransferState::Downloading && shared.lock().manifest.is_some() {
                gate.fire(Ok(()));
            }
        }

        EngineEvent::MetadataReceived { handle, manifest } => {
            tracing::info!(
                "Metadata received: {} files, {} pieces",
                manifest.files.len(),
                manifest.layout.total_pieces
            );
            apply_metadata(engine, &handle, manifest, shared, gate.clone(), download_dir).await;

            command(engine.resume(&handle).await, &handle, "resume");
            command(engine.force_reannounce(&handle).await, &handle, "reannounce");

            // The transfer may already be past the state-changed event.
            if let Ok(snapshot) = engine.status(&handle).await {
                status.update(snapshot);
                if matches!(
                    snapshot.state,
                    TransferState::Downloading | TransferState::Finished
                ) && shared.lock().manifest.is_some()
                {
                    gate.fire(Ok(()));
                }
            }
        }

        EngineEvent::TorrentChecked { handle, state } => {
            tracing::debug!("Transfer checked, state {state:?}");
            command(engine.resume(&handle).await, &handle, "resume");
            refresh_status(engine, &handle, status).await;
            if matches!(
                state,
                TransferState::Downloading | TransferState::Finished
            ) && shared.lock().manifest.is_some()
            {
                gate.fire(Ok(()));
            }
        }

        EngineEvent::MetadataFailed { reason } => {
            tracing::warn!("Metadata acquisition failed: {reason}");
            gate.fire(Err(StreamError::MetadataFailed { reason }));
        }

        EngineEvent::FatalError { reason } => {
            tracing::warn!("Fatal transfer error: {reason}");
            gate.fire(Err(StreamError::FatalTransferError { reason }));
        }

        other => {
            tracing::debug!("Engine event: {}", other.kind());
        }
    }
}

/// Stores the manifest (once), runs selection, and pushes the priority plan.
///
/// Selection failure fires the gate with NoEligibleFile. A priority push
/// failure only degrades the handle; the session keeps running on the
/// status cache.
async fn apply_metadata<E: SwarmEngine>(
    engine: &E,
    handle: &SwarmHandle,
    manifest: SwarmManifest,
    shared: &Arc<Mutex<SessionShared>>,
    gate: StartupGate,
    download_dir: &Path,
) {
    let first_time = {
        let mut s = shared.lock();
        if s.manifest.is_some() {
            false
        } else {
            s.manifest = Some(manifest.clone());
            s.state = SessionState::Downloading;
            true
        }
    };
    if !first_time {
        return;
    }

    let Some(entry) = select_stream_file(&manifest.files) else {
        tracing::warn!("No eligible media file among {} entries", manifest.files.len());
        gate.fire(Err(StreamError::NoEligibleFile));
        return;
    };

    let selected = SelectedFile::resolve(entry, download_dir);
    tracing::info!(
        "Selected media file {} ({} bytes)",
        selected.name,
        selected.size_bytes
    );
    shared.lock().selected = Some(selected.clone());

    let plan = plan_priorities(
        manifest.layout.total_pieces,
        selected.index,
        manifest.files.len() as u32,
    );
    command(
        engine
            .set_priorities(handle, &plan.file_priorities, &plan.piece_priorities)
            .await,
        handle,
        "priority push",
    );
}

/// Logs a failed engine command and degrades the handle instead of
/// propagating; the controller keeps operating on the status cache.
fn command(result: Result<(), crate::engine::EngineError>, handle: &SwarmHandle, what: &str) {
    if let Err(e) = result {
        tracing::warn!("Engine {what} failed for {handle}: {e}");
        handle.invalidate();
    }
}

async fn refresh_status<E: SwarmEngine>(engine: &E, handle: &SwarmHandle, status: &StatusCache) {
    if !handle.is_valid() {
        return;
    }
    match engine.status(handle).await {
        Ok(snapshot) => status.update(snapshot),
        Err(e) => {
            tracing::warn!("Status refresh failed for {handle}: {e}");
            handle.invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use async_trait::async_trait;
    use tokio::sync::broadcast;

    use super::*;
    use crate::engine::{
        ContentDescriptor, EngineError, FileEntry, PieceLayout, Priority, StatusSnapshot, SwarmId,
    };

    /// Engine stub whose status is scripted per test.
    struct ScriptedEngine {
        snapshot: StatusSnapshot,
        events: broadcast::Sender<EngineEvent>,
    }

    impl ScriptedEngine {
        fn reporting(state: TransferState, has_metadata: bool) -> Self {
            let (events, _) = broadcast::channel(8);
            Self {
                snapshot: StatusSnapshot {
                    state,
                    has_metadata,
                    ..Default::default()
                },
                events,
            }
        }
    }

    #[async_trait]
    impl SwarmEngine for ScriptedEngine {
        async fn join(&self, _: &ContentDescriptor, _: &Path) -> Result<(), EngineError> {
            Ok(())
        }
        async fn set_priorities(
            &self,
            _: &SwarmHandle,
            _: &[Priority],
            _: &[Priority],
        ) -> Result<(), EngineError> {
            Ok(())
        }
        async fn set_sequential_mode(&self, _: &SwarmHandle) -> Result<(), EngineError> {
            Ok(())
        }
        async fn resume(&self, _: &SwarmHandle) -> Result<(), EngineError> {
            Ok(())
        }
        async fn force_reannounce(&self, _: &SwarmHandle) -> Result<(), EngineError> {
            Ok(())
        }
        async fn remove(&self, _: &SwarmHandle) -> Result<(), EngineError> {
            Ok(())
        }
        async fn status(&self, _: &SwarmHandle) -> Result<StatusSnapshot, EngineError> {
            Ok(self.snapshot)
        }
        async fn manifest(&self, _: &SwarmHandle) -> Result<Option<SwarmManifest>, EngineError> {
            Ok(None)
        }
        fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
            self.events.subscribe()
        }
    }

    fn manifest() -> SwarmManifest {
        SwarmManifest {
            name: "feature".to_string(),
            files: vec![FileEntry {
                index: 0,
                name: "feature.mkv".to_string(),
                size_bytes: 700_000_000,
            }],
            layout: PieceLayout {
                total_pieces: 1000,
                piece_size: 256 * 1024,
            },
        }
    }

    async fn feed(
        engine: &ScriptedEngine,
        events: Vec<EngineEvent>,
    ) -> (StartupGate, Arc<Mutex<SessionShared>>) {
        let shared = Arc::new(Mutex::new(SessionShared::default()));
        let status = StatusCache::new();
        let gate = StartupGate::new();

        for event in events {
            handle_event(
                engine,
                event,
                &shared,
                &status,
                &gate,
                Path::new("/tmp/session"),
            )
            .await;
        }
        (gate, shared)
    }

    #[tokio::test]
    async fn test_metadata_then_state_change_reports_success() {
        let engine = ScriptedEngine::reporting(TransferState::CheckingFiles, true);
        let handle = SwarmHandle::new(SwarmId::new(1));

        let (gate, shared) = feed(
            &engine,
            vec![
                EngineEvent::MetadataReceived {
                    handle: handle.clone(),
                    manifest: manifest(),
                },
                EngineEvent::StateChanged {
                    handle,
                    state: TransferState::Downloading,
                },
            ],
        )
        .await;

        assert!(gate.wait().await.is_ok());
        assert!(shared.lock().selected.is_some());
    }

    #[tokio::test]
    async fn test_state_change_then_metadata_reports_success() {
        // The state-changed event alone must not fire the gate; once
        // metadata lands, the status check observes the downloading state.
        let engine = ScriptedEngine::reporting(TransferState::Downloading, true);
        let handle = SwarmHandle::new(SwarmId::new(2));

        let (gate, _shared) = feed(
            &engine,
            vec![
                EngineEvent::StateChanged {
                    handle: handle.clone(),
                    state: TransferState::Downloading,
                },
                EngineEvent::MetadataReceived {
                    handle,
                    manifest: manifest(),
                },
            ],
        )
        .await;

        assert!(gate.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_state_change_without_metadata_does_not_fire() {
        let engine = ScriptedEngine::reporting(TransferState::Downloading, false);
        let handle = SwarmHandle::new(SwarmId::new(3));

        let (gate, _shared) = feed(
            &engine,
            vec![EngineEvent::StateChanged {
                handle,
                state: TransferState::Downloading,
            }],
        )
        .await;

        assert!(!gate.fired());
    }

    #[tokio::test]
    async fn test_duplicate_metadata_events_select_once() {
        let engine = ScriptedEngine::reporting(TransferState::Downloading, true);
        let handle = SwarmHandle::new(SwarmId::new(4));

        let (_gate, shared) = feed(
            &engine,
            vec![
                EngineEvent::MetadataReceived {
                    handle: handle.clone(),
                    manifest: manifest(),
                },
                EngineEvent::MetadataReceived {
                    handle,
                    manifest: manifest(),
                },
            ],
        )
        .await;

        let selected = shared.lock().selected.clone().unwrap();
        assert_eq!(selected.index, 0);
        assert_eq!(selected.name, "feature.mkv");
    }

    #[tokio::test]
    async fn test_fatal_error_event_fires_failure() {
        let engine = ScriptedEngine::reporting(TransferState::Downloading, false);

        let (gate, _shared) = feed(
            &engine,
            vec![EngineEvent::FatalError {
                reason: "disk on fire".to_string(),
            }],
        )
        .await;

        assert!(matches!(
            gate.wait().await,
            Err(StreamError::FatalTransferError { .. })
        ));
    }
}
