//! Simulated swarm engine for tests and development.
//!
//! Fabricates the join/metadata/download lifecycle without any networking:
//! it emits the same event sequence a real engine would and appends bytes to
//! the payload file on disk at a configured rate, so the full
//! start-serve-stop flow can run hermetically. Failure modes are scriptable
//! for error-path tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::traits::SwarmEngine;
use super::types::{
    ContentDescriptor, FileEntry, PieceLayout, Priority, StatusSnapshot, SwarmManifest,
    TransferState,
};
use super::{EngineError, EngineEvent, SwarmHandle, SwarmId};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Scripted behavior for a [`SimulatedSwarmEngine`].
#[derive(Debug, Clone)]
pub struct SimulatedSwarmConfig {
    /// Manifest advertised once "metadata" arrives
    pub manifest: SwarmManifest,
    /// Index of the manifest entry that grows on disk
    pub payload_file_index: u32,
    /// Delay before the join is confirmed with a handle
    pub join_delay: Duration,
    /// Delay between the handle and the metadata event
    pub metadata_delay: Duration,
    /// Bytes appended to the payload file per write tick
    pub write_chunk_bytes: u64,
    /// Interval between write ticks
    pub write_interval: Duration,
    /// Reject the join command outright
    pub fail_join: bool,
    /// Emit metadata-failed instead of metadata
    pub fail_metadata: bool,
    /// Emit a fatal error right after the handle is added
    pub fatal_after_join: bool,
}

impl Default for SimulatedSwarmConfig {
    fn default() -> Self {
        Self {
            manifest: SwarmManifest {
                name: "demo".to_string(),
                files: vec![
                    FileEntry {
                        index: 0,
                        name: "demo.mp4".to_string(),
                        size_bytes: 4 * 1024 * 1024,
                    },
                    FileEntry {
                        index: 1,
                        name: "readme.txt".to_string(),
                        size_bytes: 812,
                    },
                ],
                layout: PieceLayout {
                    total_pieces: 256,
                    piece_size: 16 * 1024,
                },
            },
            payload_file_index: 0,
            join_delay: Duration::from_millis(20),
            metadata_delay: Duration::from_millis(50),
            write_chunk_bytes: 512 * 1024,
            write_interval: Duration::from_millis(25),
            fail_join: false,
            fail_metadata: false,
            fatal_after_join: false,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    handle: Option<SwarmHandle>,
    manifest_ready: bool,
    state: TransferState,
    written: u64,
    target: u64,
    download_dir: Option<PathBuf>,
    reannounce_count: u32,
    resume_count: u32,
    priorities_pushed: bool,
    sequential_mode: bool,
    driver: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

/// Swarm engine stand-in that scripts the startup lifecycle.
pub struct SimulatedSwarmEngine {
    config: SimulatedSwarmConfig,
    events: broadcast::Sender<EngineEvent>,
    inner: Arc<Mutex<SimState>>,
}

impl SimulatedSwarmEngine {
    /// Creates an engine with the given scripted behavior.
    pub fn new(config: SimulatedSwarmConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            events,
            inner: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// How many times the controller forced a reannounce.
    pub fn reannounce_count(&self) -> u32 {
        self.inner.lock().reannounce_count
    }

    /// How many times the controller resumed the transfer.
    pub fn resume_count(&self) -> u32 {
        self.inner.lock().resume_count
    }

    /// Whether a priority plan has been pushed.
    pub fn priorities_pushed(&self) -> bool {
        self.inner.lock().priorities_pushed
    }

    /// Whether sequential-download mode was enabled.
    pub fn sequential_mode(&self) -> bool {
        self.inner.lock().sequential_mode
    }

    fn check_handle(&self, handle: &SwarmHandle) -> Result<(), EngineError> {
        if !handle.is_valid() {
            return Err(EngineError::InvalidHandle { id: handle.id() });
        }
        match &self.inner.lock().handle {
            Some(current) if current.id() == handle.id() => Ok(()),
            _ => Err(EngineError::SwarmNotFound { id: handle.id() }),
        }
    }

    /// Drives the scripted lifecycle: handle, metadata, download, finish.
    async fn run_driver(
        config: SimulatedSwarmConfig,
        events: broadcast::Sender<EngineEvent>,
        inner: Arc<Mutex<SimState>>,
        download_dir: PathBuf,
    ) {
        tokio::time::sleep(config.join_delay).await;

        let handle = SwarmHandle::new(SwarmId::new(rand::random::<u64>()));
        {
            let mut state = inner.lock();
            state.handle = Some(handle.clone());
            state.state = TransferState::DownloadingMetadata;
        }
        let _ = events.send(EngineEvent::HandleAdded {
            handle: handle.clone(),
        });

        if config.fatal_after_join {
            let _ = events.send(EngineEvent::FatalError {
                reason: "simulated fatal transfer error".to_string(),
            });
            return;
        }

        tokio::time::sleep(config.metadata_delay).await;

        if config.fail_metadata {
            let _ = events.send(EngineEvent::MetadataFailed {
                reason: "simulated metadata failure".to_string(),
            });
            return;
        }

        let payload = config
            .manifest
            .files
            .iter()
            .find(|f| f.index == config.payload_file_index)
            .cloned();
        {
            let mut state = inner.lock();
            state.manifest_ready = true;
            state.state = TransferState::Downloading;
            state.target = payload.as_ref().map(|f| f.size_bytes).unwrap_or(0);
        }
        let _ = events.send(EngineEvent::MetadataReceived {
            handle: handle.clone(),
            manifest: config.manifest.clone(),
        });
        let _ = events.send(EngineEvent::StateChanged {
            handle: handle.clone(),
            state: TransferState::Downloading,
        });

        let Some(payload) = payload else {
            return;
        };

        let writer = tokio::spawn(Self::run_writer(
            config.clone(),
            events.clone(),
            inner.clone(),
            handle,
            download_dir.join(&payload.name),
        ));
        inner.lock().writer = Some(writer);
    }

    /// Appends chunks to the payload file until the advertised size is reached.
    async fn run_writer(
        config: SimulatedSwarmConfig,
        events: broadcast::Sender<EngineEvent>,
        inner: Arc<Mutex<SimState>>,
        handle: SwarmHandle,
        path: PathBuf,
    ) {
        let target = inner.lock().target;
        let chunk = vec![0x5au8; config.write_chunk_bytes as usize];

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await;
        let mut file = match file {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("Simulated writer could not open {}: {e}", path.display());
                return;
            }
        };

        let mut written = 0u64;
        while written < target {
            let remaining = (target - written).min(config.write_chunk_bytes) as usize;
            if file.write_all(&chunk[..remaining]).await.is_err() {
                return;
            }
            let _ = file.flush().await;
            written += remaining as u64;
            inner.lock().written = written;
            tokio::time::sleep(config.write_interval).await;
        }

        inner.lock().state = TransferState::Finished;
        let _ = events.send(EngineEvent::StateChanged {
            handle,
            state: TransferState::Finished,
        });
    }
}

impl Drop for SimulatedSwarmEngine {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        if let Some(driver) = state.driver.take() {
            driver.abort();
        }
        if let Some(writer) = state.writer.take() {
            writer.abort();
        }
    }
}

#[async_trait]
impl SwarmEngine for SimulatedSwarmEngine {
    async fn join(
        &self,
        _descriptor: &ContentDescriptor,
        download_dir: &std::path::Path,
    ) -> Result<(), EngineError> {
        if self.config.fail_join {
            return Err(EngineError::CommandFailed {
                reason: "simulated join failure".to_string(),
            });
        }

        let driver = tokio::spawn(Self::run_driver(
            self.config.clone(),
            self.events.clone(),
            self.inner.clone(),
            download_dir.to_path_buf(),
        ));

        let mut state = self.inner.lock();
        state.download_dir = Some(download_dir.to_path_buf());
        state.driver = Some(driver);
        Ok(())
    }

    async fn set_priorities(
        &self,
        handle: &SwarmHandle,
        _file_priorities: &[Priority],
        _piece_priorities: &[Priority],
    ) -> Result<(), EngineError> {
        self.check_handle(handle)?;
        self.inner.lock().priorities_pushed = true;
        Ok(())
    }

    async fn set_sequential_mode(&self, handle: &SwarmHandle) -> Result<(), EngineError> {
        self.check_handle(handle)?;
        self.inner.lock().sequential_mode = true;
        Ok(())
    }

    async fn resume(&self, handle: &SwarmHandle) -> Result<(), EngineError> {
        self.check_handle(handle)?;
        self.inner.lock().resume_count += 1;
        Ok(())
    }

    async fn force_reannounce(&self, handle: &SwarmHandle) -> Result<(), EngineError> {
        self.check_handle(handle)?;
        self.inner.lock().reannounce_count += 1;
        Ok(())
    }

    async fn remove(&self, handle: &SwarmHandle) -> Result<(), EngineError> {
        self.check_handle(handle)?;
        handle.invalidate();

        let mut state = self.inner.lock();
        if let Some(driver) = state.driver.take() {
            driver.abort();
        }
        if let Some(writer) = state.writer.take() {
            writer.abort();
        }
        *state = SimState::default();
        Ok(())
    }

    async fn status(&self, handle: &SwarmHandle) -> Result<StatusSnapshot, EngineError> {
        self.check_handle(handle)?;

        let state = self.inner.lock();
        let progress = if state.target > 0 {
            state.written as f32 / state.target as f32
        } else {
            0.0
        };
        let download_rate_bps = if state.state == TransferState::Downloading {
            (self.config.write_chunk_bytes as f64 / self.config.write_interval.as_secs_f64()) as u64
        } else {
            0
        };

        Ok(StatusSnapshot {
            progress,
            download_rate_bps,
            upload_rate_bps: 0,
            num_seeds: 4,
            num_peers: 12,
            state: state.state,
            has_metadata: state.manifest_ready,
        })
    }

    async fn manifest(&self, handle: &SwarmHandle) -> Result<Option<SwarmManifest>, EngineError> {
        self.check_handle(handle)?;

        if self.inner.lock().manifest_ready {
            Ok(Some(self.config.manifest.clone()))
        } else {
            Ok(None)
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}
