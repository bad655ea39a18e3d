//! Lifecycle events delivered by the swarm engine.
//!
//! Events arrive on an engine-owned task, unordered and possibly duplicated.
//! The session controller acts on the first six variants; the rest are
//! informational and only logged.

use super::types::{SwarmManifest, TransferState};
use super::SwarmHandle;

/// Tagged union of engine lifecycle events.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The engine confirmed the swarm join and produced a handle.
    HandleAdded { handle: SwarmHandle },
    /// The transfer moved to a new state.
    StateChanged {
        handle: SwarmHandle,
        state: TransferState,
    },
    /// Metadata (file manifest + piece layout) became available.
    MetadataReceived {
        handle: SwarmHandle,
        manifest: SwarmManifest,
    },
    /// The engine gave up acquiring metadata.
    MetadataFailed { reason: String },
    /// On-disk data finished checking; transfer is resuming.
    TorrentChecked {
        handle: SwarmHandle,
        state: TransferState,
    },
    /// Unrecoverable transfer fault.
    FatalError { reason: String },

    // Informational events, logged only.
    ListenSucceeded { address: String },
    ListenFailed { address: String },
    TrackerAnnounce { url: String },
    TrackerReply { url: String, num_peers: u32 },
    TrackerError { url: String, reason: String },
    PeerConnected { address: String },
    PeerDisconnected { address: String },
    DhtBootstrap,
}

impl EngineEvent {
    /// Short tag for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::HandleAdded { .. } => "handle-added",
            EngineEvent::StateChanged { .. } => "state-changed",
            EngineEvent::MetadataReceived { .. } => "metadata-received",
            EngineEvent::MetadataFailed { .. } => "metadata-failed",
            EngineEvent::TorrentChecked { .. } => "torrent-checked",
            EngineEvent::FatalError { .. } => "fatal-error",
            EngineEvent::ListenSucceeded { .. } => "listen-succeeded",
            EngineEvent::ListenFailed { .. } => "listen-failed",
            EngineEvent::TrackerAnnounce { .. } => "tracker-announce",
            EngineEvent::TrackerReply { .. } => "tracker-reply",
            EngineEvent::TrackerError { .. } => "tracker-error",
            EngineEvent::PeerConnected { .. } => "peer-connect",
            EngineEvent::PeerDisconnected { .. } => "peer-disconnect",
            EngineEvent::DhtBootstrap => "dht-bootstrap",
        }
    }
}
