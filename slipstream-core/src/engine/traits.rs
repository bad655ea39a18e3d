//! Command trait for driving an external swarm engine.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::types::{ContentDescriptor, Priority, StatusSnapshot, SwarmManifest};
use super::{EngineError, EngineEvent, SwarmHandle};

/// Commands the session controller issues against a swarm engine.
///
/// Implementations own all protocol, discovery, verification, and disk I/O
/// concerns. Every handle-taking method must fail with
/// `EngineError::InvalidHandle` rather than act on a stale handle.
#[async_trait]
pub trait SwarmEngine: Send + Sync + 'static {
    /// Begins joining the swarm identified by `descriptor`, downloading
    /// into `download_dir`. Completion is reported via `HandleAdded`.
    ///
    /// # Errors
    /// - `EngineError::InvalidDescriptor` - Descriptor rejected by the engine
    /// - `EngineError::CommandFailed` - Join could not be initiated
    async fn join(
        &self,
        descriptor: &ContentDescriptor,
        download_dir: &Path,
    ) -> Result<(), EngineError>;

    /// Pushes file- and piece-priority vectors for the swarm.
    async fn set_priorities(
        &self,
        handle: &SwarmHandle,
        file_priorities: &[Priority],
        piece_priorities: &[Priority],
    ) -> Result<(), EngineError>;

    /// Biases piece acquisition toward ascending piece index.
    async fn set_sequential_mode(&self, handle: &SwarmHandle) -> Result<(), EngineError>;

    /// Resumes the transfer if paused.
    async fn resume(&self, handle: &SwarmHandle) -> Result<(), EngineError>;

    /// Forces an immediate announce to all trackers.
    async fn force_reannounce(&self, handle: &SwarmHandle) -> Result<(), EngineError>;

    /// Removes the swarm membership and invalidates the handle.
    async fn remove(&self, handle: &SwarmHandle) -> Result<(), EngineError>;

    /// Current transfer statistics for the swarm.
    async fn status(&self, handle: &SwarmHandle) -> Result<StatusSnapshot, EngineError>;

    /// The swarm's manifest, once metadata has been received.
    async fn manifest(&self, handle: &SwarmHandle) -> Result<Option<SwarmManifest>, EngineError>;

    /// Subscribes to the engine's lifecycle event stream.
    ///
    /// Events may be delivered unordered and duplicated; slow subscribers
    /// may observe lag per broadcast-channel semantics.
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
}
