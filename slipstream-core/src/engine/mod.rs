//! Boundary to the external swarm engine
//!
//! The engine itself (wire protocol, discovery, piece verification, disk
//! I/O) lives outside this crate. This module defines the narrow surface
//! the session controller drives it through: a command trait, a broadcast
//! event stream, and the value types that cross the boundary.

pub mod events;
pub mod simulation;
pub mod traits;
pub mod types;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use events::EngineEvent;
pub use simulation::{SimulatedSwarmConfig, SimulatedSwarmEngine};
pub use traits::SwarmEngine;
pub use types::{
    ContentDescriptor, FileEntry, PieceLayout, Priority, StatusSnapshot, SwarmManifest,
    TransferState,
};

/// Opaque engine-assigned identifier for one swarm membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwarmId(u64);

impl SwarmId {
    /// Creates SwarmId from a raw engine identifier.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying identifier.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SwarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Capability referencing one active swarm membership inside the engine.
///
/// The engine can silently invalidate a handle at any time (error, removal).
/// Callers must check `is_valid()` immediately before every use and must
/// not cache the result across calls.
#[derive(Debug, Clone)]
pub struct SwarmHandle {
    id: SwarmId,
    valid: Arc<AtomicBool>,
}

impl SwarmHandle {
    /// Creates a new valid handle for the given swarm.
    pub fn new(id: SwarmId) -> Self {
        Self {
            id,
            valid: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Returns the swarm identifier this handle refers to.
    pub fn id(&self) -> SwarmId {
        self.id
    }

    /// Whether the engine still considers this handle usable.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Marks the handle unusable. Visible to all clones.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl fmt::Display for SwarmHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Errors that can occur at the engine boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid content descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    #[error("Swarm handle {id} is no longer valid")]
    InvalidHandle { id: SwarmId },

    #[error("Swarm {id} not found")]
    SwarmNotFound { id: SwarmId },

    #[error("Engine command failed: {reason}")]
    CommandFailed { reason: String },

    #[error("Engine has shut down")]
    EngineShutdown,
}
