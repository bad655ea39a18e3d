//! Streaming session control
//!
//! Owns one active session at a time: drives the engine through the startup
//! protocol, applies the file-selection and piece-priority policies, keeps
//! the status cache fresh, and runs the progressive media server once the
//! swarm is playable.

pub mod controller;
pub mod priority;
pub mod selection;
pub mod startup;
pub mod status;

#[cfg(test)]
mod integration_tests;

pub use controller::StreamSessionController;
pub use priority::{PriorityPlan, plan_priorities};
pub use selection::{SelectedFile, select_stream_file};
pub use startup::{StartupGate, StartupOutcome};
pub use status::StatusCache;

/// Lifecycle state of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    AwaitingMetadata,
    Downloading,
    Ready,
    Stopping,
    Failed,
}

/// Reasons streaming did not start, surfaced to the outer caller.
///
/// None of these crash the process; all render as a human-readable
/// "streaming did not start" message.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    #[error("No network connectivity")]
    NoNetwork,

    #[error("Download directory not writable: {path}")]
    DirectoryUnwritable { path: String },

    #[error("Engine join failed: {reason}")]
    EngineJoinFailed { reason: String },

    #[error("Metadata acquisition failed: {reason}")]
    MetadataFailed { reason: String },

    #[error("Fatal transfer error: {reason}")]
    FatalTransferError { reason: String },

    #[error("Startup timed out")]
    StartupTimeout,

    #[error("No eligible media file in manifest")]
    NoEligibleFile,

    #[error("Media server bind failed: {reason}")]
    ServerBindFailed { reason: String },

    #[error("Session stopped")]
    Stopped,
}
