//! Slipstream Core - Progressive swarm-streaming session control
//!
//! This crate provides the building blocks for starting playback of a media
//! file while it is still being fetched from a peer-to-peer swarm: the
//! session controller and startup protocol, file selection and piece
//! prioritization policies, a thread-safe status cache, and an HTTP range
//! server that serves the file as it grows on disk.

pub mod config;
pub mod engine;
pub mod server;
pub mod session;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::SlipstreamConfig;
pub use engine::{ContentDescriptor, EngineError, StatusSnapshot, SwarmEngine, SwarmHandle};
pub use server::{ProgressiveMediaServer, ServerError, StreamEndpoint};
pub use session::{SessionState, StreamError, StreamSessionController};

/// Core errors that can bubble up from any Slipstream subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SlipstreamError {
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SlipstreamError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            SlipstreamError::Stream(e) => match e {
                StreamError::NoNetwork => "No network connection available".to_string(),
                StreamError::DirectoryUnwritable { path } => {
                    format!("Download directory is not writable: {path}")
                }
                StreamError::EngineJoinFailed { reason } => {
                    format!("Could not join the swarm: {reason}")
                }
                StreamError::MetadataFailed { reason } => {
                    format!("Failed to fetch swarm metadata: {reason}")
                }
                StreamError::FatalTransferError { reason } => {
                    format!("Transfer failed: {reason}")
                }
                StreamError::StartupTimeout => {
                    "Timed out waiting for the swarm to start".to_string()
                }
                StreamError::NoEligibleFile => {
                    "No playable media file found in the swarm".to_string()
                }
                StreamError::ServerBindFailed { reason } => {
                    format!("Could not open a local streaming port: {reason}")
                }
                StreamError::Stopped => "Streaming was stopped".to_string(),
            },
            SlipstreamError::Engine(EngineError::InvalidDescriptor { reason }) => {
                format!("Invalid magnet link: {reason}")
            }
            SlipstreamError::Engine(_) => "Swarm engine error occurred".to_string(),
            SlipstreamError::Server(_) => "Streaming server error occurred".to_string(),
            SlipstreamError::Configuration { .. } => "Configuration error occurred".to_string(),
            SlipstreamError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SlipstreamError::Configuration { .. }
                | SlipstreamError::Engine(EngineError::InvalidDescriptor { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, SlipstreamError>;
