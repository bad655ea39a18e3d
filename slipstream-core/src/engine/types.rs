//! Value types crossing the engine boundary.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use super::EngineError;

/// Opaque swarm identifier in magnet-URI form. Immutable, supplied by the caller.
///
/// Validation is intentionally shallow: the descriptor must be a magnet URI
/// carrying a BitTorrent info-hash topic. Everything else about it is the
/// engine's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDescriptor {
    uri: String,
    info_hash_hex: Option<String>,
}

impl ContentDescriptor {
    /// Parses and validates a magnet-style URI.
    ///
    /// # Errors
    /// - `EngineError::InvalidDescriptor` - Not a magnet URI, or missing the
    ///   `xt=urn:btih:` topic
    pub fn parse(uri: &str) -> Result<Self, EngineError> {
        let parsed = Url::parse(uri).map_err(|e| EngineError::InvalidDescriptor {
            reason: e.to_string(),
        })?;

        if parsed.scheme() != "magnet" {
            return Err(EngineError::InvalidDescriptor {
                reason: format!("expected magnet scheme, got {}", parsed.scheme()),
            });
        }

        let info_hash_hex = parsed
            .query_pairs()
            .find(|(key, value)| key == "xt" && value.starts_with("urn:btih:"))
            .map(|(_, value)| value["urn:btih:".len()..].to_ascii_lowercase());

        if info_hash_hex.is_none() {
            return Err(EngineError::InvalidDescriptor {
                reason: "missing xt=urn:btih topic".to_string(),
            });
        }

        Ok(Self {
            uri: uri.to_string(),
            info_hash_hex,
        })
    }

    /// The raw magnet URI.
    pub fn as_str(&self) -> &str {
        &self.uri
    }

    /// Lowercase hex info-hash from the `xt` topic, when present.
    pub fn info_hash_hex(&self) -> Option<&str> {
        self.info_hash_hex.as_deref()
    }
}

impl fmt::Display for ContentDescriptor {
    /// Truncated for log output; magnet URIs routinely carry hundreds of
    /// characters of tracker parameters.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SHOWN: usize = 64;
        if self.uri.len() > SHOWN {
            write!(f, "{}...", &self.uri[..SHOWN])
        } else {
            write!(f, "{}", self.uri)
        }
    }
}

/// One entry of the swarm's file manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub index: u32,
    pub name: String,
    pub size_bytes: u64,
}

/// Piece geometry of the swarm's content. Immutable once metadata is received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceLayout {
    pub total_pieces: u32,
    pub piece_size: u32,
}

/// The file manifest and piece layout carried by swarm metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmManifest {
    pub name: String,
    pub files: Vec<FileEntry>,
    pub layout: PieceLayout,
}

impl SwarmManifest {
    /// Total payload size across all files.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// Engine-reported transfer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransferState {
    #[default]
    Unknown,
    CheckingFiles,
    DownloadingMetadata,
    Downloading,
    Finished,
    Seeding,
    Allocating,
    CheckingResumeData,
}

/// Immutable point-in-time view of swarm/transfer statistics.
///
/// A new snapshot fully replaces the previous one; there is no partial
/// mutation, so readers can never observe mixed fields.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Completion fraction in [0, 1]
    pub progress: f32,
    pub download_rate_bps: u64,
    pub upload_rate_bps: u64,
    pub num_seeds: u32,
    pub num_peers: u32,
    pub state: TransferState,
    pub has_metadata: bool,
}

impl StatusSnapshot {
    /// Completion as an integer percentage in [0, 100].
    pub fn progress_percent(&self) -> u8 {
        (self.progress.clamp(0.0, 1.0) * 100.0) as u8
    }
}

/// Download priority understood by the engine, libtorrent-compatible values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Do not download at all
    Ignore,
    /// Default scheduling
    Normal,
    /// Ahead of normal pieces
    High,
    /// Front of the request queue
    Highest,
}

impl Priority {
    /// Numeric value on the engine's 0-7 scale.
    pub fn as_u8(self) -> u8 {
        match self {
            Priority::Ignore => 0,
            Priority::Normal => 4,
            Priority::High => 6,
            Priority::Highest => 7,
        }
    }
}
