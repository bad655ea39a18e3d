//! Largest-plausible-video selection over the swarm manifest.

use std::path::{Path, PathBuf};

use crate::engine::FileEntry;

/// Known media container extensions, matched case-insensitively.
const MEDIA_EXTENSIONS: &[&str] = &[
    ".mp4", ".avi", ".mkv", ".mov", ".wmv", ".flv", ".webm", ".mpg", ".mpeg", ".m4v", ".3gp",
    ".ts", ".m2ts", ".vob",
];

/// Size above which a file qualifies even without a known extension,
/// unless its name suggests a sample or trailer.
const MIN_PLAUSIBLE_VIDEO_BYTES: u64 = 50_000_000;

/// The manifest entry chosen for streaming. Set at most once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub index: u32,
    pub name: String,
    pub size_bytes: u64,
    /// Where the engine materializes the file on disk.
    pub path: PathBuf,
}

impl SelectedFile {
    /// Resolves a manifest entry against the session's download directory.
    pub fn resolve(entry: &FileEntry, download_dir: &Path) -> Self {
        Self {
            index: entry.index,
            name: entry.name.clone(),
            size_bytes: entry.size_bytes,
            path: download_dir.join(&entry.name),
        }
    }
}

/// Picks the single file to stream from the manifest.
///
/// A file is a candidate if its extension matches a known media container,
/// or if it is large enough to plausibly be a video and its name does not
/// mark it as a sample or trailer. The largest candidate wins; ties go to
/// the lowest index. Deterministic and order-independent for a fixed
/// manifest. Returns None when nothing qualifies.
pub fn select_stream_file(files: &[FileEntry]) -> Option<&FileEntry> {
    let mut best: Option<&FileEntry> = None;

    for entry in files {
        if !is_candidate(entry) {
            continue;
        }
        best = match best {
            None => Some(entry),
            Some(current) if entry.size_bytes > current.size_bytes => Some(entry),
            Some(current)
                if entry.size_bytes == current.size_bytes && entry.index < current.index =>
            {
                Some(entry)
            }
            Some(current) => Some(current),
        };
    }

    best
}

fn is_candidate(entry: &FileEntry) -> bool {
    let lowered = entry.name.to_lowercase();

    let has_media_extension = MEDIA_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext));
    if has_media_extension {
        return true;
    }

    // Size-based fallback only; the name filter does not apply to files
    // that already matched a media extension.
    entry.size_bytes > MIN_PLAUSIBLE_VIDEO_BYTES
        && !lowered.contains("sample")
        && !lowered.contains("trailer")
}
