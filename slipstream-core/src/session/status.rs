//! Thread-safe cache of the latest swarm statistics.

use parking_lot::RwLock;

use crate::engine::StatusSnapshot;

/// Holds the last snapshot the controller observed from the engine.
///
/// Written by the event pump and the startup poll loop, read by any number
/// of progress queries without touching non-reentrant engine state. The
/// snapshot is replaced wholesale under the write lock, so readers can
/// never see fields from two different updates. Uses its own lock rather
/// than the session lock: reads vastly outnumber session transitions.
#[derive(Debug, Default)]
pub struct StatusCache {
    snapshot: RwLock<Option<StatusSnapshot>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replaces the cached snapshot.
    pub fn update(&self, snapshot: StatusSnapshot) {
        *self.snapshot.write() = Some(snapshot);
    }

    /// Returns the latest snapshot, or a zero-value snapshot before any update.
    pub fn read(&self) -> StatusSnapshot {
        self.snapshot.read().unwrap_or_default()
    }

    /// Drops the cached snapshot, returning reads to the zero value.
    pub fn clear(&self) {
        *self.snapshot.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::TransferState;

    #[test]
    fn test_read_before_update_is_zero_value() {
        let cache = StatusCache::new();
        let snapshot = cache.read();
        assert_eq!(snapshot.progress, 0.0);
        assert_eq!(snapshot.num_peers, 0);
        assert!(!snapshot.has_metadata);
    }

    #[test]
    fn test_update_replaces_wholesale() {
        let cache = StatusCache::new();
        cache.update(StatusSnapshot {
            progress: 0.5,
            num_peers: 9,
            state: TransferState::Downloading,
            has_metadata: true,
            ..Default::default()
        });

        let snapshot = cache.read();
        assert_eq!(snapshot.progress, 0.5);
        assert_eq!(snapshot.num_peers, 9);
        assert_eq!(snapshot.state, TransferState::Downloading);

        cache.clear();
        assert_eq!(cache.read().num_peers, 0);
    }

    #[test]
    fn test_concurrent_readers_never_observe_torn_snapshot() {
        // Writer alternates between two internally consistent snapshots;
        // readers must only ever see one of the two.
        let cache = Arc::new(StatusCache::new());
        let writer_cache = cache.clone();

        let writer = std::thread::spawn(move || {
            for i in 0..10_000u32 {
                let snapshot = if i % 2 == 0 {
                    StatusSnapshot {
                        progress: 0.25,
                        num_seeds: 25,
                        num_peers: 250,
                        ..Default::default()
                    }
                } else {
                    StatusSnapshot {
                        progress: 0.75,
                        num_seeds: 75,
                        num_peers: 750,
                        ..Default::default()
                    }
                };
                writer_cache.update(snapshot);
            }
        });

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        let s = cache.read();
                        let consistent = (s.progress == 0.0 && s.num_seeds == 0)
                            || (s.progress == 0.25 && s.num_seeds == 25 && s.num_peers == 250)
                            || (s.progress == 0.75 && s.num_seeds == 75 && s.num_peers == 750);
                        assert!(consistent, "torn snapshot observed: {s:?}");
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
