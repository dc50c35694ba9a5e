//! Per-chunk mesh failure counting.

use rustc_hash::{FxHashMap, FxHashSet};

use lattice_voxel::ChunkCoord;

/// What to do after a failed mesh job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureAction {
    /// Try again; carries the consecutive failure count so far.
    Retry(u32),
    /// The limit is reached: publish a placeholder and stop retrying.
    GiveUp,
}

/// Counts consecutive failures per chunk and excludes a chunk from automatic
/// remeshing once it reaches the limit.
#[derive(Debug)]
pub struct FailureTracker {
    limit: u32,
    counts: FxHashMap<ChunkCoord, u32>,
    excluded: FxHashSet<ChunkCoord>,
}

impl FailureTracker {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            counts: FxHashMap::default(),
            excluded: FxHashSet::default(),
        }
    }

    pub fn record_failure(&mut self, coord: ChunkCoord) -> FailureAction {
        let count = self.counts.entry(coord).or_insert(0);
        *count += 1;
        if *count >= self.limit {
            self.counts.remove(&coord);
            self.excluded.insert(coord);
            FailureAction::GiveUp
        } else {
            FailureAction::Retry(*count)
        }
    }

    /// Resets the consecutive count after a good mesh.
    pub fn record_success(&mut self, coord: ChunkCoord) {
        self.counts.remove(&coord);
    }

    /// Forgets everything about `coord`, lifting any exclusion. Called when
    /// the chunk's contents change.
    pub fn clear(&mut self, coord: ChunkCoord) {
        self.counts.remove(&coord);
        self.excluded.remove(&coord);
    }

    pub fn is_excluded(&self, coord: ChunkCoord) -> bool {
        self.excluded.contains(&coord)
    }

    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const C: ChunkCoord = ChunkCoord::new(1, 2, 3);

    #[test]
    fn test_gives_up_at_limit() {
        let mut f = FailureTracker::new(3);
        assert_eq!(f.record_failure(C), FailureAction::Retry(1));
        assert_eq!(f.record_failure(C), FailureAction::Retry(2));
        assert_eq!(f.record_failure(C), FailureAction::GiveUp);
        assert!(f.is_excluded(C));
        assert_eq!(f.excluded_count(), 1);
    }

    #[test]
    fn test_success_resets_count() {
        let mut f = FailureTracker::new(3);
        f.record_failure(C);
        f.record_failure(C);
        f.record_success(C);
        assert_eq!(f.record_failure(C), FailureAction::Retry(1));
        assert!(!f.is_excluded(C));
    }

    #[test]
    fn test_clear_lifts_exclusion() {
        let mut f = FailureTracker::new(1);
        assert_eq!(f.record_failure(C), FailureAction::GiveUp);
        f.clear(C);
        assert!(!f.is_excluded(C));
    }
}
