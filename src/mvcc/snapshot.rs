//! Point-in-time view of the committed transaction set.

use std::collections::HashSet;
use std::fmt;

use super::clock::Timestamp;

/// A snapshot of MVCC state: which transaction timestamps are
/// considered committed.
///
/// The committed set is summarized as a dense prefix plus holes:
///
/// ```text
///   CCCCCCCCCCCCCCCCCUUUUUCUUUCU
///                    |    \___\___ committed_timestamps
///                    |
///                    \- all_committed_before
/// ```
///
/// A timestamp `T` is committed iff `T < all_committed_before` or
/// `committed_timestamps` contains `T`. A snapshot is *clean* when the
/// hole set is empty, i.e. commitment is a single cutoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MvccSnapshot {
    /// Every timestamp strictly below this value is committed.
    pub(crate) all_committed_before: Timestamp,

    /// Timestamps at or above the cutoff that are individually
    /// committed.
    pub(crate) committed_timestamps: HashSet<u64>,
}

impl MvccSnapshot {
    /// Snapshot considering **no** transactions committed.
    pub fn new() -> Self {
        Self::from_timestamp(Timestamp::MIN)
    }

    /// Snapshot considering every possible transaction committed.
    /// Mostly useful in test contexts.
    pub fn including_all() -> Self {
        Self::from_timestamp(Timestamp::INVALID)
    }

    /// Snapshot considering no transactions committed; the explicit
    /// spelling of [`MvccSnapshot::new`].
    pub fn including_none() -> Self {
        Self::new()
    }

    /// Clean snapshot committing exactly the timestamps strictly
    /// below `ts`.
    pub fn from_timestamp(ts: Timestamp) -> Self {
        Self {
            all_committed_before: ts,
            committed_timestamps: HashSet::new(),
        }
    }

    /// Atomic capture of a coordinator's current state.
    pub fn from_manager(manager: &super::MvccManager) -> Self {
        manager.take_snapshot()
    }

    /// Whether `ts` is committed in this snapshot.
    pub fn is_committed(&self, ts: Timestamp) -> bool {
        ts < self.all_committed_before || self.committed_timestamps.contains(&ts.value())
    }

    /// Whether any committed timestamp is ≥ `ts`.
    ///
    /// A `false` answer is authoritative and lets readers skip
    /// applying redo deltas; `true` is conservative.
    pub fn may_have_committed_at_or_after(&self, ts: Timestamp) -> bool {
        ts < self.all_committed_before
            || self.committed_timestamps.iter().any(|&t| t >= ts.value())
    }

    /// Whether any uncommitted timestamp is ≤ `ts`.
    ///
    /// A `false` answer is authoritative and lets readers skip
    /// scanning undo deltas; `true` is conservative.
    pub fn may_have_uncommitted_at_or_before(&self, ts: Timestamp) -> bool {
        !(ts < self.all_committed_before
            && self.committed_timestamps.iter().all(|&t| t > ts.value()))
    }

    /// A snapshot is clean when its committed set is exactly the
    /// prefix below the cutoff.
    pub fn is_clean(&self) -> bool {
        self.committed_timestamps.is_empty()
    }

    /// The dense-prefix cutoff. Read-only introspection for callers
    /// and tests.
    pub fn all_committed_before(&self) -> Timestamp {
        self.all_committed_before
    }
}

impl Default for MvccSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic rendering: the cutoff plus the sorted hole set.
/// Stable for debug comparisons, not a wire format.
impl fmt::Display for MvccSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MvccSnapshot[committed={{T|T < {}", self.all_committed_before)?;
        if !self.committed_timestamps.is_empty() {
            let mut holes: Vec<u64> = self.committed_timestamps.iter().copied().collect();
            holes.sort_unstable();
            write!(f, " or T in {{")?;
            for (i, t) in holes.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{t}")?;
            }
            write!(f, "}}")?;
        }
        write!(f, "}}]")
    }
}
