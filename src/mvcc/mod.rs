//! # MVCC Coordination Module
//!
//! Multi-version concurrency control for a tablet: transactions obtain
//! a unique, strictly increasing [`Timestamp`] from the coordinator,
//! apply their updates, and commit; readers operate against an
//! [`MvccSnapshot`] that reports exactly which timestamps were
//! committed at capture time.
//!
//! ## Design Invariants
//!
//! - A timestamp is never simultaneously in flight and committed.
//! - Every started timestamp is either in flight or committed; there
//!   is no abort path — transactions only defer visibility.
//! - The snapshot cutoff (`all_committed_before`) is the minimum
//!   timestamp that is in flight or not yet issued, and it only moves
//!   forward: committing the earliest in-flight transaction absorbs
//!   the contiguous run of already-committed timestamps above it.
//! - Commit-time bookkeeping violations (committing an unknown
//!   timestamp, committing twice) are caller bugs and abort the
//!   process; they are never reported as recoverable errors.
//!
//! ## Blocking
//!
//! Only the `wait_for_clean_snapshot*` family blocks: a waiter
//! registers a one-shot parker under the coordinator lock, releases
//! the lock, and parks until a commit satisfies its predicate.
//! `start_transaction` never waits on other transactions.
//!
//! ## Typical use
//!
//! ```rust
//! use std::sync::Arc;
//! use tabulet::mvcc::{LogicalClock, MvccManager, ScopedTransaction};
//!
//! let mvcc = MvccManager::new(Arc::new(LogicalClock::default()));
//! let ts = {
//!     let tx = ScopedTransaction::new(&mvcc);
//!     tx.timestamp() // tag updates with this
//! }; // commits on scope exit
//! assert!(mvcc.take_snapshot().is_committed(ts));
//! ```

pub mod clock;
pub mod snapshot;

#[cfg(test)]
mod tests;

pub use clock::{Clock, LogicalClock, SystemClock, Timestamp};
pub use snapshot::MvccSnapshot;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam::sync::{Parker, Unparker};
use tracing::trace;

// ------------------------------------------------------------------------------------------------
// Internal state
// ------------------------------------------------------------------------------------------------

/// A thread parked until every transaction at or below `timestamp`
/// has committed. The unparker is one-shot: it fires exactly once,
/// when the predicate first becomes true.
struct WaitingState {
    timestamp: Timestamp,
    unparker: Unparker,
}

/// Coordinator state guarded by the single lock.
struct MvccInner {
    cur_snap: MvccSnapshot,
    timestamps_in_flight: HashSet<u64>,
    waiters: Vec<WaitingState>,
}

// ------------------------------------------------------------------------------------------------
// MvccManager
// ------------------------------------------------------------------------------------------------

/// Coordinator of MVCC transactions.
///
/// Threads wishing to make updates obtain a timestamp here, usually
/// through [`ScopedTransaction`]. All state transitions serialize on
/// one mutex; the critical sections are set operations plus a bounded
/// scan of the waiter list, so the lock is held briefly.
pub struct MvccManager {
    clock: Arc<dyn Clock>,
    inner: Mutex<MvccInner>,
}

impl MvccManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(MvccInner {
                cur_snap: MvccSnapshot::new(),
                timestamps_in_flight: HashSet::new(),
                waiters: Vec::new(),
            }),
        }
    }

    /// Begin a transaction, assigning it a fresh timestamp.
    ///
    /// Prefer [`ScopedTransaction`], which commits automatically on
    /// scope exit.
    pub fn start_transaction(&self) -> Timestamp {
        let mut inner = self.lock_inner();
        let ts = self.clock.now();
        Self::init_transaction_locked(&mut inner, ts);
        trace!(timestamp = ts.value(), "started transaction");
        ts
    }

    /// Begin a transaction at the latest possible time,
    /// i.e. now + max clock error.
    ///
    /// Returns [`Timestamp::INVALID`] when the clock cannot bound its
    /// uncertainty; no transaction is started in that case.
    pub fn start_transaction_at_latest(&self) -> Timestamp {
        let mut inner = self.lock_inner();
        match self.clock.now_latest() {
            Some(ts) => {
                Self::init_transaction_locked(&mut inner, ts);
                trace!(timestamp = ts.value(), "started transaction at latest");
                ts
            }
            None => Timestamp::INVALID,
        }
    }

    /// Commit the given transaction.
    ///
    /// # Panics
    ///
    /// Panics if `ts` is not currently in flight — committing an
    /// unknown timestamp or committing twice is a caller bug.
    pub fn commit_transaction(&self, ts: Timestamp) {
        let mut inner = self.lock_inner();
        let removed = inner.timestamps_in_flight.remove(&ts.value());
        assert!(removed, "trying to commit timestamp {ts} which is not in flight");

        Self::adjust_cur_snap_for_commit(&mut inner, ts);
        Self::wake_satisfied_waiters(&mut inner);
        trace!(timestamp = ts.value(), "committed transaction");
    }

    /// Capture the current snapshot.
    pub fn take_snapshot(&self) -> MvccSnapshot {
        self.lock_inner().cur_snap.clone()
    }

    /// Block until every transaction with a timestamp ≤ `ts` has
    /// committed, then return the clean snapshot whose committed set
    /// is exactly `{X | X ≤ ts}`.
    ///
    /// In-flight transactions above `ts` do not delay the wait.
    ///
    /// # Panics
    ///
    /// Panics unless `ts` is in the past according to the clock —
    /// waiting on a future timestamp could block on transactions that
    /// have not started yet.
    pub fn wait_for_clean_snapshot_at_timestamp(&self, ts: Timestamp) -> MvccSnapshot {
        assert!(
            self.clock.is_past(ts),
            "timestamp {ts} must be in the past to wait for a clean snapshot"
        );
        self.wait_until_all_committed(ts);
        MvccSnapshot::from_timestamp(ts.successor())
    }

    /// Barrier: take the current clock time and wait for every
    /// earlier transaction to commit.
    ///
    /// All transactions started before this call are included in the
    /// returned snapshot; none started after it will be. The result
    /// is always clean. Other transactions are not blocked meanwhile.
    pub fn wait_for_clean_snapshot(&self) -> MvccSnapshot {
        self.wait_for_clean_snapshot_at_timestamp(self.clock.now())
    }

    /// Whether no in-flight transaction has a timestamp ≤ `ts`.
    pub fn are_all_transactions_committed(&self, ts: Timestamp) -> bool {
        let inner = self.lock_inner();
        Self::all_committed_locked(&inner, ts)
    }

    /// Number of transactions currently in flight.
    pub fn count_transactions_in_flight(&self) -> usize {
        self.lock_inner().timestamps_in_flight.len()
    }

    // --------------------------------------------------------------------------------------------
    // Internals
    // --------------------------------------------------------------------------------------------

    fn lock_inner(&self) -> MutexGuard<'_, MvccInner> {
        self.inner.lock().expect("mvcc state lock poisoned")
    }

    /// Record `ts` as in flight, keeping the snapshot cutoff at the
    /// earliest in-flight timestamp.
    fn init_transaction_locked(inner: &mut MvccInner, ts: Timestamp) {
        assert!(ts != Timestamp::INVALID, "starting an invalid timestamp");
        assert!(
            ts >= inner.cur_snap.all_committed_before,
            "clock issued timestamp {ts} below the committed cutoff {}",
            inner.cur_snap.all_committed_before
        );

        // With nothing in flight and no holes, everything below the new
        // timestamp is committed or was never issued, so the cutoff can
        // jump forward to it.
        if inner.timestamps_in_flight.is_empty()
            && inner.cur_snap.committed_timestamps.is_empty()
            && inner.cur_snap.all_committed_before < ts
        {
            inner.cur_snap.all_committed_before = ts;
        }

        let inserted = inner.timestamps_in_flight.insert(ts.value());
        assert!(inserted, "timestamp {ts} is already in flight");
    }

    /// Fold a commit into the current snapshot.
    fn adjust_cur_snap_for_commit(inner: &mut MvccInner, ts: Timestamp) {
        let snap = &mut inner.cur_snap;

        if ts == snap.all_committed_before {
            // The earliest in-flight transaction committed: advance the
            // cutoff past it, absorbing the contiguous committed run.
            let mut next = ts.successor();
            while snap.committed_timestamps.remove(&next.value()) {
                next = next.successor();
            }
            snap.all_committed_before = next;
        } else if ts > snap.all_committed_before {
            let inserted = snap.committed_timestamps.insert(ts.value());
            assert!(inserted, "timestamp {ts} committed twice");
        } else {
            panic!("timestamp {ts} committed twice (already below the committed cutoff)");
        }
    }

    fn all_committed_locked(inner: &MvccInner, ts: Timestamp) -> bool {
        !inner
            .timestamps_in_flight
            .iter()
            .any(|&t| t <= ts.value())
    }

    /// Signal and drop every waiter whose predicate now holds.
    fn wake_satisfied_waiters(inner: &mut MvccInner) {
        let MvccInner {
            timestamps_in_flight,
            waiters,
            ..
        } = inner;

        waiters.retain(|waiter| {
            let satisfied = !timestamps_in_flight
                .iter()
                .any(|&t| t <= waiter.timestamp.value());
            if satisfied {
                trace!(target_timestamp = waiter.timestamp.value(), "waking waiter");
                waiter.unparker.unpark();
            }
            !satisfied
        });
    }

    /// Park the calling thread until every transaction ≤ `ts` has
    /// committed. Uninterruptible; the unpark fires only once the
    /// predicate holds, and commits never roll back, so a single park
    /// suffices.
    fn wait_until_all_committed(&self, ts: Timestamp) {
        let parker = {
            let mut inner = self.lock_inner();
            if Self::all_committed_locked(&inner, ts) {
                return;
            }
            let parker = Parker::new();
            inner.waiters.push(WaitingState {
                timestamp: ts,
                unparker: parker.unparker().clone(),
            });
            parker
        };

        trace!(
            target_timestamp = ts.value(),
            "waiting for in-flight transactions"
        );
        parker.park();
    }
}

// ------------------------------------------------------------------------------------------------
// ScopedTransaction
// ------------------------------------------------------------------------------------------------

/// RAII handle to a running transaction: going out of scope commits
/// it, unless [`ScopedTransaction::commit`] already did.
///
/// The manager must outlive the handle; the borrow makes the compiler
/// enforce that. Handles are neither copyable nor clonable.
pub struct ScopedTransaction<'a> {
    manager: &'a MvccManager,
    timestamp: Timestamp,
    committed: bool,
}

impl<'a> ScopedTransaction<'a> {
    /// Start a transaction via [`MvccManager::start_transaction`].
    pub fn new(manager: &'a MvccManager) -> Self {
        Self {
            manager,
            timestamp: manager.start_transaction(),
            committed: false,
        }
    }

    /// Start a transaction via
    /// [`MvccManager::start_transaction_at_latest`].
    ///
    /// If the clock refuses, the handle is inert: `timestamp()` is
    /// [`Timestamp::INVALID`] and dropping it does nothing.
    pub fn new_at_latest(manager: &'a MvccManager) -> Self {
        let timestamp = manager.start_transaction_at_latest();
        Self {
            manager,
            timestamp,
            committed: timestamp == Timestamp::INVALID,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Commit the transaction. Idempotent after the first call.
    pub fn commit(&mut self) {
        if !self.committed {
            self.committed = true;
            self.manager.commit_transaction(self.timestamp);
        }
    }
}

impl Drop for ScopedTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.manager.commit_transaction(self.timestamp);
        }
    }
}
