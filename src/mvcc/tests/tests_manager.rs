#[cfg(test)]
mod manager_tests {
    use crate::mvcc::{LogicalClock, MvccManager, MvccSnapshot, Timestamp};
    use std::sync::Arc;

    fn manager() -> MvccManager {
        MvccManager::new(Arc::new(LogicalClock::default()))
    }

    #[test]
    fn test_start_issues_increasing_timestamps() {
        let mvcc = manager();
        let t1 = mvcc.start_transaction();
        let t2 = mvcc.start_transaction();
        let t3 = mvcc.start_transaction();

        assert!(t1 < t2);
        assert!(t2 < t3);
        assert_eq!(mvcc.count_transactions_in_flight(), 3);

        // Nothing committed yet; the cutoff sits at the earliest
        // in-flight timestamp.
        let snap = mvcc.take_snapshot();
        assert_eq!(snap.all_committed_before(), t1);
        assert!(snap.is_clean());
        assert!(!snap.is_committed(t1));
        assert!(!snap.is_committed(t2));
        assert!(!snap.is_committed(t3));
    }

    #[test]
    fn test_commit_out_of_order_leaves_hole_then_collapses() {
        let mvcc = manager();
        let t1 = mvcc.start_transaction();
        let t2 = mvcc.start_transaction();
        let t3 = mvcc.start_transaction();

        // Committing the middle transaction leaves a hole above the
        // cutoff.
        mvcc.commit_transaction(t2);
        let snap = mvcc.take_snapshot();
        assert_eq!(snap.all_committed_before(), t1);
        assert!(!snap.is_clean());
        assert!(!snap.is_committed(t1));
        assert!(snap.is_committed(t2));
        assert!(!snap.is_committed(t3));

        // Committing the earliest absorbs the hole; the cutoff jumps
        // to the remaining in-flight transaction.
        mvcc.commit_transaction(t1);
        let snap = mvcc.take_snapshot();
        assert_eq!(snap.all_committed_before(), t3);
        assert!(snap.is_clean());
        assert!(snap.is_committed(t1));
        assert!(snap.is_committed(t2));
        assert!(!snap.is_committed(t3));

        mvcc.commit_transaction(t3);
        let snap = mvcc.take_snapshot();
        assert!(snap.is_clean());
        assert!(snap.is_committed(t3));
        assert_eq!(mvcc.count_transactions_in_flight(), 0);
    }

    #[test]
    fn test_cutoff_tracks_earliest_in_flight_or_next_unissued() {
        let mvcc = manager();
        let t: Vec<Timestamp> = (0..5).map(|_| mvcc.start_transaction()).collect();

        // Commit order: t[2], t[0], t[1], t[4], t[3]; after each, the
        // cutoff equals the earliest in-flight timestamp, or the next
        // unissued one once everything committed.
        mvcc.commit_transaction(t[2]);
        assert_eq!(mvcc.take_snapshot().all_committed_before(), t[0]);
        mvcc.commit_transaction(t[0]);
        assert_eq!(mvcc.take_snapshot().all_committed_before(), t[1]);
        mvcc.commit_transaction(t[1]);
        assert_eq!(mvcc.take_snapshot().all_committed_before(), t[3]);
        mvcc.commit_transaction(t[4]);
        assert_eq!(mvcc.take_snapshot().all_committed_before(), t[3]);
        mvcc.commit_transaction(t[3]);
        assert_eq!(
            mvcc.take_snapshot().all_committed_before(),
            Timestamp::new(t[4].value() + 1)
        );
        assert!(mvcc.take_snapshot().is_clean());
    }

    #[test]
    fn test_in_flight_and_committed_stay_disjoint() {
        let mvcc = manager();
        let t: Vec<Timestamp> = (0..6).map(|_| mvcc.start_transaction()).collect();

        for (i, &commit) in [t[1], t[3], t[0], t[5]].iter().enumerate() {
            mvcc.commit_transaction(commit);
            let snap = mvcc.take_snapshot();
            let committed = &[t[1], t[3], t[0], t[5]][..=i];
            for &x in &t {
                let should_be_committed = committed.contains(&x);
                assert_eq!(snap.is_committed(x), should_be_committed, "ts {x}");
            }
        }
    }

    #[test]
    fn test_are_all_transactions_committed() {
        let mvcc = manager();
        let t1 = mvcc.start_transaction();
        let t2 = mvcc.start_transaction();
        let t3 = mvcc.start_transaction();

        assert!(!mvcc.are_all_transactions_committed(t1));
        assert!(mvcc.are_all_transactions_committed(Timestamp::MIN));

        mvcc.commit_transaction(t2);
        assert!(!mvcc.are_all_transactions_committed(t1));
        assert!(!mvcc.are_all_transactions_committed(t2));

        mvcc.commit_transaction(t1);
        assert!(mvcc.are_all_transactions_committed(t1));
        assert!(mvcc.are_all_transactions_committed(t2));
        assert!(!mvcc.are_all_transactions_committed(t3));

        mvcc.commit_transaction(t3);
        assert!(mvcc.are_all_transactions_committed(t3));
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_commits() {
        let mvcc = manager();
        let t1 = mvcc.start_transaction();

        let before = mvcc.take_snapshot();
        mvcc.commit_transaction(t1);
        let after = mvcc.take_snapshot();

        assert!(!before.is_committed(t1));
        assert!(after.is_committed(t1));
        assert_eq!(after, MvccSnapshot::from_manager(&mvcc));
    }

    #[test]
    fn test_wait_returns_immediately_when_prefix_clean() {
        let mvcc = manager();
        let t1 = mvcc.start_transaction();
        mvcc.commit_transaction(t1);

        // A later transaction above the target must not delay the wait.
        let t2 = mvcc.start_transaction();

        let snap = mvcc.wait_for_clean_snapshot_at_timestamp(t1);
        assert!(snap.is_clean());
        assert!(snap.is_committed(t1));
        assert!(!snap.is_committed(t2));

        mvcc.commit_transaction(t2);
    }

    #[test]
    fn test_wait_for_clean_snapshot_with_no_activity() {
        let mvcc = manager();
        let snap = mvcc.wait_for_clean_snapshot();
        assert!(snap.is_clean());
    }

    #[test]
    #[should_panic(expected = "not in flight")]
    fn test_commit_unknown_timestamp_panics() {
        let mvcc = manager();
        mvcc.commit_transaction(Timestamp::new(12345));
    }

    #[test]
    #[should_panic(expected = "not in flight")]
    fn test_double_commit_panics() {
        let mvcc = manager();
        let t1 = mvcc.start_transaction();
        mvcc.commit_transaction(t1);
        mvcc.commit_transaction(t1);
    }

    #[test]
    #[should_panic(expected = "must be in the past")]
    fn test_wait_on_future_timestamp_panics() {
        let mvcc = manager();
        let _ = mvcc.wait_for_clean_snapshot_at_timestamp(Timestamp::new(999_999));
    }
}
