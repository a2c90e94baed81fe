#[cfg(test)]
mod registry_tests {
    use kvt_common::error::{ErrorCode, KvtError};
    use kvt_common::types::{CcScheme, Partitioning, TableId, TxnId};

    use crate::KvtEngine;

    #[test]
    fn test_create_and_lookup() {
        let e = KvtEngine::with_scheme(CcScheme::NoCc);
        let id = e.create_table("users", Partitioning::Hash).unwrap();
        assert_eq!(id, TableId(1));
        assert_eq!(e.lookup_table("users").unwrap(), id);
    }

    #[test]
    fn test_duplicate_create_fails() {
        let e = KvtEngine::with_scheme(CcScheme::NoCc);
        e.create_table("t", Partitioning::Hash).unwrap();
        let err = e.create_table("t", Partitioning::Range).unwrap_err();
        assert_eq!(err.code(), ErrorCode::TableAlreadyExists);
    }

    #[test]
    fn test_lookup_unknown_table() {
        let e = KvtEngine::with_scheme(CcScheme::NoCc);
        let err = e.lookup_table("missing").unwrap_err();
        assert_eq!(err.code(), ErrorCode::TableNotFound);
    }

    #[test]
    fn test_invalid_partition_method_string() {
        let err = "list".parse::<Partitioning>().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPartitionMethod);
    }

    #[test]
    fn test_table_ids_are_dense() {
        let e = KvtEngine::with_scheme(CcScheme::NoCc);
        assert_eq!(e.create_table("a", Partitioning::Hash).unwrap(), TableId(1));
        assert_eq!(e.create_table("b", Partitioning::Hash).unwrap(), TableId(2));
        let _ = e.create_table("a", Partitioning::Hash).unwrap_err();
        assert_eq!(e.create_table("c", Partitioning::Hash).unwrap(), TableId(3));
    }

    #[test]
    fn test_open_table_is_create_or_lookup() {
        let e = KvtEngine::with_scheme(CcScheme::NoCc);
        let id = e.open_table("t", Partitioning::Range).unwrap();
        assert_eq!(e.open_table("t", Partitioning::Range).unwrap(), id);
        // Same name, different partitioning is refused.
        let err = e.open_table("t", Partitioning::Hash).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPartitionMethod);
    }

    #[test]
    fn test_unknown_table_id_fails_operations() {
        let e = KvtEngine::with_scheme(CcScheme::NoCc);
        let missing = TableId(99);
        assert!(matches!(
            e.get(TxnId::AUTO_COMMIT, missing, b"k"),
            Err(KvtError::TableNotFound(_))
        ));
        assert!(matches!(
            e.set(TxnId::AUTO_COMMIT, missing, b"k", b"v"),
            Err(KvtError::TableNotFound(_))
        ));
        assert!(matches!(
            e.scan(TxnId::AUTO_COMMIT, missing, b"a", b"z", 10),
            Err(KvtError::TableNotFound(_))
        ));
    }
}

#[cfg(test)]
mod one_shot_tests {
    use kvt_common::error::KvtError;
    use kvt_common::types::{CcScheme, Partitioning, TxnId};

    use crate::KvtEngine;

    const ONE_SHOT: TxnId = TxnId::AUTO_COMMIT;

    #[test]
    fn test_basic_crud_one_shot() {
        for scheme in [CcScheme::NoCc, CcScheme::Serialized] {
            let e = KvtEngine::with_scheme(scheme);
            let t = e.create_table("t", Partitioning::Hash).unwrap();
            e.set(ONE_SHOT, t, b"k", b"v1").unwrap();
            assert_eq!(e.get(ONE_SHOT, t, b"k").unwrap(), b"v1");
            e.set(ONE_SHOT, t, b"k", b"v2").unwrap();
            assert_eq!(e.get(ONE_SHOT, t, b"k").unwrap(), b"v2");
            e.del(ONE_SHOT, t, b"k").unwrap();
            assert!(matches!(e.get(ONE_SHOT, t, b"k"), Err(KvtError::KeyNotFound)));
        }
    }

    #[test]
    fn test_one_shot_writes_forbidden_under_locking_and_optimistic() {
        for scheme in [CcScheme::TwoPhaseLocking, CcScheme::Optimistic] {
            let e = KvtEngine::with_scheme(scheme);
            let t = e.create_table("t", Partitioning::Hash).unwrap();
            assert!(matches!(
                e.set(ONE_SHOT, t, b"k", b"v"),
                Err(KvtError::OneShotWriteNotAllowed)
            ));
            assert!(matches!(
                e.del(ONE_SHOT, t, b"k"),
                Err(KvtError::OneShotDeleteNotAllowed)
            ));
        }
    }

    #[test]
    fn test_one_shot_delete_of_absent_key() {
        let e = KvtEngine::with_scheme(CcScheme::NoCc);
        let t = e.create_table("t", Partitioning::Hash).unwrap();
        assert!(matches!(e.del(ONE_SHOT, t, b"nope"), Err(KvtError::KeyNotFound)));
    }

    #[test]
    fn test_one_shot_get_reads_committed_state_under_optimistic() {
        let e = KvtEngine::with_scheme(CcScheme::Optimistic);
        let t = e.create_table("t", Partitioning::Hash).unwrap();
        let tx = e.begin().unwrap();
        e.set(tx, t, b"k", b"v").unwrap();
        assert!(matches!(e.get(ONE_SHOT, t, b"k"), Err(KvtError::KeyNotFound)));
        e.commit(tx).unwrap();
        assert_eq!(e.get(ONE_SHOT, t, b"k").unwrap(), b"v");
    }
}

#[cfg(test)]
mod serialized_tests {
    use kvt_common::error::KvtError;
    use kvt_common::types::{CcScheme, Partitioning, TableId, TxnId};

    use crate::KvtEngine;

    const ONE_SHOT: TxnId = TxnId::AUTO_COMMIT;

    fn setup() -> (KvtEngine, TableId) {
        let e = KvtEngine::with_scheme(CcScheme::Serialized);
        let t = e.create_table("t", Partitioning::Hash).unwrap();
        (e, t)
    }

    #[test]
    fn test_second_begin_fails_while_txn_live() {
        let (e, _t) = setup();
        let tx = e.begin().unwrap();
        assert!(matches!(e.begin(), Err(KvtError::TxnAlreadyRunning)));
        e.commit(tx).unwrap();
        let tx2 = e.begin().unwrap();
        assert!(tx2 > tx);
        e.rollback(tx2).unwrap();
        assert!(e.begin().is_ok());
    }

    #[test]
    fn test_commit_visibility() {
        let (e, t) = setup();
        let tx = e.begin().unwrap();
        e.set(tx, t, b"x", b"1").unwrap();
        assert!(matches!(e.get(ONE_SHOT, t, b"x"), Err(KvtError::KeyNotFound)));
        e.commit(tx).unwrap();
        assert_eq!(e.get(ONE_SHOT, t, b"x").unwrap(), b"1");
    }

    #[test]
    fn test_rollback_discards_writes() {
        let (e, t) = setup();
        let tx = e.begin().unwrap();
        e.set(tx, t, b"y", b"1").unwrap();
        e.rollback(tx).unwrap();
        assert!(matches!(e.get(ONE_SHOT, t, b"y"), Err(KvtError::KeyNotFound)));
    }

    #[test]
    fn test_read_your_writes() {
        let (e, t) = setup();
        let tx = e.begin().unwrap();
        e.set(tx, t, b"k", b"v1").unwrap();
        assert_eq!(e.get(tx, t, b"k").unwrap(), b"v1");
        e.set(tx, t, b"k", b"v2").unwrap();
        assert_eq!(e.get(tx, t, b"k").unwrap(), b"v2");
        e.commit(tx).unwrap();
        assert_eq!(e.get(ONE_SHOT, t, b"k").unwrap(), b"v2");
    }

    #[test]
    fn test_transactional_delete_reads_as_deleted() {
        let (e, t) = setup();
        e.set(ONE_SHOT, t, b"k", b"v").unwrap();
        let tx = e.begin().unwrap();
        e.del(tx, t, b"k").unwrap();
        assert!(matches!(e.get(tx, t, b"k"), Err(KvtError::KeyIsDeleted)));
        // Committed state still holds the value until commit.
        assert_eq!(e.get(ONE_SHOT, t, b"k").unwrap(), b"v");
        e.commit(tx).unwrap();
        assert!(matches!(e.get(ONE_SHOT, t, b"k"), Err(KvtError::KeyNotFound)));
    }

    #[test]
    fn test_delete_then_set_restores_key() {
        let (e, t) = setup();
        e.set(ONE_SHOT, t, b"k", b"old").unwrap();
        let tx = e.begin().unwrap();
        e.del(tx, t, b"k").unwrap();
        e.set(tx, t, b"k", b"new").unwrap();
        assert_eq!(e.get(tx, t, b"k").unwrap(), b"new");
        e.commit(tx).unwrap();
        assert_eq!(e.get(ONE_SHOT, t, b"k").unwrap(), b"new");
    }

    #[test]
    fn test_transactional_delete_of_absent_key() {
        let (e, t) = setup();
        let tx = e.begin().unwrap();
        assert!(matches!(e.del(tx, t, b"nope"), Err(KvtError::KeyNotFound)));
        // The failed delete mutates nothing; the context stays usable.
        e.set(tx, t, b"k", b"v").unwrap();
        e.commit(tx).unwrap();
    }

    #[test]
    fn test_committed_ids_are_never_reused() {
        let (e, t) = setup();
        let tx = e.begin().unwrap();
        e.set(tx, t, b"k", b"v").unwrap();
        e.commit(tx).unwrap();
        assert!(matches!(e.commit(tx), Err(KvtError::TxnNotFound(_))));
        assert!(matches!(e.rollback(tx), Err(KvtError::TxnNotFound(_))));
        assert!(matches!(e.get(tx, t, b"k"), Err(KvtError::TxnNotFound(_))));
    }
}

#[cfg(test)]
mod locking_tests {
    use kvt_common::error::KvtError;
    use kvt_common::types::{CcScheme, Partitioning, TableId, TxnId};

    use crate::KvtEngine;

    const ONE_SHOT: TxnId = TxnId::AUTO_COMMIT;

    fn setup() -> (KvtEngine, TableId) {
        let e = KvtEngine::with_scheme(CcScheme::TwoPhaseLocking);
        let t = e.create_table("t", Partitioning::Range).unwrap();
        (e, t)
    }

    /// Seed committed state. One-shot writes are forbidden under 2PL, so
    /// seeding goes through a throwaway transaction.
    fn seed<K: AsRef<[u8]>, V: AsRef<[u8]>>(e: &KvtEngine, t: TableId, pairs: &[(K, V)]) {
        let tx = e.begin().unwrap();
        for (k, v) in pairs {
            e.set(tx, t, k.as_ref(), v.as_ref()).unwrap();
        }
        e.commit(tx).unwrap();
    }

    #[test]
    fn test_read_lock_blocks_other_readers_and_writers() {
        let (e, t) = setup();
        seed(&e, t, &[(b"k", b"v")]);
        let t1 = e.begin().unwrap();
        let t2 = e.begin().unwrap();
        assert_eq!(e.get(t1, t, b"k").unwrap(), b"v");
        assert!(matches!(e.get(t2, t, b"k"), Err(KvtError::KeyIsLocked)));
        assert!(matches!(e.set(t2, t, b"k", b"x"), Err(KvtError::KeyIsLocked)));
        // The conflict leaves t2 live; after t1 commits, t2 proceeds.
        e.commit(t1).unwrap();
        assert_eq!(e.get(t2, t, b"k").unwrap(), b"v");
        e.commit(t2).unwrap();
    }

    #[test]
    fn test_write_lock_surfaces_to_one_shot_readers() {
        let (e, t) = setup();
        seed(&e, t, &[(b"x", b"0")]);
        let tx = e.begin().unwrap();
        e.set(tx, t, b"x", b"1").unwrap();
        assert!(matches!(e.get(ONE_SHOT, t, b"x"), Err(KvtError::KeyIsLocked)));
        e.commit(tx).unwrap();
        assert_eq!(e.get(ONE_SHOT, t, b"x").unwrap(), b"1");
    }

    #[test]
    fn test_new_key_reservation_is_invisible_and_removed_on_rollback() {
        let (e, t) = setup();
        let tx = e.begin().unwrap();
        e.set(tx, t, b"fresh", b"v").unwrap();
        // The reservation holds the lock but exposes no value.
        assert!(matches!(e.get(ONE_SHOT, t, b"fresh"), Err(KvtError::KeyIsLocked)));
        e.rollback(tx).unwrap();
        assert!(matches!(e.get(ONE_SHOT, t, b"fresh"), Err(KvtError::KeyNotFound)));
        // And the lock is gone: another transaction can take the key.
        let tx2 = e.begin().unwrap();
        e.set(tx2, t, b"fresh", b"w").unwrap();
        e.commit(tx2).unwrap();
        assert_eq!(e.get(ONE_SHOT, t, b"fresh").unwrap(), b"w");
    }

    #[test]
    fn test_rollback_releases_read_locks() {
        let (e, t) = setup();
        seed(&e, t, &[(b"k", b"v")]);
        let t1 = e.begin().unwrap();
        e.get(t1, t, b"k").unwrap();
        e.rollback(t1).unwrap();
        let t2 = e.begin().unwrap();
        e.set(t2, t, b"k", b"w").unwrap();
        e.commit(t2).unwrap();
        assert_eq!(e.get(ONE_SHOT, t, b"k").unwrap(), b"w");
    }

    #[test]
    fn test_delete_locks_until_commit() {
        let (e, t) = setup();
        seed(&e, t, &[(b"k", b"v")]);
        let t1 = e.begin().unwrap();
        e.del(t1, t, b"k").unwrap();
        let t2 = e.begin().unwrap();
        assert!(matches!(e.get(t2, t, b"k"), Err(KvtError::KeyIsLocked)));
        e.commit(t1).unwrap();
        assert!(matches!(e.get(t2, t, b"k"), Err(KvtError::KeyNotFound)));
        e.rollback(t2).unwrap();
    }

    #[test]
    fn test_scan_fails_fast_and_releases_partial_locks() {
        let (e, t) = setup();
        seed(&e, t, &[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")]);
        let t1 = e.begin().unwrap();
        e.set(t1, t, b"b", b"2x").unwrap();
        let t2 = e.begin().unwrap();
        assert!(matches!(
            e.scan(t2, t, b"a", b"c", 10),
            Err(KvtError::KeyIsLocked)
        ));
        // The aborted scan must have released the lock it took on "a":
        // a third transaction can read it.
        let t3 = e.begin().unwrap();
        assert_eq!(e.get(t3, t, b"a").unwrap(), b"1");
        e.rollback(t3).unwrap();
        e.rollback(t2).unwrap();
        e.rollback(t1).unwrap();
    }

    #[test]
    fn test_scan_locks_results_against_writers() {
        let (e, t) = setup();
        seed(&e, t, &[(b"a", b"1"), (b"b", b"2")]);
        let t1 = e.begin().unwrap();
        let rows = e.scan(t1, t, b"a", b"b", 10).unwrap();
        assert_eq!(rows.len(), 2);
        let t2 = e.begin().unwrap();
        assert!(matches!(e.set(t2, t, b"a", b"x"), Err(KvtError::KeyIsLocked)));
        e.commit(t1).unwrap();
        e.set(t2, t, b"a", b"x").unwrap();
        e.commit(t2).unwrap();
    }

    #[test]
    fn test_scan_merges_pending_writes_and_skips_deletes() {
        let (e, t) = setup();
        seed(&e, t, &[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")]);
        let tx = e.begin().unwrap();
        e.del(tx, t, b"b").unwrap();
        e.set(tx, t, b"ab", b"new").unwrap();
        e.set(tx, t, b"c", b"3x").unwrap();
        let rows = e.scan(tx, t, b"a", b"c", 10).unwrap();
        let expected: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"ab".to_vec(), b"new".to_vec()),
            (b"c".to_vec(), b"3x".to_vec()),
        ];
        assert_eq!(rows, expected);
        e.commit(tx).unwrap();
    }

    #[test]
    fn test_foreign_reservation_fails_scan() {
        let (e, t) = setup();
        seed(&e, t, &[(b"a", b"1")]);
        let t1 = e.begin().unwrap();
        e.set(t1, t, b"b", b"new").unwrap();
        let t2 = e.begin().unwrap();
        assert!(matches!(
            e.scan(t2, t, b"a", b"c", 10),
            Err(KvtError::KeyIsLocked)
        ));
        e.rollback(t1).unwrap();
        assert_eq!(e.scan(t2, t, b"a", b"c", 10).unwrap().len(), 1);
        e.rollback(t2).unwrap();
    }
}

#[cfg(test)]
mod optimistic_tests {
    use kvt_common::error::KvtError;
    use kvt_common::types::{CcScheme, Partitioning, TableId, TxnId};

    use crate::KvtEngine;

    const ONE_SHOT: TxnId = TxnId::AUTO_COMMIT;

    fn setup() -> (KvtEngine, TableId) {
        let e = KvtEngine::with_scheme(CcScheme::Optimistic);
        let t = e.create_table("t", Partitioning::Range).unwrap();
        (e, t)
    }

    fn seed<K: AsRef<[u8]>, V: AsRef<[u8]>>(e: &KvtEngine, t: TableId, pairs: &[(K, V)]) {
        let tx = e.begin().unwrap();
        for (k, v) in pairs {
            e.set(tx, t, k.as_ref(), v.as_ref()).unwrap();
        }
        e.commit(tx).unwrap();
    }

    #[test]
    fn test_first_committer_wins() {
        let (e, t) = setup();
        seed(&e, t, &[(b"k", b"0")]);
        let t1 = e.begin().unwrap();
        let t2 = e.begin().unwrap();
        e.get(t1, t, b"k").unwrap();
        e.get(t2, t, b"k").unwrap();
        e.set(t1, t, b"k", b"a").unwrap();
        e.set(t2, t, b"k", b"b").unwrap();
        e.commit(t1).unwrap();
        assert!(matches!(e.commit(t2), Err(KvtError::StaleData(_))));
        assert_eq!(e.get(ONE_SHOT, t, b"k").unwrap(), b"a");
    }

    #[test]
    fn test_stale_read_only_txn_fails_validation() {
        let (e, t) = setup();
        seed(&e, t, &[(b"k", b"0")]);
        let t1 = e.begin().unwrap();
        e.get(t1, t, b"k").unwrap();
        let t2 = e.begin().unwrap();
        e.set(t2, t, b"k", b"1").unwrap();
        e.commit(t2).unwrap();
        assert!(matches!(e.commit(t1), Err(KvtError::StaleData(_))));
    }

    #[test]
    fn test_delete_carries_version_to_validation() {
        let (e, t) = setup();
        seed(&e, t, &[(b"k", b"0")]);
        let t1 = e.begin().unwrap();
        e.del(t1, t, b"k").unwrap();
        let t2 = e.begin().unwrap();
        e.set(t2, t, b"k", b"1").unwrap();
        e.commit(t2).unwrap();
        assert!(matches!(e.commit(t1), Err(KvtError::StaleData(_))));
        assert_eq!(e.get(ONE_SHOT, t, b"k").unwrap(), b"1");
    }

    #[test]
    fn test_new_key_must_still_be_absent_at_commit() {
        let (e, t) = setup();
        let t1 = e.begin().unwrap();
        let t2 = e.begin().unwrap();
        e.set(t1, t, b"fresh", b"a").unwrap();
        e.set(t2, t, b"fresh", b"b").unwrap();
        e.commit(t2).unwrap();
        assert!(matches!(e.commit(t1), Err(KvtError::StaleData(_))));
        assert_eq!(e.get(ONE_SHOT, t, b"fresh").unwrap(), b"b");
    }

    #[test]
    fn test_blind_overwrite_of_existing_key_skips_validation() {
        let (e, t) = setup();
        seed(&e, t, &[(b"k", b"0")]);
        let t1 = e.begin().unwrap();
        let t2 = e.begin().unwrap();
        // Neither transaction reads the key first.
        e.set(t1, t, b"k", b"a").unwrap();
        e.set(t2, t, b"k", b"b").unwrap();
        e.commit(t2).unwrap();
        e.commit(t1).unwrap();
        assert_eq!(e.get(ONE_SHOT, t, b"k").unwrap(), b"a");
    }

    #[test]
    fn test_deleted_key_reads_as_deleted_in_txn() {
        let (e, t) = setup();
        seed(&e, t, &[(b"k", b"v")]);
        let tx = e.begin().unwrap();
        e.del(tx, t, b"k").unwrap();
        assert!(matches!(e.get(tx, t, b"k"), Err(KvtError::KeyIsDeleted)));
        e.commit(tx).unwrap();
        assert!(matches!(e.get(ONE_SHOT, t, b"k"), Err(KvtError::KeyNotFound)));
    }

    #[test]
    fn test_delete_then_set_then_commit() {
        let (e, t) = setup();
        seed(&e, t, &[(b"k", b"old")]);
        let tx = e.begin().unwrap();
        e.get(tx, t, b"k").unwrap();
        e.del(tx, t, b"k").unwrap();
        e.set(tx, t, b"k", b"new").unwrap();
        assert_eq!(e.get(tx, t, b"k").unwrap(), b"new");
        e.commit(tx).unwrap();
        assert_eq!(e.get(ONE_SHOT, t, b"k").unwrap(), b"new");
    }

    #[test]
    fn test_failed_commit_destroys_context() {
        let (e, t) = setup();
        seed(&e, t, &[(b"k", b"0")]);
        let t1 = e.begin().unwrap();
        e.get(t1, t, b"k").unwrap();
        let t2 = e.begin().unwrap();
        e.set(t2, t, b"k", b"1").unwrap();
        e.commit(t2).unwrap();
        assert!(matches!(e.commit(t1), Err(KvtError::StaleData(_))));
        // No retry on the same id: the context is gone.
        assert!(matches!(e.commit(t1), Err(KvtError::TxnNotFound(_))));
        assert!(matches!(e.get(t1, t, b"k"), Err(KvtError::TxnNotFound(_))));
    }

    #[test]
    fn test_disjoint_keys_commit_concurrently() {
        let (e, t) = setup();
        let t1 = e.begin().unwrap();
        let t2 = e.begin().unwrap();
        e.set(t1, t, b"a", b"1").unwrap();
        e.set(t2, t, b"b", b"2").unwrap();
        e.commit(t1).unwrap();
        e.commit(t2).unwrap();
        assert_eq!(e.get(ONE_SHOT, t, b"a").unwrap(), b"1");
        assert_eq!(e.get(ONE_SHOT, t, b"b").unwrap(), b"2");
    }

    #[test]
    fn test_scan_records_returned_keys_in_read_set() {
        let (e, t) = setup();
        seed(&e, t, &[(b"a", b"1"), (b"b", b"2")]);
        let t1 = e.begin().unwrap();
        let rows = e.scan(t1, t, b"a", b"z", 10).unwrap();
        assert_eq!(rows.len(), 2);
        let t2 = e.begin().unwrap();
        e.set(t2, t, b"b", b"2x").unwrap();
        e.commit(t2).unwrap();
        assert!(matches!(e.commit(t1), Err(KvtError::StaleData(_))));
    }

    #[test]
    fn test_scan_truncation_limits_read_set_recording() {
        let (e, t) = setup();
        seed(&e, t, &[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")]);
        let t1 = e.begin().unwrap();
        let rows = e.scan(t1, t, b"a", b"z", 1).unwrap();
        assert_eq!(rows, vec![(b"a".to_vec(), b"1".to_vec())]);
        // A concurrent update to a key the scan did not return does not
        // invalidate the transaction.
        let t2 = e.begin().unwrap();
        e.set(t2, t, b"c", b"3x").unwrap();
        e.commit(t2).unwrap();
        e.commit(t1).unwrap();
    }
}

#[cfg(test)]
mod scan_tests {
    use kvt_common::error::KvtError;
    use kvt_common::types::{CcScheme, Partitioning, TxnId};

    use crate::KvtEngine;

    const ONE_SHOT: TxnId = TxnId::AUTO_COMMIT;

    #[test]
    fn test_scan_closed_on_both_ends() {
        let e = KvtEngine::with_scheme(CcScheme::NoCc);
        let t = e.create_table("r", Partitioning::Range).unwrap();
        e.set(ONE_SHOT, t, b"a", b"1").unwrap();
        e.set(ONE_SHOT, t, b"b", b"2").unwrap();
        e.set(ONE_SHOT, t, b"c", b"3").unwrap();
        let rows = e.scan(ONE_SHOT, t, b"a", b"b", 10).unwrap();
        assert_eq!(
            rows,
            vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]
        );
        let capped = e.scan(ONE_SHOT, t, b"a", b"c", 2).unwrap();
        assert_eq!(capped.len(), 2);
        assert!(capped.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_scan_single_key_range() {
        let e = KvtEngine::with_scheme(CcScheme::NoCc);
        let t = e.create_table("r", Partitioning::Range).unwrap();
        e.set(ONE_SHOT, t, b"a", b"1").unwrap();
        assert_eq!(
            e.scan(ONE_SHOT, t, b"a", b"a", 10).unwrap(),
            vec![(b"a".to_vec(), b"1".to_vec())]
        );
    }

    #[test]
    fn test_scan_inverted_range_is_empty() {
        let e = KvtEngine::with_scheme(CcScheme::NoCc);
        let t = e.create_table("r", Partitioning::Range).unwrap();
        e.set(ONE_SHOT, t, b"a", b"1").unwrap();
        assert!(e.scan(ONE_SHOT, t, b"z", b"a", 10).unwrap().is_empty());
    }

    #[test]
    fn test_scan_rejected_on_hash_table() {
        let e = KvtEngine::with_scheme(CcScheme::NoCc);
        let t = e.create_table("h", Partitioning::Hash).unwrap();
        assert!(matches!(
            e.scan(ONE_SHOT, t, b"a", b"z", 10),
            Err(KvtError::NotRangePartitioned(_))
        ));
    }

    #[test]
    fn test_scan_is_deterministic() {
        let e = KvtEngine::with_scheme(CcScheme::Serialized);
        let t = e.create_table("r", Partitioning::Range).unwrap();
        for (k, v) in [(b"a", b"1"), (b"b", b"2"), (b"c", b"3")] {
            e.set(ONE_SHOT, t, k, v).unwrap();
        }
        let tx = e.begin().unwrap();
        e.set(tx, t, b"bb", b"x").unwrap();
        let first = e.scan(tx, t, b"a", b"c", 10).unwrap();
        let second = e.scan(tx, t, b"a", b"c", 10).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
        e.rollback(tx).unwrap();
    }
}

#[cfg(test)]
mod batch_tests {
    use kvt_common::error::{ErrorCode, KvtError};
    use kvt_common::types::{BatchOp, CcScheme, Partitioning, TxnId};

    use crate::KvtEngine;

    const ONE_SHOT: TxnId = TxnId::AUTO_COMMIT;

    #[test]
    fn test_batch_all_success() {
        let e = KvtEngine::with_scheme(CcScheme::Serialized);
        let t = e.create_table("t", Partitioning::Hash).unwrap();
        let ops = vec![
            BatchOp::Set {
                table: t,
                key: b"k".to_vec(),
                value: b"v".to_vec(),
            },
            BatchOp::Get {
                table: t,
                key: b"k".to_vec(),
            },
            BatchOp::Del {
                table: t,
                key: b"k".to_vec(),
            },
        ];
        let results = e.batch_execute(ONE_SHOT, &ops).unwrap();
        assert_eq!(results.len(), 3);
        // Operations in a batch see each other's effects.
        assert_eq!(results[1].value.as_deref(), Some(b"v".as_slice()));
    }

    #[test]
    fn test_batch_partial_failure_reports_per_op() {
        let e = KvtEngine::with_scheme(CcScheme::Serialized);
        let t = e.create_table("t", Partitioning::Hash).unwrap();
        let ops = vec![
            BatchOp::Set {
                table: t,
                key: b"a".to_vec(),
                value: b"1".to_vec(),
            },
            BatchOp::Get {
                table: t,
                key: b"missing".to_vec(),
            },
            BatchOp::Set {
                table: t,
                key: b"b".to_vec(),
                value: b"2".to_vec(),
            },
        ];
        let err = e.batch_execute(ONE_SHOT, &ops).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BatchNotFullySuccess);
        let KvtError::BatchNotFullySuccess { results } = err else {
            panic!("expected BatchNotFullySuccess");
        };
        assert!(results[0].is_success());
        assert_eq!(
            results[1].error.as_ref().map(|e| e.code()),
            Some(ErrorCode::KeyNotFound)
        );
        // Later operations still ran.
        assert!(results[2].is_success());
        assert_eq!(e.get(ONE_SHOT, t, b"b").unwrap(), b"2");
    }

    #[test]
    fn test_batch_within_transaction_shares_context() {
        let e = KvtEngine::with_scheme(CcScheme::Optimistic);
        let t = e.create_table("t", Partitioning::Hash).unwrap();
        let tx = e.begin().unwrap();
        let ops = vec![
            BatchOp::Set {
                table: t,
                key: b"k".to_vec(),
                value: b"v".to_vec(),
            },
            BatchOp::Get {
                table: t,
                key: b"k".to_vec(),
            },
        ];
        let results = e.batch_execute(tx, &ops).unwrap();
        assert_eq!(results[1].value.as_deref(), Some(b"v".as_slice()));
        // Nothing visible outside the transaction yet.
        assert!(matches!(e.get(ONE_SHOT, t, b"k"), Err(KvtError::KeyNotFound)));
        e.commit(tx).unwrap();
        assert_eq!(e.get(ONE_SHOT, t, b"k").unwrap(), b"v");
    }

    #[test]
    fn test_batch_surfaces_lock_conflicts_per_op() {
        let e = KvtEngine::with_scheme(CcScheme::TwoPhaseLocking);
        let t = e.create_table("t", Partitioning::Hash).unwrap();
        let t1 = e.begin().unwrap();
        e.set(t1, t, b"k", b"v").unwrap();
        let t2 = e.begin().unwrap();
        let ops = vec![BatchOp::Get {
            table: t,
            key: b"k".to_vec(),
        }];
        let KvtError::BatchNotFullySuccess { results } =
            e.batch_execute(t2, &ops).unwrap_err()
        else {
            panic!("expected BatchNotFullySuccess");
        };
        assert_eq!(
            results[0].error.as_ref().map(|e| e.code()),
            Some(ErrorCode::KeyIsLocked)
        );
        e.rollback(t2).unwrap();
        e.rollback(t1).unwrap();
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use kvt_common::error::KvtError;
    use kvt_common::types::{CcScheme, Partitioning, TxnId};

    use crate::KvtEngine;

    const ONE_SHOT: TxnId = TxnId::AUTO_COMMIT;

    #[test]
    fn test_txn_ids_are_monotonic_and_nonzero() {
        let e = KvtEngine::with_scheme(CcScheme::Optimistic);
        let mut last = TxnId(0);
        for _ in 0..5 {
            let tx = e.begin().unwrap();
            assert!(tx > last);
            assert!(!tx.is_auto_commit());
            last = tx;
            e.rollback(tx).unwrap();
        }
    }

    #[test]
    fn test_rollback_is_observationally_invisible() {
        let e = KvtEngine::with_scheme(CcScheme::Serialized);
        let t = e.create_table("r", Partitioning::Range).unwrap();
        e.set(ONE_SHOT, t, b"a", b"1").unwrap();
        e.set(ONE_SHOT, t, b"b", b"2").unwrap();
        let before = e.scan(ONE_SHOT, t, b"a", b"z", 100).unwrap();

        let tx = e.begin().unwrap();
        e.set(tx, t, b"a", b"changed").unwrap();
        e.set(tx, t, b"new", b"x").unwrap();
        e.del(tx, t, b"b").unwrap();
        e.rollback(tx).unwrap();

        let after = e.scan(ONE_SHOT, t, b"a", b"z", 100).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_commit_order_determines_final_state() {
        let e = KvtEngine::with_scheme(CcScheme::Optimistic);
        let t = e.create_table("t", Partitioning::Hash).unwrap();
        let t1 = e.begin().unwrap();
        let t2 = e.begin().unwrap();
        e.set(t1, t, b"k", b"first").unwrap();
        e.set(t2, t, b"k", b"second").unwrap();
        // Both are blind writes to an absent key... the second committer
        // must fail the still-absent check, so order decides the value.
        e.commit(t1).unwrap();
        assert!(matches!(e.commit(t2), Err(KvtError::StaleData(_))));
        assert_eq!(e.get(ONE_SHOT, t, b"k").unwrap(), b"first");
    }

    #[test]
    fn test_auto_commit_sentinel_is_not_a_transaction() {
        let e = KvtEngine::with_scheme(CcScheme::Serialized);
        assert!(matches!(
            e.commit(TxnId::AUTO_COMMIT),
            Err(KvtError::TxnNotFound(_))
        ));
        assert!(matches!(
            e.rollback(TxnId::AUTO_COMMIT),
            Err(KvtError::TxnNotFound(_))
        ));
    }

    #[test]
    fn test_active_txn_count() {
        let e = KvtEngine::with_scheme(CcScheme::Optimistic);
        assert_eq!(e.active_txn_count(), 0);
        let t1 = e.begin().unwrap();
        let t2 = e.begin().unwrap();
        assert_eq!(e.active_txn_count(), 2);
        e.rollback(t1).unwrap();
        e.commit(t2).unwrap();
        assert_eq!(e.active_txn_count(), 0);
    }
}

#[cfg(test)]
mod stats_tests {
    use kvt_common::types::{CcScheme, Partitioning, TxnId};

    use crate::KvtEngine;

    #[test]
    fn test_lifecycle_counters() {
        let e = KvtEngine::with_scheme(CcScheme::Optimistic);
        let t = e.create_table("t", Partitioning::Hash).unwrap();
        let t1 = e.begin().unwrap();
        let t2 = e.begin().unwrap();
        e.set(t1, t, b"k", b"a").unwrap();
        e.set(t2, t, b"k", b"b").unwrap();
        e.commit(t1).unwrap();
        let _ = e.commit(t2); // still-absent check fails
        let snap = e.stats();
        assert_eq!(snap.txns_begun, 2);
        assert_eq!(snap.txns_committed, 1);
        assert_eq!(snap.validation_failures, 1);
    }

    #[test]
    fn test_lock_conflict_and_one_shot_counters() {
        let e = KvtEngine::with_scheme(CcScheme::TwoPhaseLocking);
        let t = e.create_table("t", Partitioning::Hash).unwrap();
        let t1 = e.begin().unwrap();
        e.set(t1, t, b"k", b"v").unwrap();
        let t2 = e.begin().unwrap();
        let _ = e.get(t2, t, b"k");
        let _ = e.get(TxnId::AUTO_COMMIT, t, b"k");
        let snap = e.stats();
        assert_eq!(snap.lock_conflicts, 1);
        assert_eq!(snap.one_shot_ops, 1);
        e.rollback(t2).unwrap();
        e.rollback(t1).unwrap();
        assert_eq!(e.stats().txns_rolled_back, 2);
    }
}

#[cfg(test)]
mod global_tests {
    use kvt_common::config::KvtConfig;
    use kvt_common::error::KvtError;
    use kvt_common::types::Partitioning;

    use crate::global;

    /// Single test to keep the process-wide slot free of cross-test
    /// interference.
    #[test]
    fn test_initialize_global_shutdown_cycle() {
        assert!(matches!(global::global(), Err(KvtError::NotInitialized)));

        let engine = global::initialize(&KvtConfig::default());
        let via_slot = global::global().unwrap();
        let t = via_slot.create_table("g", Partitioning::Hash).unwrap();
        assert_eq!(engine.lookup_table("g").unwrap(), t);

        // Re-initialization replaces the engine wholesale.
        let fresh = global::initialize(&KvtConfig::default());
        assert!(fresh.lookup_table("g").is_err());

        global::shutdown();
        assert!(matches!(global::global(), Err(KvtError::NotInitialized)));
        // The handle obtained before shutdown keeps working.
        let tx = engine.begin().unwrap();
        assert!(!tx.is_auto_commit());
        engine.rollback(tx).unwrap();
    }
}
