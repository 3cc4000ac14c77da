//! Property tests for roots and proofs

use proptest::prelude::*;
use smt_store::SmtStore;
use std::collections::BTreeMap;

fn entries() -> impl Strategy<Value = BTreeMap<u16, u32>> {
    prop::collection::btree_map(any::<u16>(), any::<u32>(), 1..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn root_depends_only_on_contents(map in entries()) {
        let forward = SmtStore::in_memory();
        let backward = SmtStore::in_memory();

        for (k, v) in map.iter() {
            forward.update("p", k, v).unwrap();
        }
        for (k, v) in map.iter().rev() {
            backward.update("p", k, v).unwrap();
        }

        prop_assert_eq!(forward.root("p"), backward.root("p"));
    }

    #[test]
    fn prediction_matches_commit(map in entries(), key in any::<u16>(), value in any::<u32>()) {
        let store = SmtStore::in_memory();
        for (k, v) in map.iter() {
            store.update("p", k, v).unwrap();
        }
        let before = store.root("p");

        let predicted = store.next_root("p", &key, &value).unwrap();
        prop_assert_eq!(store.root("p"), before);
        prop_assert_eq!(store.update("p", &key, &value).unwrap(), predicted);
    }

    #[test]
    fn every_generated_proof_verifies(map in entries(), probe in any::<u16>()) {
        let store = SmtStore::in_memory();
        for (k, v) in map.iter() {
            store.update("p", k, v).unwrap();
        }

        let proof = store.merkle_proof("p", &probe, None).unwrap();
        prop_assert_eq!(proof.is_inclusion(), map.contains_key(&probe));
        prop_assert!(SmtStore::verify_proof(&proof));

        for (k, v) in map.iter() {
            let proof = store.merkle_proof("p", k, None).unwrap();
            prop_assert_eq!(proof.value_as::<u32>().unwrap(), Some(*v));
            prop_assert!(SmtStore::verify_proof(&proof));
        }
    }

    #[test]
    fn tampered_proofs_fail(map in entries(), index in any::<prop::sample::Index>(), flip in 0usize..256) {
        let store = SmtStore::in_memory();
        for (k, v) in map.iter() {
            store.update("p", k, v).unwrap();
        }
        let key = *index.get(&map.keys().copied().collect::<Vec<_>>());
        let proof = store.merkle_proof("p", &key, None).unwrap();

        let mut bad_root = proof.clone();
        let mut bytes = *bad_root.root.as_bytes();
        bytes[flip / 8] ^= 0x80 >> (flip % 8);
        bad_root.root = smt_store::Hash::from_bytes(bytes);
        prop_assert!(!SmtStore::verify_proof(&bad_root));

        if !proof.siblings.is_empty() {
            let mut bad_sibling = proof.clone();
            let i = flip % bad_sibling.siblings.len();
            let mut bytes = *bad_sibling.siblings[i].as_bytes();
            bytes[0] ^= 1;
            bad_sibling.siblings[i] = smt_store::Hash::from_bytes(bytes);
            prop_assert!(!SmtStore::verify_proof(&bad_sibling));
        }
    }

    #[test]
    fn removing_everything_restores_empty_root(map in entries()) {
        let store = SmtStore::in_memory();
        for (k, v) in map.iter() {
            store.update("p", k, v).unwrap();
        }
        for k in map.keys() {
            store.remove("p", k).unwrap();
        }
        prop_assert_eq!(store.root("p"), smt_store::trie::empty_root());
    }
}
